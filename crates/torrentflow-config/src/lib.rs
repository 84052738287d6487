#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Environment-driven configuration for the transfer session manager.
//!
//! Layout: `defaults.rs` (default values and guard rails), `model.rs`
//! (typed configuration), `normalize.rs` (guard-rail clamping with
//! warnings), `loader.rs` (environment parsing), `error.rs` (errors).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod normalize;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_from_env, load_with};
pub use model::{LoadedConfig, ManagerConfig};
pub use normalize::normalize_config;
