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

//! `TorrentFlow` application bootstrap wiring.
//!
//! Layout: `cli.rs` (argument parsing), `bootstrap.rs` (service wiring and
//! run loop), `error.rs` (application errors).

/// Application bootstrap and run loop.
pub mod bootstrap;
/// Command-line arguments.
pub mod cli;
/// Application-level error types.
pub mod error;

pub use bootstrap::{RunSummary, run_app, run_app_with};
pub use cli::{Cli, Source};
pub use error::{AppError, AppResult};
