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

//! Transfer session manager: the registry of live transfers, the periodic
//! snapshot broadcaster, and the façade callers drive.
//!
//! Layout: `session.rs` (one tracked transfer), `registry.rs` (sessions plus
//! paired rate trackers), `snapshot.rs` (snapshot and aggregate projection),
//! `broadcaster.rs` (periodic sampling task), `metadata.rs` (bounded
//! metadata waits), `manager.rs` (façade), `loopback.rs` (in-memory engine).

mod broadcaster;
pub mod loopback;
pub mod manager;
mod metadata;
pub mod registry;
pub mod session;
pub mod snapshot;

pub use loopback::{EngineOptions, LoopbackEngine};
pub use manager::SessionManager;
pub use registry::{SamplingFailure, SessionRegistry, SessionView};
pub use session::{SessionOrigin, TransferSession};
pub use snapshot::{METADATA_PLACEHOLDER, aggregate, build_snapshot};
