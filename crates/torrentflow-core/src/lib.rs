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

//! Engine-agnostic transfer model, collaborator traits, and derived-state
//! computation.
//!
//! Layout: `model/` (magnet links, descriptors, seed metadata, progress),
//! `service/` (engine collaborator and façade traits), `rate.rs` (rate
//! sampling), `status.rs` (status classification), `format.rs` (display
//! helpers), `error.rs` (error taxonomy).

pub mod error;
pub mod format;
pub mod model;
pub mod rate;
pub mod service;
pub mod status;

pub use error::{TransferError, TransferResult};
pub use format::{format_bytes, format_duration, format_speed};
pub use model::{
    FileCompletion, FileEntry, MagnetLink, Metainfo, RemovalReport, SeedDescriptor,
    TransferCounters, TransferMetadata, TransferProgress,
};
pub use rate::RateTracker;
pub use service::{
    MetadataNotifier, MetadataSignal, TransferEngine, TransferHandle, TransferInspector,
    TransferWorkflow, metadata_channel,
};
pub use status::{PeerCounts, classify};
pub use torrentflow_events::{InfoHash, TransferStatus};
