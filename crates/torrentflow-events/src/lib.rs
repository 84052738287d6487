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

//! Observer-facing types and the event bus for `TorrentFlow`.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay of
//! recent events when subscribers reconnect with a known event id. Internally
//! it uses `tokio::broadcast` with a bounded buffer; slow subscribers lag and
//! skip ahead instead of stalling publishers.
//!
//! Layout: `ids.rs` (content identifier), `payloads.rs` (events, snapshots,
//! aggregate stats), `routing.rs` (the bus), `error.rs` (identifier parsing
//! errors).

pub mod error;
pub mod ids;
pub mod payloads;
pub mod routing;

pub use error::{InfoHashError, InfoHashResult};
pub use ids::InfoHash;
pub use payloads::{
    DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, FileProgress, GlobalStats,
    TransferBatch, TransferSnapshot, TransferStatus,
};
pub use routing::{EventBus, EventStream};
