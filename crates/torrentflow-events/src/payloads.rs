//! Event payload types carried to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::InfoHash;

/// Identifier assigned to each event emitted by the manager.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed notifications surfaced to observers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A transfer has metadata and full-download or seeding intent was issued.
    TransferAdded {
        /// Identifier of the transfer.
        info_hash: InfoHash,
        /// Display name resolved from metadata.
        name: String,
    },
    /// Metadata did not arrive within the configured wait; the session remains.
    MetadataTimeout {
        /// Identifier of the transfer still waiting on metadata.
        info_hash: InfoHash,
        /// Length of the wait that elapsed, in seconds.
        waited_secs: u64,
    },
    /// Per-tick batch of snapshots and aggregate statistics.
    TransfersUpdated(TransferBatch),
    /// Piece requests were cancelled for a transfer.
    TransferPaused {
        /// Identifier of the paused transfer.
        info_hash: InfoHash,
    },
    /// Piece requests were re-issued for a transfer.
    TransferResumed {
        /// Identifier of the resumed transfer.
        info_hash: InfoHash,
    },
    /// A transfer left the registry.
    TransferRemoved {
        /// Identifier of the removed transfer.
        info_hash: InfoHash,
        /// Number of payload files deleted from disk.
        deleted_files: usize,
        /// Number of payload files that could not be deleted.
        failed_files: usize,
    },
    /// Counters for one transfer could not be sampled during a tick.
    SamplingFailed {
        /// Identifier of the transfer that was skipped.
        info_hash: InfoHash,
        /// Human-readable failure detail.
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for stream consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransferAdded { .. } => "transfer_added",
            Self::MetadataTimeout { .. } => "metadata_timeout",
            Self::TransfersUpdated(_) => "transfers_updated",
            Self::TransferPaused { .. } => "transfer_paused",
            Self::TransferResumed { .. } => "transfer_resumed",
            Self::TransferRemoved { .. } => "transfer_removed",
            Self::SamplingFailed { .. } => "sampling_failed",
        }
    }

    /// Transfer the event refers to, if it concerns a single transfer.
    #[must_use]
    pub const fn info_hash(&self) -> Option<InfoHash> {
        match self {
            Self::TransferAdded { info_hash, .. }
            | Self::MetadataTimeout { info_hash, .. }
            | Self::TransferPaused { info_hash }
            | Self::TransferResumed { info_hash }
            | Self::TransferRemoved { info_hash, .. }
            | Self::SamplingFailed { info_hash, .. } => Some(*info_hash),
            Self::TransfersUpdated(_) => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Wall-clock time of publication.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Discrete status derived from engine counters on every tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Actively receiving pieces from connected peers.
    Downloading,
    /// Complete and serving connected peers.
    Seeding,
    /// Complete with no connected peers.
    Completed,
    /// Incomplete; peers are known but none is connected.
    Stalled,
    /// Incomplete; no peers connected or known.
    Paused,
}

impl TransferStatus {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Completed => "completed",
            Self::Stalled => "stalled",
            Self::Paused => "paused",
        }
    }
}

/// Completion of one file within a transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileProgress {
    /// Display name of the file.
    pub name: String,
    /// File length in bytes.
    pub size: u64,
    /// Human-readable size.
    pub size_str: String,
    /// Completion percentage in `0..=100`.
    pub progress: f64,
    /// Path relative to the download directory.
    pub path: String,
}

/// Immutable projection of one session at one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferSnapshot {
    /// Registry key of the session.
    pub id: InfoHash,
    /// Content hash rendered as hex.
    pub info_hash: String,
    /// Display name, or a placeholder while metadata is pending.
    pub name: String,
    /// Total payload size in bytes; zero while unknown.
    pub size: u64,
    /// Human-readable total size.
    pub size_str: String,
    /// Verified bytes on disk.
    pub bytes_completed: u64,
    /// Completion percentage in `0..=100`.
    pub progress: f64,
    /// Derived status.
    pub status: TransferStatus,
    /// Download rate in bytes per second.
    pub download_speed: u64,
    /// Upload rate in bytes per second.
    pub upload_speed: u64,
    /// Human-readable download rate.
    pub download_speed_str: String,
    /// Human-readable upload rate.
    pub upload_speed_str: String,
    /// Connected peers.
    pub peers: u32,
    /// Connected peers that hold the full payload.
    pub seeds: u32,
    /// Estimated seconds to completion when known.
    pub eta_seconds: Option<u64>,
    /// Human-readable ETA, `"Unknown"` when not computable.
    pub eta: String,
    /// Per-file completion; empty while metadata is pending.
    pub files: Vec<FileProgress>,
    /// Registration time of the session.
    pub added_at: DateTime<Utc>,
}

/// Aggregate statistics across every session in one tick.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalStats {
    /// Sum of download rates in bytes per second.
    pub total_download: u64,
    /// Sum of upload rates in bytes per second.
    pub total_upload: u64,
    /// Human-readable aggregate download rate.
    pub total_download_str: String,
    /// Human-readable aggregate upload rate.
    pub total_upload_str: String,
    /// Sessions that are not yet fully complete.
    pub active_transfers: usize,
    /// Sum of connected peers.
    pub total_peers: u32,
}

/// One broadcast tick: every snapshot plus the aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferBatch {
    /// Snapshots in no particular order.
    pub snapshots: Vec<TransferSnapshot>,
    /// Aggregate over `snapshots`.
    pub stats: GlobalStats,
}
