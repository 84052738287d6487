//! Transfer model shared between the engine boundary and the session layer.

mod magnet;
mod metainfo;
mod seed;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use torrentflow_events::InfoHash;

use crate::error::{TransferError, TransferResult};

pub use magnet::MagnetLink;
pub use metainfo::Metainfo;
pub use seed::SeedDescriptor;

/// Resolved metadata for a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMetadata {
    /// Display name from the info dictionary.
    pub name: String,
    /// Piece size in bytes.
    pub piece_length: u64,
    /// Number of pieces.
    pub piece_count: usize,
    /// Payload files in descriptor order.
    pub files: Vec<FileEntry>,
}

impl TransferMetadata {
    /// Sum of all file lengths.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|file| file.length).sum()
    }
}

/// One payload file described by the metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the download directory, including the transfer
    /// directory for multi-file layouts.
    pub path: PathBuf,
    /// Path inside the transfer, used for display.
    pub display_name: String,
    /// File length in bytes.
    pub length: u64,
}

/// Completion reported by the engine for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCompletion {
    /// Static description of the file.
    pub entry: FileEntry,
    /// Verified bytes of this file on disk.
    pub bytes_completed: u64,
}

/// Point-in-time counters read from an engine handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferCounters {
    /// Verified payload bytes on disk.
    pub bytes_completed: u64,
    /// Total payload size; `None` while metadata is pending.
    pub total_length: Option<u64>,
    /// Cumulative payload bytes received from peers.
    pub bytes_read: u64,
    /// Cumulative payload bytes sent to peers.
    pub bytes_written: u64,
    /// Peers with an open connection.
    pub active_peers: u32,
    /// Peers known to the engine, connected or not.
    pub known_peers: u32,
    /// Connected peers that hold every piece.
    pub connected_seeds: u32,
}

/// Completion figures derived from counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Verified bytes on disk.
    pub bytes_completed: u64,
    /// Total size, unknown until metadata resolves.
    pub total_size: Option<u64>,
}

impl TransferProgress {
    /// Construct from raw figures.
    #[must_use]
    pub const fn new(bytes_completed: u64, total_size: Option<u64>) -> Self {
        Self {
            bytes_completed,
            total_size,
        }
    }

    /// Percentage in `0..=100`; zero when the total is unknown or zero.
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        match self.total_size {
            Some(total) if total > 0 => {
                (to_f64(self.bytes_completed) / to_f64(total) * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        }
    }

    /// Bytes still missing; `None` while the total is unknown.
    #[must_use]
    pub const fn remaining(&self) -> Option<u64> {
        match self.total_size {
            Some(total) => Some(total.saturating_sub(self.bytes_completed)),
            None => None,
        }
    }

    /// Whole seconds until completion at `download_rate`, when computable.
    #[must_use]
    pub const fn eta_seconds(&self, download_rate: u64) -> Option<u64> {
        match self.remaining() {
            Some(remaining) if remaining > 0 && download_rate > 0 => {
                Some(remaining / download_rate)
            }
            _ => None,
        }
    }
}

/// Outcome of deleting payload files during removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalReport {
    /// Identifier of the removed transfer.
    pub info_hash: InfoHash,
    /// Files that were deleted.
    pub deleted: Vec<PathBuf>,
    /// Files that could not be deleted, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl RemovalReport {
    /// Empty report for a removal that did not touch the disk.
    #[must_use]
    pub const fn for_transfer(info_hash: InfoHash) -> Self {
        Self {
            info_hash,
            deleted: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Whether every requested deletion succeeded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Treat leftover files as an error.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::PartialDeletionFailure`] listing every file
    /// that could not be deleted.
    pub fn into_result(self) -> TransferResult<Self> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(TransferError::PartialDeletionFailure {
            info_hash: self.info_hash,
            failed: self.failed.into_iter().map(|(path, _)| path).collect(),
        })
    }
}

#[allow(clippy::cast_precision_loss, reason = "percentages tolerate rounding")]
const fn to_f64(value: u64) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_is_clamped_and_zero_when_unknown() {
        assert!(TransferProgress::new(10, None).percent_complete().abs() < f64::EPSILON);
        assert!(TransferProgress::new(10, Some(0)).percent_complete().abs() < f64::EPSILON);
        let half = TransferProgress::new(50, Some(100));
        assert!((half.percent_complete() - 50.0).abs() < f64::EPSILON);
        let over = TransferProgress::new(150, Some(100));
        assert!((over.percent_complete() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_requires_rate_and_remaining_bytes() {
        let progress = TransferProgress::new(400, Some(1_000));
        assert_eq!(progress.eta_seconds(200), Some(3));
        assert_eq!(progress.eta_seconds(0), None);
        assert_eq!(TransferProgress::new(1_000, Some(1_000)).eta_seconds(50), None);
        assert_eq!(TransferProgress::new(0, None).eta_seconds(50), None);
    }

    #[test]
    fn removal_report_surfaces_leftovers() {
        let info_hash = InfoHash::from_bytes([3; 20]);
        let clean = RemovalReport::for_transfer(info_hash);
        assert!(clean.clone().into_result().is_ok());

        let mut dirty = clean;
        dirty
            .failed
            .push((PathBuf::from("movie.mkv"), "permission denied".into()));
        let err = dirty.into_result().expect_err("leftovers are an error");
        assert!(matches!(
            err,
            TransferError::PartialDeletionFailure { ref failed, .. } if failed.len() == 1
        ));
    }

    #[test]
    fn metadata_total_sums_files() {
        let metadata = TransferMetadata {
            name: "album".into(),
            piece_length: 16_384,
            piece_count: 2,
            files: vec![
                FileEntry {
                    path: PathBuf::from("album/a.flac"),
                    display_name: "a.flac".into(),
                    length: 10,
                },
                FileEntry {
                    path: PathBuf::from("album/b.flac"),
                    display_name: "b.flac".into(),
                    length: 32,
                },
            ],
        };
        assert_eq!(metadata.total_length(), 42);
    }
}
