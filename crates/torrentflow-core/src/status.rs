//! Status classification from engine counters.
//!
//! Status is never stored. Each tick recomputes it from the counters the
//! engine reports, so a pause request shows up as `paused` or `stalled` only
//! once the engine has actually dropped its active peers.

use torrentflow_events::TransferStatus;

/// Peer counts reported by the engine for one transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerCounts {
    /// Peers with an open connection.
    pub active: u32,
    /// Peers discovered through trackers, DHT, or exchange.
    pub known: u32,
}

impl PeerCounts {
    /// Construct a count pair.
    #[must_use]
    pub const fn new(active: u32, known: u32) -> Self {
        Self { active, known }
    }
}

/// Map counters to a status.
///
/// `total_size` is `None` while metadata is pending; such transfers are never
/// considered complete.
#[must_use]
pub const fn classify(
    bytes_completed: u64,
    total_size: Option<u64>,
    peers: PeerCounts,
) -> TransferStatus {
    let complete = match total_size {
        Some(total) => bytes_completed >= total,
        None => false,
    };
    match (complete, peers.active > 0, peers.known > 0) {
        (true, true, _) => TransferStatus::Seeding,
        (true, false, _) => TransferStatus::Completed,
        (false, true, _) => TransferStatus::Downloading,
        (false, false, true) => TransferStatus::Stalled,
        (false, false, false) => TransferStatus::Paused,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_table() {
        let cases = [
            (100, Some(100), PeerCounts::new(0, 0), TransferStatus::Completed),
            (100, Some(100), PeerCounts::new(2, 2), TransferStatus::Seeding),
            (50, Some(100), PeerCounts::new(0, 3), TransferStatus::Stalled),
            (50, Some(100), PeerCounts::new(0, 0), TransferStatus::Paused),
            (50, Some(100), PeerCounts::new(2, 5), TransferStatus::Downloading),
        ];
        for (bytes, total, peers, expected) in cases {
            assert_eq!(classify(bytes, total, peers), expected, "{bytes}/{total:?} {peers:?}");
        }
    }

    #[test]
    fn pending_metadata_is_never_complete() {
        assert_eq!(
            classify(0, None, PeerCounts::new(0, 0)),
            TransferStatus::Paused
        );
        assert_eq!(
            classify(0, None, PeerCounts::new(0, 4)),
            TransferStatus::Stalled
        );
        assert_eq!(
            classify(0, None, PeerCounts::new(1, 4)),
            TransferStatus::Downloading
        );
    }

    #[test]
    fn over_complete_counters_still_classify_as_complete() {
        assert_eq!(
            classify(120, Some(100), PeerCounts::new(0, 1)),
            TransferStatus::Completed
        );
    }
}
