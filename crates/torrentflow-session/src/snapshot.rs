//! Projection of session views into observer snapshots and aggregates.

use torrentflow_core::{
    FileCompletion, PeerCounts, TransferProgress, TransferStatus, classify, format_bytes,
    format_duration, format_speed,
};
use torrentflow_events::{FileProgress, GlobalStats, TransferSnapshot};

use crate::registry::SessionView;

/// Display name used until the engine knows the transfer's name.
pub const METADATA_PLACEHOLDER: &str = "Loading metadata...";

const UNKNOWN_ETA: &str = "Unknown";

/// Build the immutable snapshot of one session.
#[must_use]
pub fn build_snapshot(view: &SessionView) -> TransferSnapshot {
    let counters = view.counters;
    let progress = TransferProgress::new(counters.bytes_completed, counters.total_length);
    let status = classify(
        counters.bytes_completed,
        counters.total_length,
        PeerCounts::new(counters.active_peers, counters.known_peers),
    );
    let eta_seconds = progress.eta_seconds(view.download_rate);
    let size = counters.total_length.unwrap_or(0);

    TransferSnapshot {
        id: view.info_hash,
        info_hash: view.info_hash.to_hex(),
        name: view
            .name
            .clone()
            .unwrap_or_else(|| METADATA_PLACEHOLDER.to_string()),
        size,
        size_str: format_bytes(size),
        bytes_completed: counters.bytes_completed,
        progress: progress.percent_complete(),
        status,
        download_speed: view.download_rate,
        upload_speed: view.upload_rate,
        download_speed_str: format_speed(view.download_rate),
        upload_speed_str: format_speed(view.upload_rate),
        peers: counters.active_peers,
        seeds: counters.connected_seeds,
        eta_seconds,
        eta: eta_seconds.map_or_else(
            || UNKNOWN_ETA.to_string(),
            |secs| format_duration(std::time::Duration::from_secs(secs)),
        ),
        files: view.files.iter().map(file_progress).collect(),
        added_at: view.added_at,
    }
}

/// Sum rates and peers across snapshots and count unfinished transfers.
#[must_use]
pub fn aggregate(snapshots: &[TransferSnapshot]) -> GlobalStats {
    let mut stats = GlobalStats::default();
    for snapshot in snapshots {
        stats.total_download = stats.total_download.saturating_add(snapshot.download_speed);
        stats.total_upload = stats.total_upload.saturating_add(snapshot.upload_speed);
        stats.total_peers = stats.total_peers.saturating_add(snapshot.peers);
        if !matches!(
            snapshot.status,
            TransferStatus::Seeding | TransferStatus::Completed
        ) {
            stats.active_transfers += 1;
        }
    }
    stats.total_download_str = format_speed(stats.total_download);
    stats.total_upload_str = format_speed(stats.total_upload);
    stats
}

fn file_progress(file: &FileCompletion) -> FileProgress {
    let progress = TransferProgress::new(file.bytes_completed, Some(file.entry.length));
    FileProgress {
        name: file.entry.display_name.clone(),
        size: file.entry.length,
        size_str: format_bytes(file.entry.length),
        progress: progress.percent_complete(),
        path: file.entry.path.display().to_string(),
    }
}
