//! Default values and guard rails for the manager configuration.
//!
//! # Design
//! - Defaults match the desktop client so an empty environment behaves like
//!   a fresh install.
//! - Guard rails are inclusive ranges; values outside them are replaced, not
//!   rejected.

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix shared by every environment variable the loader reads.
pub const ENV_PREFIX: &str = "TORRENTFLOW_";
/// Default peer listen port.
pub const DEFAULT_LISTEN_PORT: u16 = 42_069;
/// Default broadcaster tick.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
/// Accepted tick interval, in milliseconds.
pub const TICK_INTERVAL_MS_RANGE: RangeInclusive<u64> = 100..=60_000;
/// Default bound on the metadata wait for magnet transfers.
pub const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(60);
/// Accepted metadata wait, in seconds.
pub const METADATA_TIMEOUT_SECS_RANGE: RangeInclusive<u64> = 1..=3_600;
/// Default piece size for locally created seed descriptors.
pub const DEFAULT_SEED_PIECE_LENGTH: u64 = 256 * 1024;
/// Accepted seed piece sizes; values must also be powers of two.
pub const SEED_PIECE_LENGTH_RANGE: RangeInclusive<u64> = (16 * 1024)..=(16 * 1024 * 1024);
/// Default replay ring size for the event bus.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;
/// Smallest accepted replay ring.
pub const MIN_EVENT_CAPACITY: usize = 16;
/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Tracker announced in descriptors built for local seeding.
pub const DEFAULT_SEED_TRACKER: &str = "udp://tracker.openbittorrent.com:80/announce";

/// Default download directory: `$HOME/TorrentFlow/Downloads`, or a relative
/// `TorrentFlow/Downloads` when no home directory is known.
#[must_use]
pub fn default_download_dir() -> PathBuf {
    download_dir_under(std::env::var_os("HOME").map(PathBuf::from))
}

pub(crate) fn download_dir_under(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join("TorrentFlow")
        .join("Downloads")
}
