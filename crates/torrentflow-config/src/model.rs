//! Typed configuration consumed by the session manager and the binary.

use std::path::PathBuf;
use std::time::Duration;

use torrentflow_telemetry::LogFormat;

use crate::defaults::{
    DEFAULT_EVENT_CAPACITY, DEFAULT_LISTEN_PORT, DEFAULT_LOG_LEVEL, DEFAULT_METADATA_TIMEOUT,
    DEFAULT_SEED_PIECE_LENGTH, DEFAULT_SEED_TRACKER, DEFAULT_TICK_INTERVAL, default_download_dir,
};

/// Runtime settings for the transfer session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Directory payload files are written to and deleted from.
    pub download_dir: PathBuf,
    /// Peer listen port handed to the engine.
    pub listen_port: u16,
    /// Period of the progress broadcaster.
    pub tick_interval: Duration,
    /// Bound on the metadata wait for magnet transfers.
    pub metadata_timeout: Duration,
    /// Piece size for descriptors built from local files.
    pub seed_piece_length: u64,
    /// Trackers announced in descriptors built from local files.
    pub seed_trackers: Vec<String>,
    /// Replay ring size of the event bus.
    pub event_capacity: usize,
    /// Whether the engine should use the DHT.
    pub enable_dht: bool,
    /// Whether completed downloads keep seeding.
    pub seed_after_download: bool,
    /// Log level used when `RUST_LOG` is absent.
    pub log_level: String,
    /// Explicit log format; `None` lets the binary infer one.
    pub log_format: Option<LogFormat>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            listen_port: DEFAULT_LISTEN_PORT,
            tick_interval: DEFAULT_TICK_INTERVAL,
            metadata_timeout: DEFAULT_METADATA_TIMEOUT,
            seed_piece_length: DEFAULT_SEED_PIECE_LENGTH,
            seed_trackers: vec![DEFAULT_SEED_TRACKER.to_string()],
            event_capacity: DEFAULT_EVENT_CAPACITY,
            enable_dht: true,
            seed_after_download: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: None,
        }
    }
}

impl ManagerConfig {
    /// Defaults rooted at a specific download directory.
    #[must_use]
    pub fn with_download_dir(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }
}

/// Normalised configuration plus the guard-rail warnings applied to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedConfig {
    /// Effective configuration.
    pub config: ManagerConfig,
    /// Human-readable notes about replaced or clamped values.
    pub warnings: Vec<String>,
}
