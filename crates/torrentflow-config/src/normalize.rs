//! Guard rails applied to a configuration before use.
//!
//! # Design
//! - Never fails: out-of-range values are clamped or reset to defaults.
//! - Every adjustment is recorded as a warning so the binary can log it.

use std::path::PathBuf;
use std::time::Duration;

use crate::defaults::{
    DEFAULT_LISTEN_PORT, DEFAULT_LOG_LEVEL, DEFAULT_SEED_PIECE_LENGTH,
    METADATA_TIMEOUT_SECS_RANGE, MIN_EVENT_CAPACITY, SEED_PIECE_LENGTH_RANGE,
    TICK_INTERVAL_MS_RANGE, default_download_dir,
};
use crate::model::{LoadedConfig, ManagerConfig};

/// Clamp a configuration to its guard rails.
#[must_use]
pub fn normalize_config(config: ManagerConfig) -> LoadedConfig {
    normalize_config_with_warnings(config, Vec::new())
}

pub(crate) fn normalize_config_with_warnings(
    config: ManagerConfig,
    mut warnings: Vec<String>,
) -> LoadedConfig {
    let download_dir = sanitize_dir(config.download_dir, &mut warnings);

    let listen_port = if config.listen_port == 0 {
        warnings.push(format!(
            "listen_port 0 is out of range; using {DEFAULT_LISTEN_PORT}"
        ));
        DEFAULT_LISTEN_PORT
    } else {
        config.listen_port
    };

    let tick_interval = Duration::from_millis(clamp_u64(
        "tick_interval_ms",
        saturating_millis(config.tick_interval),
        *TICK_INTERVAL_MS_RANGE.start(),
        *TICK_INTERVAL_MS_RANGE.end(),
        &mut warnings,
    ));
    let metadata_timeout = Duration::from_secs(clamp_u64(
        "metadata_timeout_secs",
        config.metadata_timeout.as_secs(),
        *METADATA_TIMEOUT_SECS_RANGE.start(),
        *METADATA_TIMEOUT_SECS_RANGE.end(),
        &mut warnings,
    ));

    let seed_piece_length = if config.seed_piece_length.is_power_of_two()
        && SEED_PIECE_LENGTH_RANGE.contains(&config.seed_piece_length)
    {
        config.seed_piece_length
    } else {
        warnings.push(format!(
            "seed_piece_length {} must be a power of two between {} and {}; using {DEFAULT_SEED_PIECE_LENGTH}",
            config.seed_piece_length,
            SEED_PIECE_LENGTH_RANGE.start(),
            SEED_PIECE_LENGTH_RANGE.end()
        ));
        DEFAULT_SEED_PIECE_LENGTH
    };

    let seed_trackers = config
        .seed_trackers
        .into_iter()
        .map(|tracker| tracker.trim().to_string())
        .filter(|tracker| !tracker.is_empty())
        .collect();

    let event_capacity = if config.event_capacity < MIN_EVENT_CAPACITY {
        warnings.push(format!(
            "event_capacity {} is below the minimum; using {MIN_EVENT_CAPACITY}",
            config.event_capacity
        ));
        MIN_EVENT_CAPACITY
    } else {
        config.event_capacity
    };

    let log_level = {
        let trimmed = config.log_level.trim();
        if trimmed.is_empty() {
            warnings.push(format!("log_level was empty; using {DEFAULT_LOG_LEVEL}"));
            DEFAULT_LOG_LEVEL.to_string()
        } else {
            trimmed.to_string()
        }
    };

    LoadedConfig {
        config: ManagerConfig {
            download_dir,
            listen_port,
            tick_interval,
            metadata_timeout,
            seed_piece_length,
            seed_trackers,
            event_capacity,
            enable_dht: config.enable_dht,
            seed_after_download: config.seed_after_download,
            log_level,
            log_format: config.log_format,
        },
        warnings,
    }
}

fn sanitize_dir(value: PathBuf, warnings: &mut Vec<String>) -> PathBuf {
    if value.as_os_str().is_empty() {
        let fallback = default_download_dir();
        warnings.push(format!(
            "download_dir was empty; using {}",
            fallback.display()
        ));
        fallback
    } else {
        value
    }
}

fn clamp_u64(field: &str, value: u64, min: u64, max: u64, warnings: &mut Vec<String>) -> u64 {
    if value < min {
        warnings.push(format!("{field} of {value} is below {min}; clamping"));
        min
    } else if value > max {
        warnings.push(format!("{field} of {value} exceeds {max}; clamping"));
        max
    } else {
        value
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_without_warnings() {
        let loaded = normalize_config(ManagerConfig::with_download_dir("/srv/downloads"));
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        assert_eq!(loaded.config.tick_interval, Duration::from_secs(1));
        assert_eq!(loaded.config.metadata_timeout, Duration::from_secs(60));
    }

    #[test]
    fn out_of_range_values_are_clamped_with_warnings() {
        let config = ManagerConfig {
            listen_port: 0,
            tick_interval: Duration::from_millis(5),
            metadata_timeout: Duration::from_secs(7_200),
            seed_piece_length: 3_000,
            event_capacity: 2,
            log_level: "   ".into(),
            seed_trackers: vec![" udp://a ".into(), String::new(), "  ".into()],
            ..ManagerConfig::with_download_dir("/srv/downloads")
        };
        let loaded = normalize_config(config);
        let effective = loaded.config;
        assert_eq!(effective.listen_port, DEFAULT_LISTEN_PORT);
        assert_eq!(effective.tick_interval, Duration::from_millis(100));
        assert_eq!(effective.metadata_timeout, Duration::from_secs(3_600));
        assert_eq!(effective.seed_piece_length, DEFAULT_SEED_PIECE_LENGTH);
        assert_eq!(effective.event_capacity, MIN_EVENT_CAPACITY);
        assert_eq!(effective.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(effective.seed_trackers, vec!["udp://a".to_string()]);
        assert_eq!(loaded.warnings.len(), 6);
    }

    #[test]
    fn power_of_two_piece_lengths_inside_range_are_kept() {
        let config = ManagerConfig {
            seed_piece_length: 1024 * 1024,
            ..ManagerConfig::with_download_dir("/srv/downloads")
        };
        assert_eq!(normalize_config(config).config.seed_piece_length, 1024 * 1024);
    }
}
