//! Environment-backed configuration loader.
//!
//! # Design
//! - Reads `TORRENTFLOW_*` variables through a lookup function so tests never
//!   mutate the process environment.
//! - Unparsable numbers fail; everything else degrades to a default plus a
//!   warning.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use torrentflow_telemetry::LogFormat;

use crate::defaults::{DEFAULT_LISTEN_PORT, ENV_PREFIX};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{LoadedConfig, ManagerConfig};
use crate::normalize::normalize_config_with_warnings;

const DOWNLOAD_DIR: &str = "TORRENTFLOW_DOWNLOAD_DIR";
const LISTEN_PORT: &str = "TORRENTFLOW_LISTEN_PORT";
const TICK_MS: &str = "TORRENTFLOW_TICK_MS";
const METADATA_TIMEOUT_SECS: &str = "TORRENTFLOW_METADATA_TIMEOUT_SECS";
const SEED_PIECE_LENGTH: &str = "TORRENTFLOW_SEED_PIECE_LENGTH";
const SEED_TRACKERS: &str = "TORRENTFLOW_SEED_TRACKERS";
const EVENT_CAPACITY: &str = "TORRENTFLOW_EVENT_CAPACITY";
const DHT: &str = "TORRENTFLOW_DHT";
const SEED: &str = "TORRENTFLOW_SEED";
const LOG_LEVEL: &str = "TORRENTFLOW_LOG_LEVEL";
const LOG_FORMAT: &str = "TORRENTFLOW_LOG_FORMAT";

/// Load configuration from the process environment.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when a numeric variable cannot be
/// parsed.
pub fn load_from_env() -> ConfigResult<LoadedConfig> {
    load_with(|name| std::env::var(name).ok())
}

/// Load configuration through an arbitrary variable lookup.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when a numeric variable cannot be
/// parsed.
pub fn load_with<F>(lookup: F) -> ConfigResult<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &'static str| {
        debug_assert!(name.starts_with(ENV_PREFIX));
        lookup(name).filter(|value| !value.trim().is_empty())
    };
    let mut warnings = Vec::new();
    let mut config = ManagerConfig::default();

    if let Some(dir) = read(DOWNLOAD_DIR) {
        config.download_dir = PathBuf::from(dir.trim());
    }
    if let Some(raw) = read(LISTEN_PORT) {
        let port: i64 = parse_number(LISTEN_PORT, &raw)?;
        config.listen_port = u16::try_from(port)
            .ok()
            .filter(|port| *port > 0)
            .unwrap_or_else(|| {
                warnings.push(format!(
                    "listen_port {port} is out of range; using {DEFAULT_LISTEN_PORT}"
                ));
                DEFAULT_LISTEN_PORT
            });
    }
    if let Some(raw) = read(TICK_MS) {
        config.tick_interval = Duration::from_millis(parse_number(TICK_MS, &raw)?);
    }
    if let Some(raw) = read(METADATA_TIMEOUT_SECS) {
        config.metadata_timeout = Duration::from_secs(parse_number(METADATA_TIMEOUT_SECS, &raw)?);
    }
    if let Some(raw) = read(SEED_PIECE_LENGTH) {
        config.seed_piece_length = parse_number(SEED_PIECE_LENGTH, &raw)?;
    }
    if let Some(raw) = lookup(SEED_TRACKERS) {
        config.seed_trackers = raw.split(',').map(str::to_string).collect();
    }
    if let Some(raw) = read(EVENT_CAPACITY) {
        config.event_capacity = parse_number(EVENT_CAPACITY, &raw)?;
    }
    if let Some(raw) = read(DHT) {
        config.enable_dht = parse_flag("enable_dht", &raw, config.enable_dht, &mut warnings);
    }
    if let Some(raw) = read(SEED) {
        config.seed_after_download = parse_flag(
            "seed_after_download",
            &raw,
            config.seed_after_download,
            &mut warnings,
        );
    }
    if let Some(level) = read(LOG_LEVEL) {
        config.log_level = level;
    }
    if let Some(raw) = read(LOG_FORMAT) {
        config.log_format = LogFormat::parse(&raw);
        if config.log_format.is_none() {
            warnings.push(format!(
                "unknown log format '{}'; inferring from the build",
                raw.trim()
            ));
        }
    }

    Ok(normalize_config_with_warnings(config, warnings))
}

fn parse_number<T: FromStr>(field: &'static str, raw: &str) -> ConfigResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidField {
            field,
            value: raw.to_string(),
            reason: "must be an integer",
        })
}

fn parse_flag(field: &str, raw: &str, fallback: bool, warnings: &mut Vec<String>) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        other => {
            warnings.push(format!(
                "{field} value '{other}' is not a boolean; keeping {fallback}"
            ));
            fallback
        }
    }
}
