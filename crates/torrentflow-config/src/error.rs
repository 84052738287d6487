//! Error types for configuration loading.

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value could not be parsed into the field's type at all.
    #[error("invalid configuration field")]
    InvalidField {
        /// Environment variable that carried the value.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
