//! Identifier parsing error primitives.

use std::fmt::{self, Display, Formatter};

/// Error emitted when a textual content identifier cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoHashError {
    /// Input length matches neither the hex nor the base32 encoding.
    InvalidLength {
        /// Number of characters supplied.
        length: usize,
    },
    /// Input has the right length but contains characters outside the alphabet.
    InvalidEncoding {
        /// Encoding that was attempted (`hex` or `base32`).
        encoding: &'static str,
    },
}

impl InfoHashError {
    /// Short machine-friendly discriminator.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidLength { .. } => "invalid_length",
            Self::InvalidEncoding { .. } => "invalid_encoding",
        }
    }
}

impl Display for InfoHashError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { .. } => {
                formatter.write_str("info hash must be 40 hex or 32 base32 characters")
            }
            Self::InvalidEncoding { .. } => formatter.write_str("info hash encoding is invalid"),
        }
    }
}

impl std::error::Error for InfoHashError {}

/// Result wrapper for identifier parsing.
pub type InfoHashResult<T> = Result<T, InfoHashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_error_exposes_code_and_message() {
        let err = InfoHashError::InvalidLength { length: 7 };
        assert_eq!(err.code(), "invalid_length");
        assert_eq!(
            err.to_string(),
            "info hash must be 40 hex or 32 base32 characters"
        );
        assert!(format!("{err:?}").contains("length: 7"));

        let err = InfoHashError::InvalidEncoding { encoding: "hex" };
        assert_eq!(err.code(), "invalid_encoding");
        assert_eq!(err.to_string(), "info hash encoding is invalid");
        assert!(matches!(err, InfoHashError::InvalidEncoding { encoding: "hex" }));
    }
}
