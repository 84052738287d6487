//! Error types for transfer operations.

use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use torrentflow_events::InfoHash;

/// Primary error type for transfer operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Caller supplied a malformed magnet link, descriptor, or file list.
    #[error("invalid input")]
    InvalidInput {
        /// Input that was rejected.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// No session is registered under the identifier.
    #[error("transfer not found")]
    NotFound {
        /// Missing identifier.
        info_hash: InfoHash,
    },
    /// A session is already registered under the identifier.
    #[error("transfer already registered")]
    DuplicateId {
        /// Colliding identifier.
        info_hash: InfoHash,
    },
    /// The engine collaborator rejected or failed an operation.
    #[error("engine operation failed")]
    EngineFailure {
        /// Operation identifier.
        operation: &'static str,
        /// Transfer identifier when available.
        info_hash: Option<InfoHash>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Metadata did not arrive within the bounded wait.
    #[error("metadata did not arrive in time")]
    MetadataTimeout {
        /// Transfer still waiting on metadata.
        info_hash: InfoHash,
        /// Length of the wait.
        waited: Duration,
    },
    /// Some payload files could not be deleted during removal.
    #[error("payload files could not be deleted")]
    PartialDeletionFailure {
        /// Removed transfer.
        info_hash: InfoHash,
        /// Paths that were left behind.
        failed: Vec<PathBuf>,
    },
    /// Descriptor file does not exist.
    #[error("descriptor file not found")]
    DescriptorNotFound {
        /// Path that was requested.
        path: PathBuf,
    },
    /// Descriptor could not be read or decoded.
    #[error("descriptor could not be parsed")]
    ParseError {
        /// Source file when the descriptor came from disk.
        path: Option<PathBuf>,
        /// Decoder failure detail.
        reason: String,
    },
}

impl TransferError {
    /// Build an [`TransferError::InvalidInput`].
    #[must_use]
    pub fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    /// Wrap a collaborator failure.
    #[must_use]
    pub fn engine(
        operation: &'static str,
        info_hash: Option<InfoHash>,
        source: anyhow::Error,
    ) -> Self {
        Self::EngineFailure {
            operation,
            info_hash,
            source: source.into(),
        }
    }

    /// Build a [`TransferError::ParseError`] without a source path.
    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::ParseError {
            path: None,
            reason: reason.into(),
        }
    }

    /// Attach the descriptor path to a parse failure.
    #[must_use]
    pub fn with_path(self, source_path: PathBuf) -> Self {
        match self {
            Self::ParseError { reason, .. } => Self::ParseError {
                path: Some(source_path),
                reason,
            },
            other => other,
        }
    }

    /// Stable machine-friendly code for the variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::NotFound { .. } => "not_found",
            Self::DuplicateId { .. } => "duplicate_id",
            Self::EngineFailure { .. } => "engine_failure",
            Self::MetadataTimeout { .. } => "metadata_timeout",
            Self::PartialDeletionFailure { .. } => "partial_deletion_failure",
            Self::DescriptorNotFound { .. } => "descriptor_not_found",
            Self::ParseError { .. } => "parse_error",
        }
    }
}

/// Convenience alias for transfer operation results.
pub type TransferResult<T> = Result<T, TransferError>;
