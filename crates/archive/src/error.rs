//! Archive service error types.

use maproom_metadata::MetadataError;
use thiserror::Error;

/// Archive service error taxonomy.
///
/// Whole-operation failures abort before any state change and surface here.
/// Per-item failures inside confirmation batches are returned as data in the
/// operation's report instead.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("expired: {0}")]
    Expired(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("catalog error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<maproom_core::Error> for ArchiveError {
    fn from(err: maproom_core::Error) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Result type for archive operations.
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
