//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("unknown file kind: {0}")]
    UnknownFileKind(String),

    #[error("unknown status: {0}")]
    UnknownStatus(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
