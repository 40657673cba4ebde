//! Catalog store error types.

use thiserror::Error;

/// Catalog store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Whether the underlying database reported a uniqueness violation.
    ///
    /// The prepare-time collision probes are advisory; the unique indexes are
    /// the authority, and callers translate their violations into conflicts.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db_err)) => {
                db_err.message().contains("UNIQUE constraint")
            }
            _ => false,
        }
    }
}

/// Result type for catalog operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
