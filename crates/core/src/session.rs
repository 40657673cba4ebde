//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Unique identifier for an upload session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidSessionId(e.to_string()))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of staged operation a session performs at commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    /// Attach files to existing versions.
    AddFiles,
    /// Create versions (with files) under existing products.
    AddVersion,
    /// Create products with their versions and files.
    AddProduct,
}

impl OperationKind {
    /// String representation stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddFiles => "add-files",
            Self::AddVersion => "add-version",
            Self::AddProduct => "add-product",
        }
    }

    /// Parse from the catalog representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "add-files" => Ok(Self::AddFiles),
            "add-version" => Ok(Self::AddVersion),
            "add-product" => Ok(Self::AddProduct),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }
}

/// Upload session state.
///
/// `pending` sessions await confirmation; `active` marks a confirm in
/// flight, so a session is claimed at most once. Everything else is
/// terminal and immutable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// String representation stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the catalog representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }

    /// Whether the session still holds its staged-path claims.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// Whether the session reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        !self.is_live()
    }
}

/// Domain view of an upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadSession {
    /// Unique session identifier.
    pub id: SessionId,
    /// Operation performed at commit.
    pub operation: OperationKind,
    /// Principal that opened the session; only this principal may confirm.
    pub requested_by: Uuid,
    /// Current session state.
    pub status: SessionStatus,
    /// Failure detail for terminal `failed` sessions.
    pub error_message: Option<String>,
    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the session expires unless confirmed or cancelled.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// When the session reached a terminal state.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl UploadSession {
    /// Check if the session has outlived its expiration.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }
}
