//! Download record lifecycle and broker payloads.

use crate::checksum::Checksum;
use crate::token::DownloadToken;
use serde::{Deserialize, Serialize};

/// Status of a download record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    /// Token issued, transfer not yet confirmed.
    Pending,
    /// Client confirmed a successful transfer.
    Completed,
    /// Client reported a failed transfer.
    Failed,
}

impl DownloadStatus {
    /// String representation stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the catalog representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }

    /// A record leaves `pending` exactly once and never re-enters it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One prepared download: everything the client needs to perform and later
/// confirm the physical copy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreparedDownload {
    /// The file record being fetched.
    pub file_id: i64,
    /// Credential to present at confirm time.
    pub token: DownloadToken,
    /// Resolved physical path the client copies from.
    pub path: String,
    /// Recorded checksum, so the client can verify its copy.
    pub checksum: Option<Checksum>,
}

/// Per-token confirmation submitted by the client after the transfer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfirmation {
    pub token: DownloadToken,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One settled entry of a confirmation batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmationOutcome {
    pub token: DownloadToken,
    pub status: ConfirmStatus,
}

/// Per-token outcome of a confirmation batch.
///
/// Soft errors are data, not failures: an unknown or already-settled token
/// must not poison the rest of the batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmStatus {
    /// Transitioned to `completed`.
    Completed,
    /// Transitioned to `failed`.
    Failed,
    /// No record carries this token.
    UnknownToken,
    /// The token's expiration passed before confirmation.
    Expired,
    /// The record already reached a terminal status.
    AlreadySettled(DownloadStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DownloadStatus::Pending,
            DownloadStatus::Completed,
            DownloadStatus::Failed,
        ] {
            assert_eq!(DownloadStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(DownloadStatus::parse("done").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!DownloadStatus::Pending.is_terminal());
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Failed.is_terminal());
    }
}
