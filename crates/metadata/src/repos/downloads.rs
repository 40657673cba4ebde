//! Download record repository.

use crate::error::MetadataResult;
use crate::models::{DownloadRow, NewDownload};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for download records.
#[async_trait]
pub trait DownloadRepo: Send + Sync {
    /// Create download records for a prepared batch in one transaction:
    /// either every record is issued or none are.
    async fn create_downloads(&self, downloads: &[NewDownload]) -> MetadataResult<()>;

    /// Look up a download record by its token.
    async fn get_download_by_token(&self, token: &str) -> MetadataResult<Option<DownloadRow>>;

    /// Settle a pending download: conditional transition out of `pending`.
    /// Returns the number of rows affected; zero means the record was
    /// already terminal (or absent) and the caller reports a soft error.
    async fn settle_download(
        &self,
        token: &str,
        status: &str,
        error_message: Option<&str>,
        completed_at: OffsetDateTime,
    ) -> MetadataResult<u64>;

    /// Delete records still pending past their expiration. Returns how many
    /// were removed; idempotent.
    async fn delete_expired_downloads(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Most-recent-first listing for the audit surface.
    async fn list_downloads(&self, limit: u32) -> MetadataResult<Vec<DownloadRow>>;
}
