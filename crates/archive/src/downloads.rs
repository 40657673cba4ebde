//! Download broker: token issuance and completion tracking.

use crate::error::{ArchiveError, ArchiveResult};
use maproom_core::{
    ArchiveConfig, Checksum, ConfirmStatus, ConfirmationOutcome, DownloadConfirmation,
    DownloadStatus, DownloadToken, FileKind, PreparedDownload, storage_path,
};
use maproom_metadata::CatalogStore;
use maproom_metadata::models::{DownloadRow, FileRow, NewDownload, VolumeRow};
use maproom_metadata::repos::{CatalogRepo, DownloadRepo, FileRepo, VolumeRepo};
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Issues short-lived download tokens for existing files and tracks their
/// completion. The client performs the physical copy out-of-band and calls
/// back to confirm.
#[derive(Clone)]
pub struct DownloadBroker {
    store: Arc<dyn CatalogStore>,
    config: ArchiveConfig,
}

impl DownloadBroker {
    pub fn new(store: Arc<dyn CatalogStore>, config: ArchiveConfig) -> Self {
        Self { store, config }
    }

    /// Issue tokens for a batch of file ids.
    ///
    /// Fails the whole batch with NotFound if any id is missing: no download
    /// record is created for the others either.
    #[instrument(skip(self), fields(files = file_ids.len()))]
    pub async fn prepare(
        &self,
        file_ids: &[i64],
        principal: Uuid,
    ) -> ArchiveResult<Vec<PreparedDownload>> {
        if file_ids.is_empty() {
            return Err(ArchiveError::Validation(
                "no file ids requested".to_string(),
            ));
        }

        let files = self.store.get_files(file_ids).await?;
        if files.len() != file_ids.len() {
            let found: Vec<i64> = files.iter().map(|f| f.file_id).collect();
            let missing: Vec<String> = file_ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(ArchiveError::NotFound(format!(
                "files not found: {}",
                missing.join(", ")
            )));
        }

        self.issue(files, principal).await
    }

    /// Issue tokens for the newest version of every product in the given
    /// categories, restricted to the requested file kinds. Backs the
    /// "latest snapshot" bulk export.
    #[instrument(skip(self), fields(categories = category_ids.len()))]
    pub async fn prepare_by_category(
        &self,
        category_ids: &[i64],
        kinds: &[FileKind],
        principal: Uuid,
    ) -> ArchiveResult<Vec<PreparedDownload>> {
        if category_ids.is_empty() || kinds.is_empty() {
            return Err(ArchiveError::Validation(
                "categories and file kinds must not be empty".to_string(),
            ));
        }

        let kind_codes: Vec<i64> = kinds.iter().map(|k| k.as_code()).collect();
        let files = self
            .store
            .latest_files_for_categories(category_ids, &kind_codes)
            .await?;
        if files.is_empty() {
            return Err(ArchiveError::NotFound(
                "no files match the requested categories and kinds".to_string(),
            ));
        }

        self.issue(files, principal).await
    }

    /// Create pending download records for the files and hand back tokens
    /// with resolved physical paths.
    async fn issue(
        &self,
        files: Vec<FileRow>,
        principal: Uuid,
    ) -> ArchiveResult<Vec<PreparedDownload>> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.config.download_expiry();

        let mut volumes: HashMap<i64, VolumeRow> = HashMap::new();
        for file in &files {
            if !volumes.contains_key(&file.volume_id) {
                let volume = self.store.get_volume(file.volume_id).await?.ok_or_else(|| {
                    ArchiveError::NotFound(format!("volume {} not found", file.volume_id))
                })?;
                volumes.insert(file.volume_id, volume);
            }
        }

        let mut records = Vec::with_capacity(files.len());
        let mut prepared = Vec::with_capacity(files.len());
        for file in &files {
            let token = DownloadToken::generate();
            let volume = &volumes[&file.volume_id];
            let path = storage_path(&volume.root_path, &file.physical_name, &file.extension);
            let checksum = file
                .checksum
                .as_deref()
                .map(Checksum::from_hex)
                .transpose()?;

            records.push(NewDownload {
                token: token.as_str().to_string(),
                file_id: file.file_id,
                requested_by: principal,
                created_at: now,
                expires_at,
            });
            prepared.push(PreparedDownload {
                file_id: file.file_id,
                token,
                path: path.to_string_lossy().into_owned(),
                checksum,
            });
        }

        self.store.create_downloads(&records).await?;
        info!(issued = prepared.len(), "download tokens issued");
        Ok(prepared)
    }

    /// Settle a batch of confirmations, one verdict per token.
    ///
    /// Unknown, expired or already-settled tokens yield a per-item soft
    /// status and never fail the batch; retries and duplicate deliveries
    /// cannot corrupt other tokens' state.
    #[instrument(skip(self, confirmations), fields(count = confirmations.len()))]
    pub async fn confirm(
        &self,
        confirmations: &[DownloadConfirmation],
    ) -> ArchiveResult<Vec<ConfirmationOutcome>> {
        let now = OffsetDateTime::now_utc();
        let mut outcomes = Vec::with_capacity(confirmations.len());

        for confirmation in confirmations {
            let status = self.settle_one(confirmation, now).await?;
            outcomes.push(ConfirmationOutcome {
                token: confirmation.token.clone(),
                status,
            });
        }

        Ok(outcomes)
    }

    async fn settle_one(
        &self,
        confirmation: &DownloadConfirmation,
        now: OffsetDateTime,
    ) -> ArchiveResult<ConfirmStatus> {
        let token = confirmation.token.as_str();
        let Some(row) = self.store.get_download_by_token(token).await? else {
            return Ok(ConfirmStatus::UnknownToken);
        };

        if let Some(settled) = already_settled(&row)? {
            return Ok(settled);
        }
        if row.expires_at < now {
            // The sweeper owns the terminal transition for timed-out records;
            // a late confirmation is only reported back as expired.
            return Ok(ConfirmStatus::Expired);
        }

        let (status, outcome) = if confirmation.success {
            (DownloadStatus::Completed, ConfirmStatus::Completed)
        } else {
            (DownloadStatus::Failed, ConfirmStatus::Failed)
        };
        let affected = self
            .store
            .settle_download(
                token,
                status.as_str(),
                confirmation.error_message.as_deref(),
                now,
            )
            .await?;

        if affected == 0 {
            // Lost a race against another confirmation; report what won.
            let row = self.store.get_download_by_token(token).await?;
            return match row {
                Some(row) => Ok(already_settled(&row)?.unwrap_or(ConfirmStatus::UnknownToken)),
                None => Ok(ConfirmStatus::UnknownToken),
            };
        }

        Ok(outcome)
    }

    /// Remove download records still pending past their expiration. These
    /// transfers were never confirmed. Idempotent.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> ArchiveResult<u64> {
        let removed = self
            .store
            .delete_expired_downloads(OffsetDateTime::now_utc())
            .await?;
        if removed > 0 {
            info!(removed, "expired download tokens removed");
        }
        Ok(removed)
    }

    /// Most-recent-first audit listing.
    pub async fn list(&self, limit: u32) -> ArchiveResult<Vec<DownloadRow>> {
        Ok(self.store.list_downloads(limit).await?)
    }
}

fn already_settled(row: &DownloadRow) -> ArchiveResult<Option<ConfirmStatus>> {
    let status = DownloadStatus::parse(&row.status)?;
    if status.is_terminal() {
        Ok(Some(ConfirmStatus::AlreadySettled(status)))
    } else {
        Ok(None)
    }
}
