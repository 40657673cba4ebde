//! File record administration: metadata updates and logical deletion.

use crate::error::{ArchiveError, ArchiveResult};
use maproom_metadata::models::{DeletedFileRow, FileRow};
use maproom_metadata::repos::FileRepo;
use maproom_metadata::{CatalogStore, MetadataError};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument};
use uuid::Uuid;

/// Mutable subset of a live file record.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct FilePatch {
    pub file_id: i64,
    pub logical_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Administrative operations over live and deleted file records.
#[derive(Clone)]
pub struct FileAdmin {
    store: Arc<dyn CatalogStore>,
}

impl FileAdmin {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Get a live file record.
    pub async fn get_file(&self, file_id: i64) -> ArchiveResult<FileRow> {
        self.store
            .get_file(file_id)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("file {file_id}")))
    }

    /// Update the mutable fields of a live file record.
    #[instrument(skip(self, patch), fields(file_id = patch.file_id))]
    pub async fn update_file(&self, patch: &FilePatch, principal: Uuid) -> ArchiveResult<()> {
        if patch.logical_name.trim().is_empty() {
            return Err(ArchiveError::Validation(
                "logical name must not be empty".to_string(),
            ));
        }
        self.store
            .update_file(
                patch.file_id,
                &patch.logical_name,
                patch.description.as_deref(),
                principal,
                OffsetDateTime::now_utc(),
            )
            .await
            .map_err(not_found_or_metadata)
    }

    /// Logically delete a batch of files: rows move to the deleted table,
    /// bytes stay on the volume until an operator purges them. Whole-batch:
    /// one missing id aborts the lot.
    #[instrument(skip(self, reason), fields(files = file_ids.len()))]
    pub async fn delete_files(
        &self,
        file_ids: &[i64],
        reason: &str,
        principal: Uuid,
    ) -> ArchiveResult<()> {
        if file_ids.is_empty() {
            return Err(ArchiveError::Validation("no file ids given".to_string()));
        }
        if reason.trim().is_empty() {
            return Err(ArchiveError::Validation(
                "a deletion reason is required".to_string(),
            ));
        }

        self.store
            .delete_files(file_ids, reason, principal, OffsetDateTime::now_utc())
            .await
            .map_err(not_found_or_metadata)?;

        info!(deleted = file_ids.len(), "file records logically deleted");
        Ok(())
    }

    /// Most-recent-first listing of deleted records for the operator surface.
    pub async fn list_deleted(&self, limit: u32) -> ArchiveResult<Vec<DeletedFileRow>> {
        Ok(self.store.list_deleted_files(limit).await?)
    }
}

fn not_found_or_metadata(err: MetadataError) -> ArchiveError {
    match err {
        MetadataError::NotFound(message) => ArchiveError::NotFound(message),
        other => ArchiveError::Metadata(other),
    }
}
