//! File record repository.

use crate::error::MetadataResult;
use crate::models::{
    DeletedFileRow, FileRow, NewFile, ReconcileDeletedRow, ReconcileFileRow,
};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for live and deleted file records.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a file record, returning its id.
    async fn insert_file(&self, file: &NewFile) -> MetadataResult<i64>;

    /// Get a file by id.
    async fn get_file(&self, file_id: i64) -> MetadataResult<Option<FileRow>>;

    /// Get files by ids, in no particular order. Missing ids are absent from
    /// the result; the caller detects the shortfall.
    async fn get_files(&self, file_ids: &[i64]) -> MetadataResult<Vec<FileRow>>;

    /// Whether a live record already claims this physical path triple.
    async fn physical_name_exists(
        &self,
        volume_id: i64,
        physical_name: &str,
        extension: &str,
    ) -> MetadataResult<bool>;

    /// Update the mutable subset of a live file record.
    async fn update_file(
        &self,
        file_id: i64,
        logical_name: &str,
        description: Option<&str>,
        updated_by: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Relabel a file's status (reconciliation and deletion workflow).
    async fn set_file_status(
        &self,
        file_id: i64,
        status: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Move file records to the deleted table inside one transaction.
    /// Fails the whole batch with NotFound if any id is missing; no rows are
    /// moved in that case.
    async fn delete_files(
        &self,
        file_ids: &[i64],
        reason: &str,
        deleted_by: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Keyset page of live payload-bearing files joined with their volume
    /// root, ordered by file id. Payload-less kinds are excluded.
    async fn reconcile_page(
        &self,
        after_file_id: i64,
        limit: u32,
        payloadless_kind: i64,
    ) -> MetadataResult<Vec<ReconcileFileRow>>;

    /// Keyset page of deleted file records joined with their volume root,
    /// ordered by deleted file id.
    async fn reconcile_deleted_page(
        &self,
        after_deleted_file_id: i64,
        limit: u32,
    ) -> MetadataResult<Vec<ReconcileDeletedRow>>;

    /// Get deleted file records by ids (operator listings).
    async fn list_deleted_files(&self, limit: u32) -> MetadataResult<Vec<DeletedFileRow>>;
}
