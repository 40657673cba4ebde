//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::{
    CommitStats, NewUploadSession, StagedFileRow, StagedProductRow, StagedVersionRow,
    UploadSessionRow, VerifiedFile,
};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload sessions and their staged manifest snapshot.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Create a session together with its staged rows in one transaction,
    /// returning the session id. The snapshot is immutable afterwards; only
    /// status fields ever change.
    async fn create_session(&self, session: &NewUploadSession) -> MetadataResult<i64>;

    /// Get a session by its public UUID.
    async fn get_session(&self, session_uuid: Uuid) -> MetadataResult<Option<UploadSessionRow>>;

    /// Atomically claim a session for confirmation: `pending` -> `active`.
    /// Returns None if the session doesn't exist. Returns the session with
    /// status `active` if the claim succeeded, or with its current status if
    /// it didn't; callers inspect the status field.
    async fn begin_confirm(&self, session_uuid: Uuid)
    -> MetadataResult<Option<UploadSessionRow>>;

    /// Staged files of a session, in staging order.
    async fn get_staged_files(&self, session_id: i64) -> MetadataResult<Vec<StagedFileRow>>;

    /// Staged versions of a session, in staging order.
    async fn get_staged_versions(&self, session_id: i64) -> MetadataResult<Vec<StagedVersionRow>>;

    /// Staged products of a session, in staging order.
    async fn get_staged_products(&self, session_id: i64) -> MetadataResult<Vec<StagedProductRow>>;

    /// Whether a live (pending/active) session already stages this physical
    /// path triple. Advisory claim check at prepare time.
    async fn staged_claim_exists(
        &self,
        volume_id: i64,
        physical_name: &str,
        extension: &str,
    ) -> MetadataResult<bool>;

    /// Record the verification outcome for one staged file.
    async fn mark_staged_file(
        &self,
        staged_file_id: i64,
        status: &str,
        error_message: Option<&str>,
        measured_size_mb: Option<f64>,
    ) -> MetadataResult<()>;

    /// Mark a session `failed` with a descriptive error.
    async fn fail_session(
        &self,
        session_id: i64,
        error_message: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Conditionally cancel a live session. Returns rows affected; zero
    /// means the session was already terminal.
    async fn cancel_session(
        &self,
        session_id: i64,
        error_message: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<u64>;

    /// Commit a fully verified session: re-check capacity with measured
    /// sizes, insert product/version/file rows and mark the session
    /// `completed`, all inside one transaction. Any error rolls back every
    /// row so a failed commit leaves the catalog untouched.
    async fn commit_session(
        &self,
        session: &UploadSessionRow,
        verified: &[VerifiedFile],
        now: OffsetDateTime,
    ) -> MetadataResult<CommitStats>;

    /// Mark sessions still live past their expiration as `failed` with a
    /// timeout reason. Returns how many were transitioned; idempotent.
    async fn expire_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64>;

    /// Most-recent-first listing for the admin surface.
    async fn list_sessions(&self, limit: u32) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Recent failed sessions for the problem-upload surface.
    async fn list_failed_sessions(&self, limit: u32) -> MetadataResult<Vec<UploadSessionRow>>;

    /// Staged files of a session filtered by status.
    async fn get_staged_files_by_status(
        &self,
        session_id: i64,
        status: &str,
    ) -> MetadataResult<Vec<StagedFileRow>>;
}
