//! Database models mapping to the catalog schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Categories and volumes
// =============================================================================

/// Product category record.
#[derive(Debug, Clone, FromRow)]
pub struct CategoryRow {
    pub category_id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
}

/// Storage volume record.
#[derive(Debug, Clone, FromRow)]
pub struct VolumeRow {
    pub volume_id: i64,
    pub name: String,
    pub root_path: String,
    pub capacity_gb: f64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Category-to-volume binding. Exactly one binding per category carries the
/// primary flag; new files for the category land on that volume.
#[derive(Debug, Clone, FromRow)]
pub struct VolumeBindingRow {
    pub category_id: i64,
    pub volume_id: i64,
    pub is_primary: bool,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Products and versions
// =============================================================================

/// Product record.
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub product_id: i64,
    pub name: String,
    pub category_id: i64,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

/// Version record.
#[derive(Debug, Clone, FromRow)]
pub struct VersionRow {
    pub version_id: i64,
    pub version_uuid: Uuid,
    pub product_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

/// Resolution of a version to its owning product and category, used when a
/// manifest targets existing versions.
#[derive(Debug, Clone, FromRow)]
pub struct VersionContextRow {
    pub version_id: i64,
    pub product_id: i64,
    pub category_id: i64,
}

// =============================================================================
// File records
// =============================================================================

/// Live file record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub file_id: i64,
    pub file_uuid: Uuid,
    pub logical_name: String,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub size_mb: f64,
    /// Hex SHA-256 digest; NULL only for payload-less kinds.
    pub checksum: Option<String>,
    pub volume_id: i64,
    pub version_id: i64,
    pub status: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<OffsetDateTime>,
}

/// Input for inserting a file record.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_uuid: Uuid,
    pub logical_name: String,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub size_mb: f64,
    pub checksum: Option<String>,
    pub volume_id: i64,
    pub version_id: i64,
    pub status: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

/// File record moved to the deleted table on logical deletion.
#[derive(Debug, Clone, FromRow)]
pub struct DeletedFileRow {
    pub deleted_file_id: i64,
    pub file_uuid: Uuid,
    pub logical_name: String,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub size_mb: f64,
    pub checksum: Option<String>,
    pub volume_id: i64,
    pub version_id: Option<i64>,
    pub deletion_reason: String,
    pub deleted_by: Uuid,
    pub deleted_at: OffsetDateTime,
    pub created_by: Uuid,
    pub created_at: OffsetDateTime,
}

/// Slim row for the reconciliation scan: a live payload file together with
/// its volume root, enough to resolve the physical path.
#[derive(Debug, Clone, FromRow)]
pub struct ReconcileFileRow {
    pub file_id: i64,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub checksum: Option<String>,
    pub status: String,
    pub root_path: String,
}

/// Slim row for the inverted reconciliation check over deleted records.
#[derive(Debug, Clone, FromRow)]
pub struct ReconcileDeletedRow {
    pub deleted_file_id: i64,
    pub physical_name: String,
    pub extension: String,
    pub volume_id: i64,
    pub root_path: String,
}

// =============================================================================
// Download records
// =============================================================================

/// Download record.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRow {
    pub download_id: i64,
    pub token: String,
    pub file_id: i64,
    pub requested_by: Uuid,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

/// Input for issuing a download record.
#[derive(Debug, Clone)]
pub struct NewDownload {
    pub token: String,
    pub file_id: i64,
    pub requested_by: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

// =============================================================================
// Upload sessions and the staged manifest snapshot
// =============================================================================

/// Upload session record.
#[derive(Debug, Clone, FromRow)]
pub struct UploadSessionRow {
    pub session_id: i64,
    pub session_uuid: Uuid,
    pub operation: String,
    pub requested_by: Uuid,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
}

/// Staged product captured at prepare time.
#[derive(Debug, Clone, FromRow)]
pub struct StagedProductRow {
    pub staged_product_id: i64,
    pub session_id: i64,
    pub name: String,
    pub category_id: i64,
    pub description: Option<String>,
}

/// Staged version captured at prepare time. Exactly one of `product_id`
/// (add-version) or `staged_product_id` (add-product) is set.
#[derive(Debug, Clone, FromRow)]
pub struct StagedVersionRow {
    pub staged_version_id: i64,
    pub session_id: i64,
    pub version_uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub product_id: Option<i64>,
    pub staged_product_id: Option<i64>,
}

/// Staged file captured at prepare time. Exactly one of `version_id`
/// (add-files) or `staged_version_id` is set.
#[derive(Debug, Clone, FromRow)]
pub struct StagedFileRow {
    pub staged_file_id: i64,
    pub session_id: i64,
    pub logical_name: String,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub declared_size_mb: f64,
    pub measured_size_mb: Option<f64>,
    pub declared_checksum: String,
    pub destination_path: String,
    pub volume_id: i64,
    pub version_id: Option<i64>,
    pub staged_version_id: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
}

/// Staged product input; referenced from versions by vector index.
#[derive(Debug, Clone)]
pub struct NewStagedProduct {
    pub name: String,
    pub category_id: i64,
    pub description: Option<String>,
}

/// Staged version input. `product_ref` points either at an existing product
/// row or at a staged product by its index in the manifest.
#[derive(Debug, Clone)]
pub struct NewStagedVersion {
    pub version_uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub product_ref: StagedParent,
}

/// Staged file input. `version_ref` points either at an existing version row
/// or at a staged version by its index in the manifest.
#[derive(Debug, Clone)]
pub struct NewStagedFile {
    pub logical_name: String,
    pub physical_name: String,
    pub extension: String,
    pub kind: i64,
    pub declared_size_mb: f64,
    pub declared_checksum: String,
    pub destination_path: String,
    pub volume_id: i64,
    pub version_ref: StagedParent,
}

/// Reference to a staged row's parent: an existing catalog row or another
/// staged row identified by its position in the same manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagedParent {
    Existing(i64),
    Staged(usize),
}

/// Full session input captured at prepare time.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    pub session_uuid: Uuid,
    pub operation: String,
    pub requested_by: Uuid,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub staged_products: Vec<NewStagedProduct>,
    pub staged_versions: Vec<NewStagedVersion>,
    pub staged_files: Vec<NewStagedFile>,
}

/// Verified measurement for one staged file, produced by the integrity
/// check and consumed by the commit.
#[derive(Debug, Clone)]
pub struct VerifiedFile {
    pub staged_file_id: i64,
    pub measured_size_mb: f64,
    pub checksum: Option<String>,
}

/// Counts of catalog rows created by a committed session.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct CommitStats {
    pub products: u64,
    pub versions: u64,
    pub files: u64,
}
