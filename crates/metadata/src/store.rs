//! Catalog store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{CatalogRepo, DownloadRepo, FileRepo, UploadRepo, VolumeRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined catalog store trait.
#[async_trait]
pub trait CatalogStore:
    VolumeRepo + CatalogRepo + FileRepo + DownloadRepo + UploadRepo + Send + Sync
{
    /// Apply the database schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based catalog store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and apply the schema.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MetadataError::Internal(format!("create database dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under concurrent sweeps.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "catalog schema applied");

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Repository trait implementations for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Session statuses that still hold staged-path claims.
    const LIVE_STATUSES: &str = "'pending', 'active'";

    fn placeholders(n: usize) -> String {
        let marks: Vec<&str> = (0..n).map(|_| "?").collect();
        marks.join(", ")
    }

    #[async_trait]
    impl VolumeRepo for SqliteStore {
        async fn create_category(&self, name: &str, now: OffsetDateTime) -> MetadataResult<i64> {
            let result = sqlx::query("INSERT INTO categories (name, created_at) VALUES (?, ?)")
                .bind(name)
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.last_insert_rowid())
        }

        async fn create_volume(
            &self,
            name: &str,
            root_path: &str,
            capacity_gb: f64,
            now: OffsetDateTime,
        ) -> MetadataResult<i64> {
            if capacity_gb <= 0.0 {
                return Err(MetadataError::Constraint(format!(
                    "volume capacity must be positive, got {capacity_gb}"
                )));
            }
            let result = sqlx::query(
                "INSERT INTO volumes (name, root_path, capacity_gb, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(root_path)
            .bind(capacity_gb)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        }

        async fn get_volume(&self, volume_id: i64) -> MetadataResult<Option<VolumeRow>> {
            let row = sqlx::query_as::<_, VolumeRow>("SELECT * FROM volumes WHERE volume_id = ?")
                .bind(volume_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_volumes(&self) -> MetadataResult<Vec<VolumeRow>> {
            let rows = sqlx::query_as::<_, VolumeRow>("SELECT * FROM volumes ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }

        async fn bind_category(
            &self,
            category_id: i64,
            volume_id: i64,
            is_primary: bool,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            // Promotion demotes the previous primary in the same transaction,
            // keeping the one-primary-per-category invariant intact.
            let mut tx = self.pool.begin().await?;

            if is_primary {
                sqlx::query("UPDATE volume_bindings SET is_primary = 0 WHERE category_id = ?")
                    .bind(category_id)
                    .execute(&mut *tx)
                    .await?;
            }

            sqlx::query(
                "INSERT INTO volume_bindings (category_id, volume_id, is_primary, created_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(category_id, volume_id)
                 DO UPDATE SET is_primary = excluded.is_primary",
            )
            .bind(category_id)
            .bind(volume_id)
            .bind(is_primary)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn list_bindings(&self, category_id: i64) -> MetadataResult<Vec<VolumeBindingRow>> {
            let rows = sqlx::query_as::<_, VolumeBindingRow>(
                "SELECT * FROM volume_bindings WHERE category_id = ? ORDER BY volume_id",
            )
            .bind(category_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn primary_volume_for_category(
            &self,
            category_id: i64,
        ) -> MetadataResult<Option<VolumeRow>> {
            let row = sqlx::query_as::<_, VolumeRow>(
                "SELECT vo.* FROM volumes vo
                 JOIN volume_bindings vb ON vb.volume_id = vo.volume_id
                 WHERE vb.category_id = ? AND vb.is_primary = 1",
            )
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn used_mb(&self, volume_id: i64) -> MetadataResult<f64> {
            // Deleted records count until their bytes are physically purged.
            let used: f64 = sqlx::query_scalar(
                "SELECT (SELECT COALESCE(SUM(size_mb), 0.0) FROM files WHERE volume_id = ?1)
                      + (SELECT COALESCE(SUM(size_mb), 0.0) FROM deleted_files WHERE volume_id = ?1)",
            )
            .bind(volume_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(used)
        }
    }

    #[async_trait]
    impl CatalogRepo for SqliteStore {
        async fn create_product(
            &self,
            name: &str,
            category_id: i64,
            description: Option<&str>,
            created_by: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<i64> {
            let result = sqlx::query(
                "INSERT INTO products (name, category_id, description, created_by, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(name)
            .bind(category_id)
            .bind(description)
            .bind(created_by)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        }

        async fn get_product(&self, product_id: i64) -> MetadataResult<Option<ProductRow>> {
            let row = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE product_id = ?")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_products(&self, product_ids: &[i64]) -> MetadataResult<Vec<ProductRow>> {
            if product_ids.is_empty() {
                return Ok(Vec::new());
            }
            let query = format!(
                "SELECT * FROM products WHERE product_id IN ({})",
                placeholders(product_ids.len())
            );
            let mut q = sqlx::query_as::<_, ProductRow>(&query);
            for id in product_ids {
                q = q.bind(id);
            }
            Ok(q.fetch_all(&self.pool).await?)
        }

        async fn product_name_exists(&self, category_id: i64, name: &str) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM products WHERE category_id = ? AND name = ?)",
            )
            .bind(category_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn create_version(
            &self,
            version_uuid: Uuid,
            product_id: i64,
            name: &str,
            description: Option<&str>,
            created_by: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<i64> {
            let result = sqlx::query(
                "INSERT INTO versions (version_uuid, product_id, name, description, created_by, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(version_uuid)
            .bind(product_id)
            .bind(name)
            .bind(description)
            .bind(created_by)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        }

        async fn get_version(&self, version_id: i64) -> MetadataResult<Option<VersionRow>> {
            let row = sqlx::query_as::<_, VersionRow>("SELECT * FROM versions WHERE version_id = ?")
                .bind(version_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn version_contexts(
            &self,
            version_ids: &[i64],
        ) -> MetadataResult<Vec<VersionContextRow>> {
            if version_ids.is_empty() {
                return Ok(Vec::new());
            }
            let query = format!(
                "SELECT v.version_id, v.product_id, p.category_id
                 FROM versions v
                 JOIN products p ON p.product_id = v.product_id
                 WHERE v.version_id IN ({})",
                placeholders(version_ids.len())
            );
            let mut q = sqlx::query_as::<_, VersionContextRow>(&query);
            for id in version_ids {
                q = q.bind(id);
            }
            Ok(q.fetch_all(&self.pool).await?)
        }

        async fn version_name_exists(&self, product_id: i64, name: &str) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM versions WHERE product_id = ? AND name = ?)",
            )
            .bind(product_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn latest_files_for_categories(
            &self,
            category_ids: &[i64],
            kinds: &[i64],
        ) -> MetadataResult<Vec<FileRow>> {
            if category_ids.is_empty() || kinds.is_empty() {
                return Ok(Vec::new());
            }
            // Correlated subquery picks the newest version per product,
            // ties broken by the higher id.
            let query = format!(
                "SELECT f.* FROM files f
                 JOIN versions v ON v.version_id = f.version_id
                 JOIN products p ON p.product_id = v.product_id
                 WHERE p.category_id IN ({})
                   AND f.kind IN ({})
                   AND v.version_id = (
                       SELECT v2.version_id FROM versions v2
                       WHERE v2.product_id = v.product_id
                       ORDER BY v2.created_at DESC, v2.version_id DESC
                       LIMIT 1
                   )
                 ORDER BY f.file_id",
                placeholders(category_ids.len()),
                placeholders(kinds.len())
            );
            let mut q = sqlx::query_as::<_, FileRow>(&query);
            for id in category_ids {
                q = q.bind(id);
            }
            for kind in kinds {
                q = q.bind(kind);
            }
            Ok(q.fetch_all(&self.pool).await?)
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn insert_file(&self, file: &NewFile) -> MetadataResult<i64> {
            let result = sqlx::query(
                "INSERT INTO files (
                    file_uuid, logical_name, physical_name, extension, kind, size_mb,
                    checksum, volume_id, version_id, status, description,
                    created_by, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(file.file_uuid)
            .bind(&file.logical_name)
            .bind(&file.physical_name)
            .bind(&file.extension)
            .bind(file.kind)
            .bind(file.size_mb)
            .bind(&file.checksum)
            .bind(file.volume_id)
            .bind(file.version_id)
            .bind(&file.status)
            .bind(&file.description)
            .bind(file.created_by)
            .bind(file.created_at)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        }

        async fn get_file(&self, file_id: i64) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE file_id = ?")
                .bind(file_id)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn get_files(&self, file_ids: &[i64]) -> MetadataResult<Vec<FileRow>> {
            if file_ids.is_empty() {
                return Ok(Vec::new());
            }
            let query = format!(
                "SELECT * FROM files WHERE file_id IN ({})",
                placeholders(file_ids.len())
            );
            let mut q = sqlx::query_as::<_, FileRow>(&query);
            for id in file_ids {
                q = q.bind(id);
            }
            Ok(q.fetch_all(&self.pool).await?)
        }

        async fn physical_name_exists(
            &self,
            volume_id: i64,
            physical_name: &str,
            extension: &str,
        ) -> MetadataResult<bool> {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM files
                    WHERE volume_id = ? AND physical_name = ? AND extension = ?
                 )",
            )
            .bind(volume_id)
            .bind(physical_name)
            .bind(extension)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        }

        async fn update_file(
            &self,
            file_id: i64,
            logical_name: &str,
            description: Option<&str>,
            updated_by: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query(
                "UPDATE files
                 SET logical_name = ?, description = ?, updated_by = ?, updated_at = ?
                 WHERE file_id = ?",
            )
            .bind(logical_name)
            .bind(description)
            .bind(updated_by)
            .bind(now)
            .bind(file_id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id} not found")));
            }
            Ok(())
        }

        async fn set_file_status(
            &self,
            file_id: i64,
            status: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            let result = sqlx::query("UPDATE files SET status = ?, updated_at = ? WHERE file_id = ?")
                .bind(status)
                .bind(now)
                .bind(file_id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {file_id} not found")));
            }
            Ok(())
        }

        async fn delete_files(
            &self,
            file_ids: &[i64],
            reason: &str,
            deleted_by: Uuid,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            if file_ids.is_empty() {
                return Ok(());
            }

            let mut tx = self.pool.begin().await?;

            // Whole-batch existence check before touching anything.
            let query = format!(
                "SELECT * FROM files WHERE file_id IN ({})",
                placeholders(file_ids.len())
            );
            let mut q = sqlx::query_as::<_, FileRow>(&query);
            for id in file_ids {
                q = q.bind(id);
            }
            let rows: Vec<FileRow> = q.fetch_all(&mut *tx).await?;

            if rows.len() != file_ids.len() {
                let found: Vec<i64> = rows.iter().map(|r| r.file_id).collect();
                let missing: Vec<String> = file_ids
                    .iter()
                    .filter(|id| !found.contains(id))
                    .map(|id| id.to_string())
                    .collect();
                return Err(MetadataError::NotFound(format!(
                    "files not found: {}",
                    missing.join(", ")
                )));
            }

            for file in &rows {
                sqlx::query(
                    "INSERT INTO deleted_files (
                        file_uuid, logical_name, physical_name, extension, kind, size_mb,
                        checksum, volume_id, version_id, deletion_reason, deleted_by,
                        deleted_at, created_by, created_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(file.file_uuid)
                .bind(&file.logical_name)
                .bind(&file.physical_name)
                .bind(&file.extension)
                .bind(file.kind)
                .bind(file.size_mb)
                .bind(&file.checksum)
                .bind(file.volume_id)
                .bind(file.version_id)
                .bind(reason)
                .bind(deleted_by)
                .bind(now)
                .bind(file.created_by)
                .bind(file.created_at)
                .execute(&mut *tx)
                .await?;

                // Unconfirmed tokens for a deleted file can never be served.
                sqlx::query("DELETE FROM downloads WHERE file_id = ? AND status = 'pending'")
                    .bind(file.file_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query("DELETE FROM files WHERE file_id = ?")
                    .bind(file.file_id)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn reconcile_page(
            &self,
            after_file_id: i64,
            limit: u32,
            payloadless_kind: i64,
        ) -> MetadataResult<Vec<ReconcileFileRow>> {
            let rows = sqlx::query_as::<_, ReconcileFileRow>(
                "SELECT f.file_id, f.physical_name, f.extension, f.kind, f.checksum,
                        f.status, vo.root_path
                 FROM files f
                 JOIN volumes vo ON vo.volume_id = f.volume_id
                 WHERE f.file_id > ? AND f.kind <> ?
                 ORDER BY f.file_id
                 LIMIT ?",
            )
            .bind(after_file_id)
            .bind(payloadless_kind)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn reconcile_deleted_page(
            &self,
            after_deleted_file_id: i64,
            limit: u32,
        ) -> MetadataResult<Vec<ReconcileDeletedRow>> {
            let rows = sqlx::query_as::<_, ReconcileDeletedRow>(
                "SELECT df.deleted_file_id, df.physical_name, df.extension,
                        df.volume_id, vo.root_path
                 FROM deleted_files df
                 JOIN volumes vo ON vo.volume_id = df.volume_id
                 WHERE df.deleted_file_id > ?
                 ORDER BY df.deleted_file_id
                 LIMIT ?",
            )
            .bind(after_deleted_file_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_deleted_files(&self, limit: u32) -> MetadataResult<Vec<DeletedFileRow>> {
            let rows = sqlx::query_as::<_, DeletedFileRow>(
                "SELECT * FROM deleted_files ORDER BY deleted_at DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl DownloadRepo for SqliteStore {
        async fn create_downloads(&self, downloads: &[NewDownload]) -> MetadataResult<()> {
            let mut tx = self.pool.begin().await?;

            for download in downloads {
                sqlx::query(
                    "INSERT INTO downloads (token, file_id, requested_by, status, created_at, expires_at)
                     VALUES (?, ?, ?, 'pending', ?, ?)",
                )
                .bind(&download.token)
                .bind(download.file_id)
                .bind(download.requested_by)
                .bind(download.created_at)
                .bind(download.expires_at)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_download_by_token(&self, token: &str) -> MetadataResult<Option<DownloadRow>> {
            let row = sqlx::query_as::<_, DownloadRow>("SELECT * FROM downloads WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn settle_download(
            &self,
            token: &str,
            status: &str,
            error_message: Option<&str>,
            completed_at: OffsetDateTime,
        ) -> MetadataResult<u64> {
            // Conditional transition: a token leaves 'pending' at most once.
            let result = sqlx::query(
                "UPDATE downloads
                 SET status = ?, error_message = ?, completed_at = ?
                 WHERE token = ? AND status = 'pending'",
            )
            .bind(status)
            .bind(error_message)
            .bind(completed_at)
            .bind(token)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        }

        async fn delete_expired_downloads(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let result =
                sqlx::query("DELETE FROM downloads WHERE status = 'pending' AND expires_at < ?")
                    .bind(now)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected())
        }

        async fn list_downloads(&self, limit: u32) -> MetadataResult<Vec<DownloadRow>> {
            let rows = sqlx::query_as::<_, DownloadRow>(
                "SELECT * FROM downloads ORDER BY created_at DESC, download_id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl UploadRepo for SqliteStore {
        async fn create_session(&self, session: &NewUploadSession) -> MetadataResult<i64> {
            let mut tx = self.pool.begin().await?;

            let result = sqlx::query(
                "INSERT INTO upload_sessions (
                    session_uuid, operation, requested_by, status, created_at, expires_at
                 ) VALUES (?, ?, ?, 'pending', ?, ?)",
            )
            .bind(session.session_uuid)
            .bind(&session.operation)
            .bind(session.requested_by)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&mut *tx)
            .await?;
            let session_id = result.last_insert_rowid();

            let mut staged_product_ids = Vec::with_capacity(session.staged_products.len());
            for product in &session.staged_products {
                let result = sqlx::query(
                    "INSERT INTO staged_products (session_id, name, category_id, description)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(session_id)
                .bind(&product.name)
                .bind(product.category_id)
                .bind(&product.description)
                .execute(&mut *tx)
                .await?;
                staged_product_ids.push(result.last_insert_rowid());
            }

            let mut staged_version_ids = Vec::with_capacity(session.staged_versions.len());
            for version in &session.staged_versions {
                let (product_id, staged_product_id) = match version.product_ref {
                    StagedParent::Existing(id) => (Some(id), None),
                    StagedParent::Staged(index) => {
                        let id = staged_product_ids.get(index).copied().ok_or_else(|| {
                            MetadataError::Internal(format!(
                                "staged version references product index {index} out of range"
                            ))
                        })?;
                        (None, Some(id))
                    }
                };
                let result = sqlx::query(
                    "INSERT INTO staged_versions (
                        session_id, version_uuid, name, description, product_id, staged_product_id
                     ) VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(session_id)
                .bind(version.version_uuid)
                .bind(&version.name)
                .bind(&version.description)
                .bind(product_id)
                .bind(staged_product_id)
                .execute(&mut *tx)
                .await?;
                staged_version_ids.push(result.last_insert_rowid());
            }

            for file in &session.staged_files {
                let (version_id, staged_version_id) = match file.version_ref {
                    StagedParent::Existing(id) => (Some(id), None),
                    StagedParent::Staged(index) => {
                        let id = staged_version_ids.get(index).copied().ok_or_else(|| {
                            MetadataError::Internal(format!(
                                "staged file references version index {index} out of range"
                            ))
                        })?;
                        (None, Some(id))
                    }
                };
                sqlx::query(
                    "INSERT INTO staged_files (
                        session_id, logical_name, physical_name, extension, kind,
                        declared_size_mb, declared_checksum, destination_path, volume_id,
                        version_id, staged_version_id, status
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending')",
                )
                .bind(session_id)
                .bind(&file.logical_name)
                .bind(&file.physical_name)
                .bind(&file.extension)
                .bind(file.kind)
                .bind(file.declared_size_mb)
                .bind(&file.declared_checksum)
                .bind(&file.destination_path)
                .bind(file.volume_id)
                .bind(version_id)
                .bind(staged_version_id)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(session_id)
        }

        async fn get_session(
            &self,
            session_uuid: Uuid,
        ) -> MetadataResult<Option<UploadSessionRow>> {
            let row = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE session_uuid = ?",
            )
            .bind(session_uuid)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn begin_confirm(
            &self,
            session_uuid: Uuid,
        ) -> MetadataResult<Option<UploadSessionRow>> {
            // Atomically claim the session: only one confirm attempt ever
            // observes the pending -> active transition.
            let mut tx = self.pool.begin().await?;

            let mut session = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE session_uuid = ?",
            )
            .bind(session_uuid)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(ref mut s) = session
                && s.status == "pending"
            {
                let result = sqlx::query(
                    "UPDATE upload_sessions SET status = 'active'
                     WHERE session_id = ? AND status = 'pending'",
                )
                .bind(s.session_id)
                .execute(&mut *tx)
                .await?;

                if result.rows_affected() > 0 {
                    s.status = "active".to_string();
                }
            }

            tx.commit().await?;
            Ok(session)
        }

        async fn get_staged_files(&self, session_id: i64) -> MetadataResult<Vec<StagedFileRow>> {
            let rows = sqlx::query_as::<_, StagedFileRow>(
                "SELECT * FROM staged_files WHERE session_id = ? ORDER BY staged_file_id",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_staged_versions(
            &self,
            session_id: i64,
        ) -> MetadataResult<Vec<StagedVersionRow>> {
            let rows = sqlx::query_as::<_, StagedVersionRow>(
                "SELECT * FROM staged_versions WHERE session_id = ? ORDER BY staged_version_id",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_staged_products(
            &self,
            session_id: i64,
        ) -> MetadataResult<Vec<StagedProductRow>> {
            let rows = sqlx::query_as::<_, StagedProductRow>(
                "SELECT * FROM staged_products WHERE session_id = ? ORDER BY staged_product_id",
            )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn staged_claim_exists(
            &self,
            volume_id: i64,
            physical_name: &str,
            extension: &str,
        ) -> MetadataResult<bool> {
            let query = format!(
                "SELECT EXISTS(
                    SELECT 1 FROM staged_files sf
                    JOIN upload_sessions us ON us.session_id = sf.session_id
                    WHERE sf.volume_id = ? AND sf.physical_name = ? AND sf.extension = ?
                      AND us.status IN ({LIVE_STATUSES})
                 )"
            );
            let exists: bool = sqlx::query_scalar(&query)
                .bind(volume_id)
                .bind(physical_name)
                .bind(extension)
                .fetch_one(&self.pool)
                .await?;
            Ok(exists)
        }

        async fn mark_staged_file(
            &self,
            staged_file_id: i64,
            status: &str,
            error_message: Option<&str>,
            measured_size_mb: Option<f64>,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE staged_files
                 SET status = ?, error_message = ?, measured_size_mb = ?
                 WHERE staged_file_id = ?",
            )
            .bind(status)
            .bind(error_message)
            .bind(measured_size_mb)
            .bind(staged_file_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn fail_session(
            &self,
            session_id: i64,
            error_message: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<()> {
            sqlx::query(
                "UPDATE upload_sessions
                 SET status = 'failed', error_message = ?, completed_at = ?
                 WHERE session_id = ?",
            )
            .bind(error_message)
            .bind(now)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        }

        async fn cancel_session(
            &self,
            session_id: i64,
            error_message: &str,
            now: OffsetDateTime,
        ) -> MetadataResult<u64> {
            let query = format!(
                "UPDATE upload_sessions
                 SET status = 'cancelled', error_message = ?, completed_at = ?
                 WHERE session_id = ? AND status IN ({LIVE_STATUSES})"
            );
            let result = sqlx::query(&query)
                .bind(error_message)
                .bind(now)
                .bind(session_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn commit_session(
            &self,
            session: &UploadSessionRow,
            verified: &[VerifiedFile],
            now: OffsetDateTime,
        ) -> MetadataResult<CommitStats> {
            let mut tx = self.pool.begin().await?;
            let mut stats = CommitStats::default();

            let staged_products = sqlx::query_as::<_, StagedProductRow>(
                "SELECT * FROM staged_products WHERE session_id = ? ORDER BY staged_product_id",
            )
            .bind(session.session_id)
            .fetch_all(&mut *tx)
            .await?;

            let staged_versions = sqlx::query_as::<_, StagedVersionRow>(
                "SELECT * FROM staged_versions WHERE session_id = ? ORDER BY staged_version_id",
            )
            .bind(session.session_id)
            .fetch_all(&mut *tx)
            .await?;

            let staged_files = sqlx::query_as::<_, StagedFileRow>(
                "SELECT * FROM staged_files WHERE session_id = ? ORDER BY staged_file_id",
            )
            .bind(session.session_id)
            .fetch_all(&mut *tx)
            .await?;

            // Re-check capacity with measured sizes inside the transaction.
            // The prepare-time check used declared sizes and is advisory only.
            let mut additional_mb: std::collections::HashMap<i64, f64> =
                std::collections::HashMap::new();
            for file in &staged_files {
                let measured = verified
                    .iter()
                    .find(|v| v.staged_file_id == file.staged_file_id)
                    .map(|v| v.measured_size_mb)
                    .ok_or_else(|| {
                        MetadataError::Internal(format!(
                            "staged file {} has no verification result",
                            file.staged_file_id
                        ))
                    })?;
                *additional_mb.entry(file.volume_id).or_insert(0.0) += measured;
            }
            for (volume_id, add_mb) in &additional_mb {
                let capacity_gb: f64 =
                    sqlx::query_scalar("SELECT capacity_gb FROM volumes WHERE volume_id = ?")
                        .bind(volume_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or_else(|| {
                            MetadataError::NotFound(format!("volume {volume_id} not found"))
                        })?;
                let used_mb: f64 = sqlx::query_scalar(
                    "SELECT (SELECT COALESCE(SUM(size_mb), 0.0) FROM files WHERE volume_id = ?1)
                          + (SELECT COALESCE(SUM(size_mb), 0.0) FROM deleted_files WHERE volume_id = ?1)",
                )
                .bind(volume_id)
                .fetch_one(&mut *tx)
                .await?;

                if (used_mb + add_mb) / 1024.0 > capacity_gb {
                    return Err(MetadataError::Constraint(format!(
                        "insufficient space on volume {volume_id}: need {:.2} MB, {:.2} MB free",
                        add_mb,
                        (capacity_gb * 1024.0 - used_mb).max(0.0)
                    )));
                }
            }

            // Staged products become catalog products.
            let mut product_ids: std::collections::HashMap<i64, i64> =
                std::collections::HashMap::new();
            for product in &staged_products {
                let result = sqlx::query(
                    "INSERT INTO products (name, category_id, description, created_by, created_at)
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&product.name)
                .bind(product.category_id)
                .bind(&product.description)
                .bind(session.requested_by)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                product_ids.insert(product.staged_product_id, result.last_insert_rowid());
                stats.products += 1;
            }

            // Staged versions become catalog versions.
            let mut version_ids: std::collections::HashMap<i64, i64> =
                std::collections::HashMap::new();
            for version in &staged_versions {
                let product_id = match (version.product_id, version.staged_product_id) {
                    (Some(id), _) => id,
                    (None, Some(staged_id)) => {
                        *product_ids.get(&staged_id).ok_or_else(|| {
                            MetadataError::Internal(format!(
                                "staged version {} references unknown staged product {staged_id}",
                                version.staged_version_id
                            ))
                        })?
                    }
                    (None, None) => {
                        return Err(MetadataError::Internal(format!(
                            "staged version {} has no parent product",
                            version.staged_version_id
                        )));
                    }
                };
                let result = sqlx::query(
                    "INSERT INTO versions (version_uuid, product_id, name, description, created_by, created_at)
                     VALUES (?, ?, ?, ?, ?, ?)",
                )
                .bind(version.version_uuid)
                .bind(product_id)
                .bind(&version.name)
                .bind(&version.description)
                .bind(session.requested_by)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                version_ids.insert(version.staged_version_id, result.last_insert_rowid());
                stats.versions += 1;
            }

            // Staged files become catalog file records, carrying measured
            // sizes rather than declared ones.
            for file in &staged_files {
                let verification = verified
                    .iter()
                    .find(|v| v.staged_file_id == file.staged_file_id)
                    .ok_or_else(|| {
                        MetadataError::Internal(format!(
                            "staged file {} has no verification result",
                            file.staged_file_id
                        ))
                    })?;
                let version_id = match (file.version_id, file.staged_version_id) {
                    (Some(id), _) => id,
                    (None, Some(staged_id)) => {
                        *version_ids.get(&staged_id).ok_or_else(|| {
                            MetadataError::Internal(format!(
                                "staged file {} references unknown staged version {staged_id}",
                                file.staged_file_id
                            ))
                        })?
                    }
                    (None, None) => {
                        return Err(MetadataError::Internal(format!(
                            "staged file {} has no parent version",
                            file.staged_file_id
                        )));
                    }
                };

                sqlx::query(
                    "INSERT INTO files (
                        file_uuid, logical_name, physical_name, extension, kind, size_mb,
                        checksum, volume_id, version_id, status, description,
                        created_by, created_at
                     ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'registered', NULL, ?, ?)",
                )
                .bind(Uuid::new_v4())
                .bind(&file.logical_name)
                .bind(&file.physical_name)
                .bind(&file.extension)
                .bind(file.kind)
                .bind(verification.measured_size_mb)
                .bind(&verification.checksum)
                .bind(file.volume_id)
                .bind(version_id)
                .bind(session.requested_by)
                .bind(now)
                .execute(&mut *tx)
                .await?;
                stats.files += 1;

                sqlx::query(
                    "UPDATE staged_files SET status = 'completed', measured_size_mb = ?
                     WHERE staged_file_id = ?",
                )
                .bind(verification.measured_size_mb)
                .bind(file.staged_file_id)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                "UPDATE upload_sessions SET status = 'completed', completed_at = ?
                 WHERE session_id = ?",
            )
            .bind(now)
            .bind(session.session_id)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(stats)
        }

        async fn expire_sessions(&self, now: OffsetDateTime) -> MetadataResult<u64> {
            let query = format!(
                "UPDATE upload_sessions
                 SET status = 'failed',
                     error_message = 'session expired before confirmation',
                     completed_at = ?
                 WHERE status IN ({LIVE_STATUSES}) AND expires_at < ?"
            );
            let result = sqlx::query(&query)
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        }

        async fn list_sessions(&self, limit: u32) -> MetadataResult<Vec<UploadSessionRow>> {
            let rows = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions ORDER BY created_at DESC, session_id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn list_failed_sessions(&self, limit: u32) -> MetadataResult<Vec<UploadSessionRow>> {
            let rows = sqlx::query_as::<_, UploadSessionRow>(
                "SELECT * FROM upload_sessions WHERE status = 'failed'
                 ORDER BY created_at DESC, session_id DESC LIMIT ?",
            )
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_staged_files_by_status(
            &self,
            session_id: i64,
            status: &str,
        ) -> MetadataResult<Vec<StagedFileRow>> {
            let rows = sqlx::query_as::<_, StagedFileRow>(
                "SELECT * FROM staged_files WHERE session_id = ? AND status = ?
                 ORDER BY staged_file_id",
            )
            .bind(session_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Product categories
CREATE TABLE IF NOT EXISTS categories (
    category_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Storage volumes
CREATE TABLE IF NOT EXISTS volumes (
    volume_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    root_path TEXT NOT NULL,
    capacity_gb REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Category-to-volume bindings
CREATE TABLE IF NOT EXISTS volume_bindings (
    category_id INTEGER NOT NULL REFERENCES categories(category_id),
    volume_id INTEGER NOT NULL REFERENCES volumes(volume_id),
    is_primary INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (category_id, volume_id)
);
-- At most one primary binding per category (partial unique index)
CREATE UNIQUE INDEX IF NOT EXISTS idx_bindings_primary
ON volume_bindings(category_id) WHERE is_primary = 1;

-- Products
CREATE TABLE IF NOT EXISTS products (
    product_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    category_id INTEGER NOT NULL REFERENCES categories(category_id),
    description TEXT,
    created_by BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (category_id, name)
);

-- Versions
CREATE TABLE IF NOT EXISTS versions (
    version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    version_uuid BLOB NOT NULL UNIQUE,
    product_id INTEGER NOT NULL REFERENCES products(product_id),
    name TEXT NOT NULL,
    description TEXT,
    created_by BLOB NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (product_id, name)
);
CREATE INDEX IF NOT EXISTS idx_versions_product ON versions(product_id, created_at);

-- Live file records
-- The unique index on (volume_id, physical_name, extension) is the authority
-- for the one-record-per-physical-path invariant; prepare-time probes are
-- advisory only.
CREATE TABLE IF NOT EXISTS files (
    file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_uuid BLOB NOT NULL UNIQUE,
    logical_name TEXT NOT NULL,
    physical_name TEXT NOT NULL,
    extension TEXT NOT NULL,
    kind INTEGER NOT NULL,
    size_mb REAL NOT NULL,
    checksum TEXT,
    volume_id INTEGER NOT NULL REFERENCES volumes(volume_id),
    version_id INTEGER NOT NULL REFERENCES versions(version_id),
    status TEXT NOT NULL DEFAULT 'registered',
    description TEXT,
    created_by BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_by BLOB,
    updated_at TEXT,
    UNIQUE (volume_id, physical_name, extension)
);
CREATE INDEX IF NOT EXISTS idx_files_version ON files(version_id);
CREATE INDEX IF NOT EXISTS idx_files_status ON files(status);
CREATE INDEX IF NOT EXISTS idx_files_volume ON files(volume_id);

-- Deleted file records: logical deletion moves rows here; bytes stay on the
-- volume until an operator purges them.
CREATE TABLE IF NOT EXISTS deleted_files (
    deleted_file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_uuid BLOB NOT NULL,
    logical_name TEXT NOT NULL,
    physical_name TEXT NOT NULL,
    extension TEXT NOT NULL,
    kind INTEGER NOT NULL,
    size_mb REAL NOT NULL,
    checksum TEXT,
    volume_id INTEGER NOT NULL REFERENCES volumes(volume_id),
    version_id INTEGER,
    deletion_reason TEXT NOT NULL,
    deleted_by BLOB NOT NULL,
    deleted_at TEXT NOT NULL,
    created_by BLOB NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_deleted_files_volume ON deleted_files(volume_id);

-- Download records. file_id intentionally carries no foreign key: terminal
-- records outlive logical deletion of their file for the audit trail.
CREATE TABLE IF NOT EXISTS downloads (
    download_id INTEGER PRIMARY KEY AUTOINCREMENT,
    token TEXT NOT NULL UNIQUE,
    file_id INTEGER NOT NULL,
    requested_by BLOB NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_downloads_status ON downloads(status, expires_at);
CREATE INDEX IF NOT EXISTS idx_downloads_file ON downloads(file_id);

-- Upload sessions
CREATE TABLE IF NOT EXISTS upload_sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_uuid BLOB NOT NULL UNIQUE,
    operation TEXT NOT NULL,
    requested_by BLOB NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_upload_sessions_status ON upload_sessions(status, expires_at);

-- Staged manifest snapshot: immutable after prepare, only status fields change.
CREATE TABLE IF NOT EXISTS staged_products (
    staged_product_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    category_id INTEGER NOT NULL,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_staged_products_session ON staged_products(session_id);

CREATE TABLE IF NOT EXISTS staged_versions (
    staged_version_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
    version_uuid BLOB NOT NULL,
    name TEXT NOT NULL,
    description TEXT,
    product_id INTEGER,
    staged_product_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_staged_versions_session ON staged_versions(session_id);

CREATE TABLE IF NOT EXISTS staged_files (
    staged_file_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES upload_sessions(session_id) ON DELETE CASCADE,
    logical_name TEXT NOT NULL,
    physical_name TEXT NOT NULL,
    extension TEXT NOT NULL,
    kind INTEGER NOT NULL,
    declared_size_mb REAL NOT NULL,
    measured_size_mb REAL,
    declared_checksum TEXT NOT NULL,
    destination_path TEXT NOT NULL,
    volume_id INTEGER NOT NULL,
    version_id INTEGER,
    staged_version_id INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    error_message TEXT
);
CREATE INDEX IF NOT EXISTS idx_staged_files_session ON staged_files(session_id);
CREATE INDEX IF NOT EXISTS idx_staged_files_claim
ON staged_files(volume_id, physical_name, extension);
"#;
