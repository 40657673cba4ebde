//! Upload staging coordinator: the three-phase staged transfer protocol.
//!
//! Prepare validates a manifest and snapshots it into a pending session with
//! resolved destination paths; the client copies bytes out-of-band; confirm
//! re-verifies every file against storage before any catalog row is written.
//! The catalog is a trailing mirror of storage state, never a leading one.

use crate::capacity::CapacityAccountant;
use crate::error::{ArchiveError, ArchiveResult};
use crate::verifier::{self, Verification};
use maproom_core::{
    AddFilesManifest, AddProductManifest, AddVersionManifest, ArchiveConfig, Checksum,
    ConfirmReport, FileKind, FileManifestEntry, FileOutcome, OperationKind, PrepareOutcome,
    SessionId, SessionStatus, UploadSession, UploadTarget, storage_path,
};
use maproom_metadata::models::{
    NewStagedFile, NewStagedProduct, NewStagedVersion, NewUploadSession, StagedParent,
    UploadSessionRow, VerifiedFile, VolumeRow,
};
use maproom_metadata::repos::{CatalogRepo, FileRepo, UploadRepo};
use maproom_metadata::{CatalogStore, MetadataError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Coordinates multi-phase staged uploads into the catalog.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn CatalogStore>,
    capacity: CapacityAccountant,
    config: ArchiveConfig,
}

/// A failed session together with the staged files that sank it.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ProblemUpload {
    pub session: UploadSession,
    pub failed_files: Vec<FileOutcome>,
}

/// One manifest file resolved to its target volume, before staging.
struct PlannedFile<'a> {
    entry: &'a FileManifestEntry,
    volume: &'a VolumeRow,
    version_ref: StagedParent,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn CatalogStore>, config: ArchiveConfig) -> Self {
        let capacity = CapacityAccountant::new(store.clone());
        Self {
            store,
            capacity,
            config,
        }
    }

    // =========================================================================
    // Prepare
    // =========================================================================

    /// Stage new files for existing versions.
    #[instrument(skip(self, manifest), fields(files = manifest.files.len()))]
    pub async fn prepare_add_files(
        &self,
        manifest: &AddFilesManifest,
        principal: Uuid,
    ) -> ArchiveResult<PrepareOutcome> {
        manifest.validate()?;

        // Resolve every referenced version to its category; the whole batch
        // fails if any id is unknown.
        let mut version_ids: Vec<i64> = manifest.files.iter().map(|f| f.version_id).collect();
        version_ids.sort_unstable();
        version_ids.dedup();

        let contexts = self.store.version_contexts(&version_ids).await?;
        if contexts.len() != version_ids.len() {
            let found: Vec<i64> = contexts.iter().map(|c| c.version_id).collect();
            let missing: Vec<String> = version_ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(ArchiveError::NotFound(format!(
                "versions not found: {}",
                missing.join(", ")
            )));
        }

        let category_by_version: HashMap<i64, i64> = contexts
            .iter()
            .map(|c| (c.version_id, c.category_id))
            .collect();
        let volumes = self
            .resolve_volumes(category_by_version.values().copied())
            .await?;

        let planned: Vec<PlannedFile<'_>> = manifest
            .files
            .iter()
            .map(|f| PlannedFile {
                entry: &f.file,
                volume: &volumes[&category_by_version[&f.version_id]],
                version_ref: StagedParent::Existing(f.version_id),
            })
            .collect();

        self.check_claims_and_capacity(&planned).await?;
        self.open_session(OperationKind::AddFiles, principal, vec![], vec![], planned)
            .await
    }

    /// Stage new versions (with their files) under existing products.
    #[instrument(skip(self, manifest), fields(versions = manifest.versions.len()))]
    pub async fn prepare_add_version(
        &self,
        manifest: &AddVersionManifest,
        principal: Uuid,
    ) -> ArchiveResult<PrepareOutcome> {
        manifest.validate()?;

        let mut product_ids: Vec<i64> = manifest.versions.iter().map(|v| v.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let products = self.store.get_products(&product_ids).await?;
        if products.len() != product_ids.len() {
            let found: Vec<i64> = products.iter().map(|p| p.product_id).collect();
            let missing: Vec<String> = product_ids
                .iter()
                .filter(|id| !found.contains(id))
                .map(|id| id.to_string())
                .collect();
            return Err(ArchiveError::NotFound(format!(
                "products not found: {}",
                missing.join(", ")
            )));
        }

        let category_by_product: HashMap<i64, i64> = products
            .iter()
            .map(|p| (p.product_id, p.category_id))
            .collect();
        let volumes = self
            .resolve_volumes(category_by_product.values().copied())
            .await?;

        // Version name collisions: against the catalog and within the batch.
        let mut batch_names: HashSet<(i64, &str)> = HashSet::new();
        for item in &manifest.versions {
            if !batch_names.insert((item.product_id, item.version.name.as_str())) {
                return Err(ArchiveError::Conflict(format!(
                    "duplicate version {:?} for product {} in manifest",
                    item.version.name, item.product_id
                )));
            }
            if self
                .store
                .version_name_exists(item.product_id, &item.version.name)
                .await?
            {
                return Err(ArchiveError::Conflict(format!(
                    "version {:?} already exists for product {}",
                    item.version.name, item.product_id
                )));
            }
        }

        let mut staged_versions = Vec::with_capacity(manifest.versions.len());
        let mut planned = Vec::new();
        for (index, item) in manifest.versions.iter().enumerate() {
            staged_versions.push(NewStagedVersion {
                version_uuid: Uuid::new_v4(),
                name: item.version.name.clone(),
                description: item.version.description.clone(),
                product_ref: StagedParent::Existing(item.product_id),
            });
            let volume = &volumes[&category_by_product[&item.product_id]];
            for entry in &item.version.files {
                planned.push(PlannedFile {
                    entry,
                    volume,
                    version_ref: StagedParent::Staged(index),
                });
            }
        }

        self.check_claims_and_capacity(&planned).await?;
        self.open_session(
            OperationKind::AddVersion,
            principal,
            vec![],
            staged_versions,
            planned,
        )
        .await
    }

    /// Stage new products with their versions and files.
    #[instrument(skip(self, manifest), fields(products = manifest.products.len()))]
    pub async fn prepare_add_product(
        &self,
        manifest: &AddProductManifest,
        principal: Uuid,
    ) -> ArchiveResult<PrepareOutcome> {
        manifest.validate()?;

        let categories: Vec<i64> = manifest.products.iter().map(|p| p.category_id).collect();
        let volumes = self.resolve_volumes(categories.into_iter()).await?;

        for product in &manifest.products {
            if self
                .store
                .product_name_exists(product.category_id, &product.name)
                .await?
            {
                return Err(ArchiveError::Conflict(format!(
                    "product {:?} already exists in category {}",
                    product.name, product.category_id
                )));
            }
            let mut version_names: HashSet<&str> = HashSet::new();
            for version in &product.versions {
                if !version_names.insert(version.name.as_str()) {
                    return Err(ArchiveError::Conflict(format!(
                        "duplicate version {:?} for product {:?} in manifest",
                        version.name, product.name
                    )));
                }
            }
        }

        let mut staged_products = Vec::with_capacity(manifest.products.len());
        let mut staged_versions = Vec::new();
        let mut planned = Vec::new();
        for (product_index, product) in manifest.products.iter().enumerate() {
            staged_products.push(NewStagedProduct {
                name: product.name.clone(),
                category_id: product.category_id,
                description: product.description.clone(),
            });
            let volume = &volumes[&product.category_id];
            for version in &product.versions {
                let version_index = staged_versions.len();
                staged_versions.push(NewStagedVersion {
                    version_uuid: Uuid::new_v4(),
                    name: version.name.clone(),
                    description: version.description.clone(),
                    product_ref: StagedParent::Staged(product_index),
                });
                for entry in &version.files {
                    planned.push(PlannedFile {
                        entry,
                        volume,
                        version_ref: StagedParent::Staged(version_index),
                    });
                }
            }
        }

        self.check_claims_and_capacity(&planned).await?;
        self.open_session(
            OperationKind::AddProduct,
            principal,
            staged_products,
            staged_versions,
            planned,
        )
        .await
    }

    /// Resolve the primary volume for each category, deduplicated.
    async fn resolve_volumes(
        &self,
        categories: impl Iterator<Item = i64>,
    ) -> ArchiveResult<HashMap<i64, VolumeRow>> {
        let mut volumes = HashMap::new();
        for category_id in categories {
            if !volumes.contains_key(&category_id) {
                let volume = self.capacity.resolve_primary_volume(category_id).await?;
                volumes.insert(category_id, volume);
            }
        }
        Ok(volumes)
    }

    /// Collision and capacity checks shared by the three prepare flows.
    ///
    /// Advisory only: the staged-claim probe and the declared-size space
    /// check narrow the window, but the unique index and the measured-size
    /// re-check at commit time are the authority.
    async fn check_claims_and_capacity(&self, planned: &[PlannedFile<'_>]) -> ArchiveResult<()> {
        let mut batch_paths: HashSet<(i64, &str, &str)> = HashSet::new();
        let mut space_needed: HashMap<i64, (f64, &VolumeRow)> = HashMap::new();

        for file in planned {
            let key = (
                file.volume.volume_id,
                file.entry.physical_name.as_str(),
                file.entry.extension.as_str(),
            );
            if !batch_paths.insert(key) {
                return Err(ArchiveError::Conflict(format!(
                    "manifest declares {}.{} twice for volume {}",
                    file.entry.physical_name, file.entry.extension, file.volume.name
                )));
            }

            if self
                .store
                .physical_name_exists(
                    file.volume.volume_id,
                    &file.entry.physical_name,
                    &file.entry.extension,
                )
                .await?
            {
                return Err(ArchiveError::Conflict(format!(
                    "file {}.{} already exists on volume {}",
                    file.entry.physical_name, file.entry.extension, file.volume.name
                )));
            }
            if self
                .store
                .staged_claim_exists(
                    file.volume.volume_id,
                    &file.entry.physical_name,
                    &file.entry.extension,
                )
                .await?
            {
                return Err(ArchiveError::Conflict(format!(
                    "file {}.{} is claimed by another live upload session",
                    file.entry.physical_name, file.entry.extension
                )));
            }

            let slot = space_needed
                .entry(file.volume.volume_id)
                .or_insert((0.0, file.volume));
            slot.0 += file.entry.declared_size_mb;
        }

        for (needed_mb, volume) in space_needed.values() {
            self.capacity.ensure_capacity(volume, *needed_mb).await?;
        }

        Ok(())
    }

    /// Snapshot the manifest into a pending session and hand back targets.
    async fn open_session(
        &self,
        operation: OperationKind,
        principal: Uuid,
        staged_products: Vec<NewStagedProduct>,
        staged_versions: Vec<NewStagedVersion>,
        planned: Vec<PlannedFile<'_>>,
    ) -> ArchiveResult<PrepareOutcome> {
        let now = OffsetDateTime::now_utc();
        let session_id = SessionId::new();

        let mut staged_files = Vec::with_capacity(planned.len());
        let mut targets = Vec::with_capacity(planned.len());
        for file in &planned {
            let destination = storage_path(
                &file.volume.root_path,
                &file.entry.physical_name,
                &file.entry.extension,
            )
            .to_string_lossy()
            .into_owned();

            staged_files.push(NewStagedFile {
                logical_name: file.entry.logical_name.clone(),
                physical_name: file.entry.physical_name.clone(),
                extension: file.entry.extension.clone(),
                kind: file.entry.kind.as_code(),
                declared_size_mb: file.entry.declared_size_mb,
                declared_checksum: file.entry.declared_checksum.to_hex(),
                destination_path: destination.clone(),
                volume_id: file.volume.volume_id,
                version_ref: file.version_ref,
            });
            targets.push(UploadTarget {
                logical_name: file.entry.logical_name.clone(),
                physical_name: file.entry.physical_name.clone(),
                destination_path: destination,
                declared_checksum: file.entry.declared_checksum,
            });
        }

        self.store
            .create_session(&NewUploadSession {
                session_uuid: *session_id.as_uuid(),
                operation: operation.as_str().to_string(),
                requested_by: principal,
                created_at: now,
                expires_at: now + self.config.upload_expiry(),
                staged_products,
                staged_versions,
                staged_files,
            })
            .await?;

        info!(session = %session_id, operation = operation.as_str(), files = targets.len(),
              "upload session opened");
        Ok(PrepareOutcome {
            session_id,
            operation,
            targets,
        })
    }

    // =========================================================================
    // Confirm / cancel
    // =========================================================================

    /// Confirm a session after the client finished its physical copies.
    ///
    /// All-or-nothing: every staged file must verify before a single catalog
    /// row is written. Any failure marks the session failed and leaves the
    /// catalog untouched.
    #[instrument(skip(self), fields(session = %session_id))]
    pub async fn confirm(
        &self,
        session_id: SessionId,
        principal: Uuid,
    ) -> ArchiveResult<ConfirmReport> {
        let now = OffsetDateTime::now_utc();
        let uuid = *session_id.as_uuid();

        let row = self
            .store
            .get_session(uuid)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("upload session {session_id}")))?;

        let status = SessionStatus::parse(&row.status)?;
        if status.is_terminal() {
            return Err(ArchiveError::Conflict(format!(
                "upload session {session_id} already {}",
                row.status
            )));
        }
        if row.requested_by != principal {
            return Err(ArchiveError::Forbidden(
                "only the session owner may confirm it".to_string(),
            ));
        }
        if row.expires_at < now {
            // Left for the sweeper to flag; handlers never time sessions out.
            return Err(ArchiveError::Expired(format!(
                "upload session {session_id} expired before confirmation"
            )));
        }

        let row = self
            .store
            .begin_confirm(uuid)
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("upload session {session_id}")))?;
        if row.status != "active" {
            return Err(ArchiveError::Conflict(format!(
                "upload session {session_id} already {}",
                row.status
            )));
        }

        let staged = self.store.get_staged_files(row.session_id).await?;
        let mut verified = Vec::with_capacity(staged.len());
        let mut outcomes = Vec::with_capacity(staged.len());
        let mut any_failed = false;

        for file in &staged {
            let kind = FileKind::from_code(file.kind)?;
            if !kind.has_payload() {
                // Remote tile services have no bytes to verify.
                verified.push(VerifiedFile {
                    staged_file_id: file.staged_file_id,
                    measured_size_mb: 0.0,
                    checksum: None,
                });
                outcomes.push(FileOutcome {
                    logical_name: file.logical_name.clone(),
                    physical_name: file.physical_name.clone(),
                    ok: true,
                    error_message: None,
                });
                continue;
            }

            let expected = Checksum::from_hex(&file.declared_checksum)?;
            let verdict = verifier::verify(&expected, Path::new(&file.destination_path)).await;
            let failure = match verdict {
                Ok(Verification::Match { measured_size_mb }) => {
                    verified.push(VerifiedFile {
                        staged_file_id: file.staged_file_id,
                        measured_size_mb,
                        checksum: Some(file.declared_checksum.clone()),
                    });
                    None
                }
                Ok(Verification::Mismatch { actual, .. }) => Some(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    file.logical_name, file.declared_checksum, actual
                )),
                Ok(Verification::Missing) => Some(format!(
                    "file not found at {}",
                    file.destination_path
                )),
                Err(e) => Some(format!(
                    "could not verify {}: {e}",
                    file.destination_path
                )),
            };

            match failure {
                None => outcomes.push(FileOutcome {
                    logical_name: file.logical_name.clone(),
                    physical_name: file.physical_name.clone(),
                    ok: true,
                    error_message: None,
                }),
                Some(message) => {
                    any_failed = true;
                    self.store
                        .mark_staged_file(file.staged_file_id, "failed", Some(&message), None)
                        .await?;
                    outcomes.push(FileOutcome {
                        logical_name: file.logical_name.clone(),
                        physical_name: file.physical_name.clone(),
                        ok: false,
                        error_message: Some(message),
                    });
                }
            }
        }

        if any_failed {
            let message = "one or more files failed verification";
            self.store
                .fail_session(row.session_id, message, now)
                .await?;
            warn!(session = %session_id, "upload session failed verification");
            return Ok(ConfirmReport {
                session_id,
                status: SessionStatus::Failed,
                error_message: Some(message.to_string()),
                files: outcomes,
            });
        }

        match self.store.commit_session(&row, &verified, now).await {
            Ok(stats) => {
                info!(session = %session_id, products = stats.products,
                      versions = stats.versions, files = stats.files,
                      "upload session committed");
                Ok(ConfirmReport {
                    session_id,
                    status: SessionStatus::Completed,
                    error_message: None,
                    files: outcomes,
                })
            }
            Err(MetadataError::Constraint(message)) => {
                // Measured sizes overflowed the volume: the advisory
                // prepare-time check passed but the authoritative one didn't.
                self.store
                    .fail_session(row.session_id, &message, now)
                    .await?;
                warn!(session = %session_id, %message, "upload session rejected at commit");
                Ok(ConfirmReport {
                    session_id,
                    status: SessionStatus::Failed,
                    error_message: Some(message),
                    files: outcomes,
                })
            }
            Err(e) if e.is_unique_violation() => {
                let message = "physical name collision detected at commit".to_string();
                self.store
                    .fail_session(row.session_id, &message, now)
                    .await?;
                warn!(session = %session_id, "upload session lost a name race");
                Ok(ConfirmReport {
                    session_id,
                    status: SessionStatus::Failed,
                    error_message: Some(message),
                    files: outcomes,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a live session without touching the catalog. Already-copied
    /// physical files are orphaned for the reconciler or an operator.
    #[instrument(skip(self), fields(session = %session_id))]
    pub async fn cancel(
        &self,
        session_id: SessionId,
        principal: Uuid,
        is_admin: bool,
    ) -> ArchiveResult<()> {
        let row = self
            .store
            .get_session(*session_id.as_uuid())
            .await?
            .ok_or_else(|| ArchiveError::NotFound(format!("upload session {session_id}")))?;

        if row.requested_by != principal && !is_admin {
            return Err(ArchiveError::Forbidden(
                "only the session owner or an administrator may cancel it".to_string(),
            ));
        }

        let affected = self
            .store
            .cancel_session(row.session_id, "cancelled by user", OffsetDateTime::now_utc())
            .await?;
        if affected == 0 {
            return Err(ArchiveError::Conflict(format!(
                "upload session {session_id} already {}",
                row.status
            )));
        }

        info!(session = %session_id, "upload session cancelled");
        Ok(())
    }

    // =========================================================================
    // Sweeping and listings
    // =========================================================================

    /// Mark sessions still live past their expiration as failed with a
    /// timeout reason. Idempotent.
    #[instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> ArchiveResult<u64> {
        let expired = self
            .store
            .expire_sessions(OffsetDateTime::now_utc())
            .await?;
        if expired > 0 {
            info!(expired, "timed-out upload sessions flagged");
        }
        Ok(expired)
    }

    /// Most-recent-first session listing for the admin surface.
    pub async fn list_sessions(&self, limit: u32) -> ArchiveResult<Vec<UploadSession>> {
        let rows = self.store.list_sessions(limit).await?;
        rows.iter().map(session_from_row).collect()
    }

    /// Recent failed sessions together with the staged files that failed.
    pub async fn problem_uploads(&self, limit: u32) -> ArchiveResult<Vec<ProblemUpload>> {
        let rows = self.store.list_failed_sessions(limit).await?;
        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let failed = self
                .store
                .get_staged_files_by_status(row.session_id, "failed")
                .await?;
            result.push(ProblemUpload {
                session: session_from_row(row)?,
                failed_files: failed
                    .into_iter()
                    .map(|f| FileOutcome {
                        logical_name: f.logical_name,
                        physical_name: f.physical_name,
                        ok: false,
                        error_message: f.error_message,
                    })
                    .collect(),
            });
        }
        Ok(result)
    }
}

fn session_from_row(row: &UploadSessionRow) -> ArchiveResult<UploadSession> {
    Ok(UploadSession {
        id: SessionId::parse(&row.session_uuid.to_string())?,
        operation: OperationKind::parse(&row.operation)?,
        requested_by: row.requested_by,
        status: SessionStatus::parse(&row.status)?,
        error_message: row.error_message.clone(),
        created_at: row.created_at,
        expires_at: row.expires_at,
        completed_at: row.completed_at,
    })
}
