//! Consistency reconciler: batch audit of catalog metadata against the real
//! contents of every volume.
//!
//! Safe to re-run at any time. The reconciler only reads files and relabels
//! catalog status flags; it never creates or deletes physical bytes.

use crate::error::ArchiveResult;
use crate::verifier::{self, Verification};
use futures::StreamExt;
use maproom_core::{ArchiveConfig, Checksum, FileKind, FileStatus, storage_path};
use maproom_metadata::CatalogStore;
use maproom_metadata::models::{ReconcileDeletedRow, ReconcileFileRow};
use maproom_metadata::repos::FileRepo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

/// Counters reported by one reconciliation run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Live file records examined.
    pub scanned: u64,
    /// Records newly flagged `checksum-invalid`.
    pub flagged: u64,
    /// Previously-flagged records whose content is correct again.
    pub healed: u64,
    /// Physical files present at deleted records' paths with no live record
    /// explaining them.
    pub unexpected: u64,
    /// Single-file I/O faults skipped without aborting the run.
    pub io_errors: u64,
}

enum Verdict {
    Ok,
    Bad(String),
    IoError(String),
}

/// Diffs catalog metadata against volume contents and corrects status flags.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    config: ArchiveConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CatalogStore>, config: ArchiveConfig) -> Self {
        Self { store, config }
    }

    /// Run one full reconciliation pass.
    ///
    /// Individual bad files are recorded and skipped; only a systemic
    /// failure (catalog unreachable) aborts the run.
    #[instrument(skip(self))]
    pub async fn run(&self) -> ArchiveResult<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let now = OffsetDateTime::now_utc();

        self.audit_live_files(&mut report, now).await?;
        self.audit_deleted_files(&mut report).await?;

        info!(
            scanned = report.scanned,
            flagged = report.flagged,
            healed = report.healed,
            unexpected = report.unexpected,
            io_errors = report.io_errors,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Forward check: every live payload file must exist with the recorded
    /// content. Flags newly-bad records and heals recovered ones.
    async fn audit_live_files(
        &self,
        report: &mut ReconcileReport,
        now: OffsetDateTime,
    ) -> ArchiveResult<()> {
        let payloadless = FileKind::RemoteTileService.as_code();
        let mut after = 0i64;

        loop {
            let page = self
                .store
                .reconcile_page(after, self.config.reconcile_page_size, payloadless)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.file_id;

            let checks: Vec<(ReconcileFileRow, Verdict)> =
                futures::stream::iter(page.into_iter().map(|row| async move {
                    let verdict = check_live_file(&row).await;
                    (row, verdict)
                }))
                .buffer_unordered(self.config.reconcile_parallelism)
                .collect()
                .await;

            for (row, verdict) in checks {
                report.scanned += 1;
                match verdict {
                    Verdict::Ok => {
                        if row.status == FileStatus::ChecksumInvalid.as_str() {
                            self.store
                                .set_file_status(row.file_id, FileStatus::Registered.as_str(), now)
                                .await?;
                            report.healed += 1;
                            info!(file_id = row.file_id, "file record healed");
                        }
                    }
                    Verdict::Bad(reason) => {
                        if row.status == FileStatus::Registered.as_str() {
                            self.store
                                .set_file_status(
                                    row.file_id,
                                    FileStatus::ChecksumInvalid.as_str(),
                                    now,
                                )
                                .await?;
                            report.flagged += 1;
                            warn!(file_id = row.file_id, %reason, "file record flagged");
                        }
                    }
                    Verdict::IoError(error) => {
                        report.io_errors += 1;
                        warn!(file_id = row.file_id, %error, "skipping file after I/O fault");
                    }
                }
            }
        }

        Ok(())
    }

    /// Inverted check: a deleted record's physical file is expected to be
    /// absent. A file present there with no live record claiming the same
    /// path needs operator attention.
    async fn audit_deleted_files(&self, report: &mut ReconcileReport) -> ArchiveResult<()> {
        let mut after = 0i64;

        loop {
            let page = self
                .store
                .reconcile_deleted_page(after, self.config.reconcile_page_size)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = last.deleted_file_id;

            let checks: Vec<(ReconcileDeletedRow, Result<bool, String>)> =
                futures::stream::iter(page.into_iter().map(|row| async move {
                    let path = storage_path(&row.root_path, &row.physical_name, &row.extension);
                    let present = verifier::exists(&path).await.map_err(|e| e.to_string());
                    (row, present)
                }))
                .buffer_unordered(self.config.reconcile_parallelism)
                .collect()
                .await;

            for (row, present) in checks {
                match present {
                    Ok(false) => {}
                    Ok(true) => {
                        // A live record may legitimately reuse the path.
                        let explained = self
                            .store
                            .physical_name_exists(row.volume_id, &row.physical_name, &row.extension)
                            .await?;
                        if !explained {
                            report.unexpected += 1;
                            warn!(
                                deleted_file_id = row.deleted_file_id,
                                physical_name = %row.physical_name,
                                "unexpected file at deleted record's path"
                            );
                        }
                    }
                    Err(error) => {
                        report.io_errors += 1;
                        warn!(
                            deleted_file_id = row.deleted_file_id,
                            %error,
                            "skipping deleted record after I/O fault"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

async fn check_live_file(row: &ReconcileFileRow) -> Verdict {
    let path = storage_path(&row.root_path, &row.physical_name, &row.extension);

    let Some(stored) = row.checksum.as_deref() else {
        // No digest recorded: fall back to an existence check.
        return match verifier::exists(&path).await {
            Ok(true) => Verdict::Ok,
            Ok(false) => Verdict::Bad("file missing".to_string()),
            Err(e) => Verdict::IoError(e.to_string()),
        };
    };

    let expected = match Checksum::from_hex(stored) {
        Ok(checksum) => checksum,
        Err(e) => return Verdict::Bad(format!("unreadable stored checksum: {e}")),
    };

    match verifier::verify(&expected, &path).await {
        Ok(Verification::Match { .. }) => Verdict::Ok,
        Ok(Verification::Mismatch { actual, .. }) => {
            Verdict::Bad(format!("checksum mismatch: got {actual}"))
        }
        Ok(Verification::Missing) => Verdict::Bad("file missing".to_string()),
        Err(e) => Verdict::IoError(e.to_string()),
    }
}
