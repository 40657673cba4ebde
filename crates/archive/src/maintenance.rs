//! Idempotent maintenance entry points for the external scheduler.
//!
//! The archive does not own a clock or a background thread: whatever invokes
//! these (typically an hourly scheduler) decides the cadence. Each entry
//! point is argument-less, safe to re-run and returns a structured outcome
//! for logging instead of raising.

use crate::downloads::DownloadBroker;
use crate::reconciler::Reconciler;
use crate::uploads::UploadCoordinator;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Structured result of one maintenance invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceOutcome {
    pub ok: bool,
    pub detail: String,
}

impl MaintenanceOutcome {
    fn success(detail: String) -> Self {
        Self { ok: true, detail }
    }

    fn failure(detail: String) -> Self {
        Self { ok: false, detail }
    }
}

/// Sweep expired pending download tokens.
pub async fn sweep_downloads(broker: &DownloadBroker) -> MaintenanceOutcome {
    match broker.cleanup_expired().await {
        Ok(removed) => {
            info!(removed, "download sweep finished");
            MaintenanceOutcome::success(format!("removed {removed} expired download tokens"))
        }
        Err(e) => {
            error!(error = %e, "download sweep failed");
            MaintenanceOutcome::failure(format!("download sweep failed: {e}"))
        }
    }
}

/// Sweep timed-out upload sessions.
pub async fn sweep_uploads(coordinator: &UploadCoordinator) -> MaintenanceOutcome {
    match coordinator.cleanup_expired().await {
        Ok(expired) => {
            info!(expired, "upload sweep finished");
            MaintenanceOutcome::success(format!("flagged {expired} timed-out upload sessions"))
        }
        Err(e) => {
            error!(error = %e, "upload sweep failed");
            MaintenanceOutcome::failure(format!("upload sweep failed: {e}"))
        }
    }
}

/// Run a full consistency reconciliation.
pub async fn reconcile(reconciler: &Reconciler) -> MaintenanceOutcome {
    match reconciler.run().await {
        Ok(report) => MaintenanceOutcome::success(format!(
            "scanned {} files: {} flagged, {} healed, {} unexpected, {} I/O faults",
            report.scanned, report.flagged, report.healed, report.unexpected, report.io_errors
        )),
        Err(e) => {
            error!(error = %e, "reconciliation aborted");
            MaintenanceOutcome::failure(format!("reconciliation aborted: {e}"))
        }
    }
}
