//! Staged file transfer and archive-consistency services for the maproom
//! geospatial archive.
//!
//! Large files move into and out of externally-managed storage volumes while
//! the catalog stays authoritative: the download broker issues short-lived
//! tokens, the upload coordinator runs a prepare/transfer/confirm protocol
//! that only commits verified files, and the reconciler audits the whole
//! archive against physical reality. The byte transport itself is the
//! client's job; this crate only hands out paths and verifies results.

pub mod capacity;
pub mod downloads;
pub mod error;
pub mod files;
pub mod maintenance;
pub mod reconciler;
pub mod uploads;
pub mod verifier;

pub use capacity::CapacityAccountant;
pub use downloads::DownloadBroker;
pub use error::{ArchiveError, ArchiveResult};
pub use files::{FileAdmin, FilePatch};
pub use maintenance::MaintenanceOutcome;
pub use reconciler::{ReconcileReport, Reconciler};
pub use uploads::{ProblemUpload, UploadCoordinator};

use maproom_core::ArchiveConfig;
use maproom_metadata::CatalogStore;
use std::sync::Arc;

/// Bundle of the archive services wired to one catalog store.
#[derive(Clone)]
pub struct Archive {
    pub downloads: DownloadBroker,
    pub uploads: UploadCoordinator,
    pub reconciler: Reconciler,
    pub files: FileAdmin,
    pub capacity: CapacityAccountant,
}

impl Archive {
    pub fn new(store: Arc<dyn CatalogStore>, config: ArchiveConfig) -> Self {
        Self {
            downloads: DownloadBroker::new(store.clone(), config.clone()),
            uploads: UploadCoordinator::new(store.clone(), config.clone()),
            reconciler: Reconciler::new(store.clone(), config),
            files: FileAdmin::new(store.clone()),
            capacity: CapacityAccountant::new(store),
        }
    }
}
