//! Volume resolution and capacity accounting.

use crate::error::{ArchiveError, ArchiveResult};
use maproom_metadata::CatalogStore;
use maproom_metadata::models::VolumeRow;
use maproom_metadata::repos::VolumeRepo;
use std::sync::Arc;

const MB_PER_GB: f64 = 1024.0;

/// Computes available space per volume and selects the target volume for a
/// product category.
///
/// Admission control is advisory: prepare-time checks use declared sizes and
/// the commit re-validates against measured sizes. Nothing here reserves
/// bytes or takes locks.
#[derive(Clone)]
pub struct CapacityAccountant {
    store: Arc<dyn CatalogStore>,
}

impl CapacityAccountant {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Resolve the primary volume for a category. A category without a
    /// primary binding is a hard error, never silently defaulted.
    pub async fn resolve_primary_volume(&self, category_id: i64) -> ArchiveResult<VolumeRow> {
        self.store
            .primary_volume_for_category(category_id)
            .await?
            .ok_or_else(|| {
                ArchiveError::NotFound(format!(
                    "no primary volume bound for category {category_id}"
                ))
            })
    }

    /// Free space on a volume in gigabytes. Consumption counts live file
    /// records plus deleted records whose bytes were not purged yet.
    pub async fn available_space_gb(&self, volume: &VolumeRow) -> ArchiveResult<f64> {
        let used_mb = self.store.used_mb(volume.volume_id).await?;
        Ok(volume.capacity_gb - used_mb / MB_PER_GB)
    }

    /// Advisory admission check: would `additional_mb` more megabytes fit?
    pub async fn ensure_capacity(
        &self,
        volume: &VolumeRow,
        additional_mb: f64,
    ) -> ArchiveResult<()> {
        let available_gb = self.available_space_gb(volume).await?;
        let needed_gb = additional_mb / MB_PER_GB;
        if needed_gb > available_gb {
            return Err(ArchiveError::Conflict(format!(
                "insufficient space on volume {}: need {:.2} GB, {:.2} GB available",
                volume.name, needed_gb, available_gb
            )));
        }
        Ok(())
    }
}
