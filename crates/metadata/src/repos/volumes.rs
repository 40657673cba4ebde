//! Volume registry and capacity accounting repository.

use crate::error::MetadataResult;
use crate::models::{VolumeBindingRow, VolumeRow};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for storage volumes and their category bindings.
#[async_trait]
pub trait VolumeRepo: Send + Sync {
    /// Register a category, returning its id.
    async fn create_category(&self, name: &str, now: OffsetDateTime) -> MetadataResult<i64>;

    /// Register a volume, returning its id.
    async fn create_volume(
        &self,
        name: &str,
        root_path: &str,
        capacity_gb: f64,
        now: OffsetDateTime,
    ) -> MetadataResult<i64>;

    /// Get a volume by id.
    async fn get_volume(&self, volume_id: i64) -> MetadataResult<Option<VolumeRow>>;

    /// List all volumes.
    async fn list_volumes(&self) -> MetadataResult<Vec<VolumeRow>>;

    /// Bind a category to a volume. Promoting a binding to primary demotes
    /// the category's previous primary in the same transaction.
    async fn bind_category(
        &self,
        category_id: i64,
        volume_id: i64,
        is_primary: bool,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// List bindings for a category.
    async fn list_bindings(&self, category_id: i64) -> MetadataResult<Vec<VolumeBindingRow>>;

    /// Resolve the primary volume for a category, if one is bound.
    async fn primary_volume_for_category(
        &self,
        category_id: i64,
    ) -> MetadataResult<Option<VolumeRow>>;

    /// Megabytes consumed on a volume: live file records plus deleted file
    /// records still awaiting physical cleanup, conservatively.
    async fn used_mb(&self, volume_id: i64) -> MetadataResult<f64>;
}
