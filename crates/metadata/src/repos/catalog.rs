//! Product and version catalog repository.

use crate::error::MetadataResult;
use crate::models::{FileRow, ProductRow, VersionContextRow, VersionRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for products and versions.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Create a product, returning its id.
    async fn create_product(
        &self,
        name: &str,
        category_id: i64,
        description: Option<&str>,
        created_by: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<i64>;

    /// Get a product by id.
    async fn get_product(&self, product_id: i64) -> MetadataResult<Option<ProductRow>>;

    /// Get products by ids, in no particular order.
    async fn get_products(&self, product_ids: &[i64]) -> MetadataResult<Vec<ProductRow>>;

    /// Whether a product with this name exists in the category.
    async fn product_name_exists(&self, category_id: i64, name: &str) -> MetadataResult<bool>;

    /// Create a version, returning its id.
    async fn create_version(
        &self,
        version_uuid: Uuid,
        product_id: i64,
        name: &str,
        description: Option<&str>,
        created_by: Uuid,
        now: OffsetDateTime,
    ) -> MetadataResult<i64>;

    /// Get a version by id.
    async fn get_version(&self, version_id: i64) -> MetadataResult<Option<VersionRow>>;

    /// Resolve versions to their owning product and category. Missing ids
    /// are simply absent from the result; the caller detects the shortfall.
    async fn version_contexts(&self, version_ids: &[i64])
    -> MetadataResult<Vec<VersionContextRow>>;

    /// Whether a version with this name exists under the product.
    async fn version_name_exists(&self, product_id: i64, name: &str) -> MetadataResult<bool>;

    /// Files of the requested kinds belonging to the newest version of each
    /// product in the given categories. Backs the "latest snapshot" bulk
    /// export.
    async fn latest_files_for_categories(
        &self,
        category_ids: &[i64],
        kinds: &[i64],
    ) -> MetadataResult<Vec<FileRow>>;
}
