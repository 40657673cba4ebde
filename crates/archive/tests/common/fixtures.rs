//! Shared fixtures: a catalog store over a scratch database plus one seeded
//! category, volume, product and version backed by a tempdir volume root.

use maproom_archive::Archive;
use maproom_core::{ArchiveConfig, Checksum, FileKind, FileManifestEntry};
use maproom_metadata::models::NewFile;
use maproom_metadata::repos::{CatalogRepo, FileRepo, VolumeRepo};
use maproom_metadata::{CatalogStore, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

pub struct TestArchive {
    /// Holds the database and the volume root alive for the test's duration.
    pub dir: tempfile::TempDir,
    pub store: Arc<SqliteStore>,
    pub archive: Archive,
    pub principal: Uuid,
    pub category_id: i64,
    pub volume_id: i64,
    pub volume_root: PathBuf,
    pub product_id: i64,
    pub version_id: i64,
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Build an archive over a fresh store with one seeded category bound to a
/// primary volume of the given capacity, plus a product and version.
pub async fn setup_with_capacity(capacity_gb: f64) -> TestArchive {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let dir = tempfile::tempdir().unwrap();
    let volume_root = dir.path().join("vol-01");
    std::fs::create_dir_all(&volume_root).unwrap();

    let store = Arc::new(
        SqliteStore::new(dir.path().join("catalog.db"))
            .await
            .unwrap(),
    );
    let principal = Uuid::new_v4();

    let category_id = store.create_category("topographic-charts", now()).await.unwrap();
    let volume_id = store
        .create_volume(
            "vol-01",
            volume_root.to_str().unwrap(),
            capacity_gb,
            now(),
        )
        .await
        .unwrap();
    store
        .bind_category(category_id, volume_id, true, now())
        .await
        .unwrap();
    let product_id = store
        .create_product("carta-sf-22", category_id, None, principal, now())
        .await
        .unwrap();
    let version_id = store
        .create_version(Uuid::new_v4(), product_id, "1a-edicao", None, principal, now())
        .await
        .unwrap();

    let store_dyn: Arc<dyn CatalogStore> = store.clone();
    let archive = Archive::new(store_dyn, ArchiveConfig::for_testing());

    TestArchive {
        dir,
        store,
        archive,
        principal,
        category_id,
        volume_id,
        volume_root,
        product_id,
        version_id,
    }
}

pub async fn setup() -> TestArchive {
    setup_with_capacity(10.0).await
}

/// Manifest entry declaring `content` truthfully (checksum and size).
pub fn entry_for(name: &str, content: &[u8]) -> FileManifestEntry {
    FileManifestEntry {
        logical_name: name.to_string(),
        physical_name: format!("{name}-0001"),
        extension: "tif".to_string(),
        kind: FileKind::Raster,
        declared_size_mb: content.len() as f64 / (1024.0 * 1024.0),
        declared_checksum: Checksum::compute(content),
        description: None,
    }
}

/// Simulate the client's out-of-band copy to a prepared destination path.
pub async fn copy_to_destination(path: &str, content: &[u8]) {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.unwrap();
    }
    tokio::fs::write(path, content).await.unwrap();
}

/// Insert a registered catalog file record directly (no physical bytes).
pub async fn insert_record(
    t: &TestArchive,
    physical_name: &str,
    size_mb: f64,
    checksum: Option<Checksum>,
) -> i64 {
    t.store
        .insert_file(&NewFile {
            file_uuid: Uuid::new_v4(),
            logical_name: physical_name.to_string(),
            physical_name: physical_name.to_string(),
            extension: "tif".to_string(),
            kind: FileKind::Raster.as_code(),
            size_mb,
            checksum: checksum.map(|c| c.to_hex()),
            volume_id: t.volume_id,
            version_id: t.version_id,
            status: "registered".to_string(),
            description: None,
            created_by: t.principal,
            created_at: now(),
        })
        .await
        .unwrap()
}

/// Insert a registered record together with its physical bytes on the volume.
pub async fn insert_record_with_bytes(t: &TestArchive, physical_name: &str, content: &[u8]) -> i64 {
    let file_id = insert_record(
        t,
        physical_name,
        content.len() as f64 / (1024.0 * 1024.0),
        Some(Checksum::compute(content)),
    )
    .await;
    tokio::fs::write(t.volume_root.join(format!("{physical_name}.tif")), content)
        .await
        .unwrap();
    file_id
}
