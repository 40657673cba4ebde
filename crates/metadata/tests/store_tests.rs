//! SQLite catalog store integration tests.

use maproom_metadata::models::{
    NewDownload, NewFile, NewStagedFile, NewUploadSession, StagedParent, VerifiedFile,
};
use maproom_metadata::repos::{CatalogRepo, DownloadRepo, FileRepo, UploadRepo, VolumeRepo};
use maproom_metadata::SqliteStore;
use time::OffsetDateTime;
use uuid::Uuid;

async fn test_store() -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join("catalog.db")).await.unwrap();
    (dir, store)
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Seed a category bound to a primary volume, plus one product and version.
/// Returns (category_id, volume_id, product_id, version_id).
async fn seed_catalog(store: &SqliteStore, capacity_gb: f64) -> (i64, i64, i64, i64) {
    let user = Uuid::new_v4();
    let category_id = store.create_category("topographic-charts", now()).await.unwrap();
    let volume_id = store
        .create_volume("vol-01", "/mnt/vol-01", capacity_gb, now())
        .await
        .unwrap();
    store
        .bind_category(category_id, volume_id, true, now())
        .await
        .unwrap();
    let product_id = store
        .create_product("carta-sf-22", category_id, None, user, now())
        .await
        .unwrap();
    let version_id = store
        .create_version(Uuid::new_v4(), product_id, "1a-edicao", None, user, now())
        .await
        .unwrap();
    (category_id, volume_id, product_id, version_id)
}

fn new_file(volume_id: i64, version_id: i64, physical_name: &str, size_mb: f64) -> NewFile {
    NewFile {
        file_uuid: Uuid::new_v4(),
        logical_name: physical_name.to_string(),
        physical_name: physical_name.to_string(),
        extension: "tif".to_string(),
        kind: 1,
        size_mb,
        checksum: Some("ab".repeat(32)),
        volume_id,
        version_id,
        status: "registered".to_string(),
        description: None,
        created_by: Uuid::new_v4(),
        created_at: now(),
    }
}

#[tokio::test]
async fn test_primary_volume_resolution() {
    let (_dir, store) = test_store().await;
    let (category_id, volume_id, _, _) = seed_catalog(&store, 100.0).await;

    let volume = store
        .primary_volume_for_category(category_id)
        .await
        .unwrap()
        .expect("primary volume bound");
    assert_eq!(volume.volume_id, volume_id);

    // A category with no binding resolves to nothing.
    let orphan = store.create_category("orthoimagery", now()).await.unwrap();
    assert!(store.primary_volume_for_category(orphan).await.unwrap().is_none());
}

#[tokio::test]
async fn test_primary_promotion_demotes_previous() {
    let (_dir, store) = test_store().await;
    let (category_id, first, _, _) = seed_catalog(&store, 100.0).await;

    let primary = store
        .primary_volume_for_category(category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(primary.volume_id, first);

    let second = store
        .create_volume("vol-02", "/mnt/vol-02", 100.0, now())
        .await
        .unwrap();
    store.bind_category(category_id, second, true, now()).await.unwrap();

    let primary = store
        .primary_volume_for_category(category_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(primary.volume_id, second);

    let bindings = store.list_bindings(category_id).await.unwrap();
    let primaries: Vec<_> = bindings.iter().filter(|b| b.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].volume_id, second);
    assert_eq!(bindings.len(), 2, "old binding kept, demoted");
}

#[tokio::test]
async fn test_used_mb_counts_live_and_deleted() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let file_id = store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 100.0))
        .await
        .unwrap();
    store
        .insert_file(&new_file(volume_id, version_id, "chart-0002", 50.0))
        .await
        .unwrap();
    assert_eq!(store.used_mb(volume_id).await.unwrap(), 150.0);

    // Logical deletion keeps the bytes accounted for until purged.
    store
        .delete_files(&[file_id], "superseded", Uuid::new_v4(), now())
        .await
        .unwrap();
    assert_eq!(store.used_mb(volume_id).await.unwrap(), 150.0);
}

#[tokio::test]
async fn test_physical_name_uniqueness_enforced() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 10.0))
        .await
        .unwrap();
    let err = store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 10.0))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_delete_files_is_whole_batch() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let file_id = store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 10.0))
        .await
        .unwrap();

    let err = store
        .delete_files(&[file_id, 99_999], "cleanup", Uuid::new_v4(), now())
        .await
        .unwrap_err();
    assert!(matches!(err, maproom_metadata::MetadataError::NotFound(_)));

    // The existing file survived the failed batch.
    assert!(store.get_file(file_id).await.unwrap().is_some());
    assert!(store.list_deleted_files(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_settles_exactly_once() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;
    let file_id = store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 10.0))
        .await
        .unwrap();

    store
        .create_downloads(&[NewDownload {
            token: "tok-1".to_string(),
            file_id,
            requested_by: Uuid::new_v4(),
            created_at: now(),
            expires_at: now() + time::Duration::hours(24),
        }])
        .await
        .unwrap();

    let first = store
        .settle_download("tok-1", "completed", None, now())
        .await
        .unwrap();
    assert_eq!(first, 1);

    let second = store
        .settle_download("tok-1", "failed", Some("late retry"), now())
        .await
        .unwrap();
    assert_eq!(second, 0, "terminal records never transition again");

    let row = store.get_download_by_token("tok-1").await.unwrap().unwrap();
    assert_eq!(row.status, "completed");
    assert!(row.error_message.is_none());
}

#[tokio::test]
async fn test_expired_pending_downloads_are_swept() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;
    let file_id = store
        .insert_file(&new_file(volume_id, version_id, "chart-0001", 10.0))
        .await
        .unwrap();

    store
        .create_downloads(&[
            NewDownload {
                token: "tok-stale".to_string(),
                file_id,
                requested_by: Uuid::new_v4(),
                created_at: now() - time::Duration::hours(48),
                expires_at: now() - time::Duration::hours(24),
            },
            NewDownload {
                token: "tok-fresh".to_string(),
                file_id,
                requested_by: Uuid::new_v4(),
                created_at: now(),
                expires_at: now() + time::Duration::hours(24),
            },
        ])
        .await
        .unwrap();

    assert_eq!(store.delete_expired_downloads(now()).await.unwrap(), 1);
    assert_eq!(store.delete_expired_downloads(now()).await.unwrap(), 0);
    assert!(store.get_download_by_token("tok-stale").await.unwrap().is_none());
    assert!(store.get_download_by_token("tok-fresh").await.unwrap().is_some());
}

fn staged_session(volume_id: i64, version_id: i64, physical_name: &str) -> NewUploadSession {
    NewUploadSession {
        session_uuid: Uuid::new_v4(),
        operation: "add-files".to_string(),
        requested_by: Uuid::new_v4(),
        created_at: now(),
        expires_at: now() + time::Duration::hours(24),
        staged_products: vec![],
        staged_versions: vec![],
        staged_files: vec![NewStagedFile {
            logical_name: physical_name.to_string(),
            physical_name: physical_name.to_string(),
            extension: "tif".to_string(),
            kind: 1,
            declared_size_mb: 10.0,
            declared_checksum: "ab".repeat(32),
            destination_path: format!("/mnt/vol-01/{physical_name}.tif"),
            volume_id,
            version_ref: StagedParent::Existing(version_id),
        }],
    }
}

#[tokio::test]
async fn test_session_claim_is_single_shot() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let session = staged_session(volume_id, version_id, "chart-0001");
    let uuid = session.session_uuid;
    store.create_session(&session).await.unwrap();

    let first = store.begin_confirm(uuid).await.unwrap().unwrap();
    assert_eq!(first.status, "active");

    let second = store.begin_confirm(uuid).await.unwrap().unwrap();
    assert_eq!(second.status, "active", "claim did not repeat");

    assert!(store.begin_confirm(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_staged_claims_release_on_terminal_status() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let session = staged_session(volume_id, version_id, "chart-0001");
    let session_id = store.create_session(&session).await.unwrap();

    assert!(
        store
            .staged_claim_exists(volume_id, "chart-0001", "tif")
            .await
            .unwrap()
    );

    store
        .cancel_session(session_id, "cancelled by user", now())
        .await
        .unwrap();

    assert!(
        !store
            .staged_claim_exists(volume_id, "chart-0001", "tif")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_expire_sessions_is_idempotent() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let mut session = staged_session(volume_id, version_id, "chart-0001");
    session.expires_at = now() - time::Duration::hours(1);
    let uuid = session.session_uuid;
    store.create_session(&session).await.unwrap();

    assert_eq!(store.expire_sessions(now()).await.unwrap(), 1);
    assert_eq!(store.expire_sessions(now()).await.unwrap(), 0);

    let row = store.get_session(uuid).await.unwrap().unwrap();
    assert_eq!(row.status, "failed");
    assert!(row.error_message.unwrap().contains("expired"));
}

#[tokio::test]
async fn test_commit_session_inserts_with_measured_size() {
    let (_dir, store) = test_store().await;
    let (_, volume_id, _, version_id) = seed_catalog(&store, 100.0).await;

    let session = staged_session(volume_id, version_id, "chart-0001");
    let uuid = session.session_uuid;
    store.create_session(&session).await.unwrap();
    let row = store.begin_confirm(uuid).await.unwrap().unwrap();

    let staged = store.get_staged_files(row.session_id).await.unwrap();
    let verified = vec![VerifiedFile {
        staged_file_id: staged[0].staged_file_id,
        measured_size_mb: 12.5,
        checksum: Some("cd".repeat(32)),
    }];

    let stats = store.commit_session(&row, &verified, now()).await.unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.products, 0);
    assert_eq!(stats.versions, 0);

    // The catalog carries the measured size, not the declared one.
    assert_eq!(store.used_mb(volume_id).await.unwrap(), 12.5);
    let session_row = store.get_session(uuid).await.unwrap().unwrap();
    assert_eq!(session_row.status, "completed");
}

#[tokio::test]
async fn test_commit_session_rejects_capacity_overflow_atomically() {
    let (_dir, store) = test_store().await;
    // 1 GB volume, already holding 1000 MB.
    let (_, volume_id, _, version_id) = seed_catalog(&store, 1.0).await;
    store
        .insert_file(&new_file(volume_id, version_id, "existing", 1000.0))
        .await
        .unwrap();

    let session = staged_session(volume_id, version_id, "chart-0001");
    let uuid = session.session_uuid;
    store.create_session(&session).await.unwrap();
    let row = store.begin_confirm(uuid).await.unwrap().unwrap();
    let staged = store.get_staged_files(row.session_id).await.unwrap();

    // Declared 10 MB passed prepare; the transfer measured far larger.
    let verified = vec![VerifiedFile {
        staged_file_id: staged[0].staged_file_id,
        measured_size_mb: 200.0,
        checksum: Some("cd".repeat(32)),
    }];

    let err = store.commit_session(&row, &verified, now()).await.unwrap_err();
    assert!(matches!(err, maproom_metadata::MetadataError::Constraint(_)));

    // Nothing was written: the rolled-back commit left one file record.
    assert_eq!(store.used_mb(volume_id).await.unwrap(), 1000.0);
    let session_row = store.get_session(uuid).await.unwrap().unwrap();
    assert_eq!(session_row.status, "active", "caller decides how to fail the session");
}

#[tokio::test]
async fn test_latest_files_resolve_newest_version_only() {
    let (_dir, store) = test_store().await;
    let (category_id, volume_id, product_id, old_version) = seed_catalog(&store, 100.0).await;
    let user = Uuid::new_v4();

    store
        .insert_file(&new_file(volume_id, old_version, "old-chart", 10.0))
        .await
        .unwrap();

    let new_version = store
        .create_version(Uuid::new_v4(), product_id, "2a-edicao", None, user, now())
        .await
        .unwrap();
    store
        .insert_file(&new_file(volume_id, new_version, "new-chart", 10.0))
        .await
        .unwrap();

    let latest = store
        .latest_files_for_categories(&[category_id], &[1])
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].physical_name, "new-chart");

    // Kind filter excludes everything.
    let none = store
        .latest_files_for_categories(&[category_id], &[4])
        .await
        .unwrap();
    assert!(none.is_empty());
}
