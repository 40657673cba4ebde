//! Consistency reconciler integration tests.

mod common;

use common::*;
use maproom_archive::maintenance;
use maproom_core::{Checksum, FileKind};
use maproom_metadata::models::NewFile;
use maproom_metadata::repos::FileRepo;
use uuid::Uuid;

#[tokio::test]
async fn test_clean_archive_reports_nothing() {
    let t = setup().await;
    insert_record_with_bytes(&t, "chart-a", b"content a").await;
    insert_record_with_bytes(&t, "chart-b", b"content b").await;

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.scanned, 2);
    assert_eq!(report.flagged, 0);
    assert_eq!(report.healed, 0);
    assert_eq!(report.unexpected, 0);
}

#[tokio::test]
async fn test_corrupted_file_is_flagged_then_healed() {
    let t = setup().await;
    let file_id = insert_record_with_bytes(&t, "chart-a", b"original content").await;
    let path = t.volume_root.join("chart-a.tif");

    // Corrupt the bytes behind the catalog's back.
    tokio::fs::write(&path, b"bit rot").await.unwrap();
    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.flagged, 1);
    let row = t.store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(row.status, "checksum-invalid");

    // Re-running without changes flags nothing new.
    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.flagged, 0);
    assert_eq!(report.healed, 0);

    // Restoring the content self-heals on the next run.
    tokio::fs::write(&path, b"original content").await.unwrap();
    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.healed, 1);
    let row = t.store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(row.status, "registered");
}

#[tokio::test]
async fn test_missing_file_is_flagged() {
    let t = setup().await;
    let file_id = insert_record_with_bytes(&t, "chart-a", b"content").await;
    tokio::fs::remove_file(t.volume_root.join("chart-a.tif"))
        .await
        .unwrap();

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.flagged, 1);
    let row = t.store.get_file(file_id).await.unwrap().unwrap();
    assert_eq!(row.status, "checksum-invalid");
}

#[tokio::test]
async fn test_remote_tile_service_records_are_skipped() {
    let t = setup().await;
    t.store
        .insert_file(&NewFile {
            file_uuid: Uuid::new_v4(),
            logical_name: "wmts".to_string(),
            physical_name: "wmts-0001".to_string(),
            extension: "xml".to_string(),
            kind: FileKind::RemoteTileService.as_code(),
            size_mb: 0.0,
            checksum: None,
            volume_id: t.volume_id,
            version_id: t.version_id,
            status: "registered".to_string(),
            description: None,
            created_by: t.principal,
            created_at: now(),
        })
        .await
        .unwrap();

    // No physical payload exists, yet nothing is scanned or flagged.
    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.flagged, 0);
}

#[tokio::test]
async fn test_lingering_bytes_of_deleted_record_are_reported() {
    let t = setup().await;
    let file_id = insert_record_with_bytes(&t, "chart-a", b"content").await;

    // Logical deletion leaves the physical file in place.
    t.archive
        .files
        .delete_files(&[file_id], "superseded", t.principal)
        .await
        .unwrap();

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.scanned, 0);
    assert_eq!(report.unexpected, 1);

    // Once an operator purges the bytes the report is clean again.
    tokio::fs::remove_file(t.volume_root.join("chart-a.tif"))
        .await
        .unwrap();
    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.unexpected, 0);
}

#[tokio::test]
async fn test_live_record_explains_bytes_at_deleted_path() {
    let t = setup().await;
    let file_id = insert_record_with_bytes(&t, "chart-a", b"old content").await;
    t.archive
        .files
        .delete_files(&[file_id], "re-uploading", t.principal)
        .await
        .unwrap();

    // A fresh record reclaims the same physical path.
    insert_record_with_bytes(&t, "chart-a", b"new content").await;

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.unexpected, 0, "live record explains the bytes");
}

#[tokio::test]
async fn test_reconciler_pages_through_large_sets() {
    let t = setup().await;
    // More records than the test config's page size of 10.
    for i in 0..25 {
        let content = format!("chart number {i}");
        insert_record_with_bytes(&t, &format!("chart-{i:03}"), content.as_bytes()).await;
    }

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.scanned, 25);
    assert_eq!(report.flagged, 0);
}

#[tokio::test]
async fn test_maintenance_outcomes_are_structured() {
    let t = setup().await;
    insert_record_with_bytes(&t, "chart-a", b"content").await;

    let outcome = maintenance::sweep_downloads(&t.archive.downloads).await;
    assert!(outcome.ok);
    assert!(outcome.detail.contains("0"));

    let outcome = maintenance::sweep_uploads(&t.archive.uploads).await;
    assert!(outcome.ok);

    let outcome = maintenance::reconcile(&t.archive.reconciler).await;
    assert!(outcome.ok);
    assert!(outcome.detail.contains("scanned 1"));
}

#[tokio::test]
async fn test_unreadable_stored_checksum_is_flagged_not_fatal() {
    let t = setup().await;
    let file_id = insert_record(&t, "chart-a", 1.0, Some(Checksum::compute(b"x"))).await;
    tokio::fs::write(t.volume_root.join("chart-a.tif"), b"x")
        .await
        .unwrap();
    sqlx::query("UPDATE files SET checksum = 'not-hex' WHERE file_id = ?")
        .bind(file_id)
        .execute(t.store.pool())
        .await
        .unwrap();

    let report = t.archive.reconciler.run().await.unwrap();
    assert_eq!(report.flagged, 1);
}
