//! Download broker integration tests.

mod common;

use common::*;
use maproom_archive::ArchiveError;
use maproom_core::{ConfirmStatus, DownloadConfirmation, DownloadStatus, DownloadToken, FileKind};
use maproom_metadata::repos::{CatalogRepo, DownloadRepo};
use uuid::Uuid;

#[tokio::test]
async fn test_prepare_issues_tokens_with_paths() {
    let t = setup().await;
    let a = insert_record_with_bytes(&t, "chart-a", b"content a").await;
    let b = insert_record_with_bytes(&t, "chart-b", b"content b").await;

    let prepared = t
        .archive
        .downloads
        .prepare(&[a, b], t.principal)
        .await
        .unwrap();
    assert_eq!(prepared.len(), 2);

    for item in &prepared {
        assert!(item.path.ends_with(".tif"));
        assert!(item.path.contains("vol-01"));
        assert!(item.checksum.is_some());
    }
    // Tokens are unique per file.
    assert_ne!(prepared[0].token, prepared[1].token);
}

#[tokio::test]
async fn test_prepare_is_whole_batch_not_found() {
    let t = setup().await;
    let a = insert_record_with_bytes(&t, "chart-a", b"content a").await;

    let err = t
        .archive
        .downloads
        .prepare(&[a, 99_999], t.principal)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::NotFound(_)));

    // No record was created for the existing file either.
    assert!(t.archive.downloads.list(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_confirm_settles_each_token_once() {
    let t = setup().await;
    let a = insert_record_with_bytes(&t, "chart-a", b"content a").await;
    let prepared = t.archive.downloads.prepare(&[a], t.principal).await.unwrap();
    let token = prepared[0].token.clone();

    let outcomes = t
        .archive
        .downloads
        .confirm(&[DownloadConfirmation {
            token: token.clone(),
            success: true,
            error_message: None,
        }])
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, ConfirmStatus::Completed);

    // Confirming again reports a soft error, never a crash, and the record
    // keeps its original terminal state.
    let outcomes = t
        .archive
        .downloads
        .confirm(&[DownloadConfirmation {
            token: token.clone(),
            success: false,
            error_message: Some("late duplicate".to_string()),
        }])
        .await
        .unwrap();
    assert_eq!(
        outcomes[0].status,
        ConfirmStatus::AlreadySettled(DownloadStatus::Completed)
    );

    let row = t
        .store
        .get_download_by_token(token.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, "completed");
}

#[tokio::test]
async fn test_confirm_isolates_per_item_errors() {
    let t = setup().await;
    let a = insert_record_with_bytes(&t, "chart-a", b"content a").await;
    let prepared = t.archive.downloads.prepare(&[a], t.principal).await.unwrap();

    let outcomes = t
        .archive
        .downloads
        .confirm(&[
            DownloadConfirmation {
                token: DownloadToken::generate(), // never issued
                success: true,
                error_message: None,
            },
            DownloadConfirmation {
                token: prepared[0].token.clone(),
                success: false,
                error_message: Some("network reset".to_string()),
            },
        ])
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, ConfirmStatus::UnknownToken);
    assert_eq!(outcomes[1].status, ConfirmStatus::Failed);

    let row = t
        .store
        .get_download_by_token(prepared[0].token.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.error_message.as_deref(), Some("network reset"));
}

#[tokio::test]
async fn test_expired_token_soft_rejected_then_swept() {
    let t = setup().await;
    let a = insert_record_with_bytes(&t, "chart-a", b"content a").await;
    let prepared = t.archive.downloads.prepare(&[a], t.principal).await.unwrap();

    sqlx::query("UPDATE downloads SET expires_at = '2000-01-01T00:00:00+00:00'")
        .execute(t.store.pool())
        .await
        .unwrap();

    let outcomes = t
        .archive
        .downloads
        .confirm(&[DownloadConfirmation {
            token: prepared[0].token.clone(),
            success: true,
            error_message: None,
        }])
        .await
        .unwrap();
    assert_eq!(outcomes[0].status, ConfirmStatus::Expired);

    // Sweep removes the stale pending record; running twice is a no-op.
    assert_eq!(t.archive.downloads.cleanup_expired().await.unwrap(), 1);
    assert_eq!(t.archive.downloads.cleanup_expired().await.unwrap(), 0);
}

#[tokio::test]
async fn test_prepare_by_category_exports_latest_snapshot() {
    let t = setup().await;
    insert_record_with_bytes(&t, "old-chart", b"old edition").await;

    // A newer version of the same product supersedes the old files.
    let new_version = t
        .store
        .create_version(
            Uuid::new_v4(),
            t.product_id,
            "2a-edicao",
            None,
            t.principal,
            now(),
        )
        .await
        .unwrap();
    let mut t2 = t;
    t2.version_id = new_version;
    insert_record_with_bytes(&t2, "new-chart", b"new edition").await;

    let prepared = t2
        .archive
        .downloads
        .prepare_by_category(&[t2.category_id], &[FileKind::Raster], t2.principal)
        .await
        .unwrap();
    assert_eq!(prepared.len(), 1);
    assert!(prepared[0].path.contains("new-chart"));

    // No files of the requested kind: whole call fails NotFound.
    let err = t2
        .archive
        .downloads
        .prepare_by_category(&[t2.category_id], &[FileKind::Document], t2.principal)
        .await
        .unwrap_err();
    assert!(matches!(err, ArchiveError::NotFound(_)));
}
