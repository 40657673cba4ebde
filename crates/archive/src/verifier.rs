//! Streaming integrity verification against storage volumes.

use maproom_core::Checksum;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::instrument;

/// Read buffer for streaming checksums (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Result of comparing a file on disk against an expected checksum.
#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    /// Content matches; carries the measured size.
    Match { measured_size_mb: f64 },
    /// Content differs from the expected digest.
    Mismatch {
        actual: Checksum,
        measured_size_mb: f64,
    },
    /// No file exists at the path.
    Missing,
}

/// Compute the SHA-256 checksum of a file by streaming it through the hasher,
/// never loading the whole file into memory. Returns the digest together with
/// the measured size in megabytes.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn checksum_file(path: impl AsRef<Path>) -> std::io::Result<(Checksum, f64)> {
    let mut file = fs::File::open(path.as_ref()).await?;
    let mut hasher = Checksum::hasher();
    let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hasher.finalize(), total as f64 / BYTES_PER_MB))
}

/// Verify a file against an expected checksum.
///
/// A missing file is a verdict, not an error; only genuine I/O faults
/// (permissions, unreachable volume) surface as errors.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn verify(expected: &Checksum, path: impl AsRef<Path>) -> std::io::Result<Verification> {
    match checksum_file(path.as_ref()).await {
        Ok((actual, measured_size_mb)) => {
            if actual == *expected {
                Ok(Verification::Match { measured_size_mb })
            } else {
                Ok(Verification::Mismatch {
                    actual,
                    measured_size_mb,
                })
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Verification::Missing),
        Err(e) => Err(e),
    }
}

/// Check whether a file exists at the path.
pub async fn exists(path: impl AsRef<Path>) -> std::io::Result<bool> {
    fs::try_exists(path.as_ref()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checksum_matches_oneshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content = vec![7u8; 300_000]; // spans several read chunks
        tokio::fs::write(&path, &content).await.unwrap();

        let (checksum, size_mb) = checksum_file(&path).await.unwrap();
        assert_eq!(checksum, Checksum::compute(&content));
        assert!((size_mb - 300_000.0 / BYTES_PER_MB).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_match_and_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        tokio::fs::write(&path, b"expected content").await.unwrap();

        let expected = Checksum::compute(b"expected content");
        assert!(matches!(
            verify(&expected, &path).await.unwrap(),
            Verification::Match { .. }
        ));

        let wrong = Checksum::compute(b"something else");
        match verify(&wrong, &path).await.unwrap() {
            Verification::Mismatch { actual, .. } => assert_eq!(actual, expected),
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let expected = Checksum::compute(b"anything");
        let verdict = verify(&expected, dir.path().join("absent.tif")).await.unwrap();
        assert_eq!(verdict, Verification::Missing);
    }
}
