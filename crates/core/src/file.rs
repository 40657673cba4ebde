//! File kinds, statuses and physical path construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Kind of archived file, mirroring the catalog's lookup table codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Raster product (GeoTIFF and friends).
    Raster,
    /// Vector product (geopackage, shapefile bundle).
    Vector,
    /// Point cloud (LAS/LAZ).
    PointCloud,
    /// Accompanying document (PDF reports, lineage sheets).
    Document,
    /// Standalone metadata record (XML).
    MetadataRecord,
    /// Remote tile service registration. Carries no physical payload; the
    /// catalog row only records the service endpoint.
    RemoteTileService,
}

impl FileKind {
    /// Numeric code stored in the catalog.
    pub fn as_code(&self) -> i64 {
        match self {
            Self::Raster => 1,
            Self::Vector => 2,
            Self::PointCloud => 3,
            Self::Document => 4,
            Self::MetadataRecord => 5,
            Self::RemoteTileService => 6,
        }
    }

    /// Parse from a catalog code.
    pub fn from_code(code: i64) -> crate::Result<Self> {
        match code {
            1 => Ok(Self::Raster),
            2 => Ok(Self::Vector),
            3 => Ok(Self::PointCloud),
            4 => Ok(Self::Document),
            5 => Ok(Self::MetadataRecord),
            6 => Ok(Self::RemoteTileService),
            other => Err(crate::Error::UnknownFileKind(other.to_string())),
        }
    }

    /// Whether files of this kind have bytes on a storage volume.
    ///
    /// Remote tile services are catalog-only: integrity verification and
    /// reconciliation skip them entirely.
    pub fn has_payload(&self) -> bool {
        !matches!(self, Self::RemoteTileService)
    }
}

/// Status of a live file record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    /// Verified and available.
    Registered,
    /// On-disk content no longer matches the recorded checksum.
    ChecksumInvalid,
    /// Queued for physical removal by an operator.
    PendingDeletion,
    /// Physical removal was attempted and failed.
    DeletionFailed,
}

impl FileStatus {
    /// String representation stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::ChecksumInvalid => "checksum-invalid",
            Self::PendingDeletion => "pending-deletion",
            Self::DeletionFailed => "deletion-failed",
        }
    }

    /// Parse from the catalog representation.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "registered" => Ok(Self::Registered),
            "checksum-invalid" => Ok(Self::ChecksumInvalid),
            "pending-deletion" => Ok(Self::PendingDeletion),
            "deletion-failed" => Ok(Self::DeletionFailed),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }
}

/// Build the physical path of a file: `volume_root / physical_name.extension`.
///
/// This is the single place the path convention lives; every component that
/// touches storage resolves paths through it.
pub fn storage_path(volume_root: &str, physical_name: &str, extension: &str) -> PathBuf {
    Path::new(volume_root).join(format!("{physical_name}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_code_roundtrip() {
        for kind in [
            FileKind::Raster,
            FileKind::Vector,
            FileKind::PointCloud,
            FileKind::Document,
            FileKind::MetadataRecord,
            FileKind::RemoteTileService,
        ] {
            assert_eq!(FileKind::from_code(kind.as_code()).unwrap(), kind);
        }
        assert!(FileKind::from_code(99).is_err());
    }

    #[test]
    fn test_only_remote_tiles_lack_payload() {
        assert!(FileKind::Raster.has_payload());
        assert!(!FileKind::RemoteTileService.has_payload());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            FileStatus::Registered,
            FileStatus::ChecksumInvalid,
            FileStatus::PendingDeletion,
            FileStatus::DeletionFailed,
        ] {
            assert_eq!(FileStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(FileStatus::parse("bogus").is_err());
    }

    #[test]
    fn test_storage_path_join() {
        let path = storage_path("/mnt/vol1", "a1b2c3", "tif");
        assert_eq!(path, PathBuf::from("/mnt/vol1/a1b2c3.tif"));
    }
}
