//! Upload manifests and prepare/confirm payloads.
//!
//! A manifest is the client's declaration of intent: which files it is about
//! to copy, where they belong in the catalog and what content they should
//! have. The coordinator snapshots the manifest at prepare time; confirm
//! only ever reads that snapshot back.

use crate::checksum::Checksum;
use crate::file::FileKind;
use crate::session::{OperationKind, SessionId};
use serde::{Deserialize, Serialize};

/// One declared file within a manifest.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileManifestEntry {
    /// Human-facing name shown in the catalog.
    pub logical_name: String,
    /// Generated on-disk name, unique within the target volume.
    pub physical_name: String,
    /// File extension without the leading dot.
    pub extension: String,
    /// Kind of file; payload-less kinds skip verification.
    pub kind: FileKind,
    /// Size the client expects to transfer, in megabytes. Advisory: the
    /// measured size replaces it at commit.
    pub declared_size_mb: f64,
    /// Checksum the client computed before transfer.
    pub declared_checksum: Checksum,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FileManifestEntry {
    fn validate(&self) -> crate::Result<()> {
        if self.logical_name.trim().is_empty() {
            return Err(crate::Error::InvalidManifest(
                "file logical name must not be empty".to_string(),
            ));
        }
        if self.physical_name.trim().is_empty()
            || self.physical_name.contains('/')
            || self.physical_name.contains('\\')
        {
            return Err(crate::Error::InvalidManifest(format!(
                "invalid physical name: {:?}",
                self.physical_name
            )));
        }
        if self.extension.is_empty() || self.extension.contains('.') || self.extension.contains('/')
        {
            return Err(crate::Error::InvalidManifest(format!(
                "invalid extension: {:?}",
                self.extension
            )));
        }
        if self.kind.has_payload() && self.declared_size_mb <= 0.0 {
            return Err(crate::Error::InvalidManifest(format!(
                "declared size must be positive for {}",
                self.logical_name
            )));
        }
        Ok(())
    }
}

/// A file attached to an existing version.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddFileEntry {
    /// The existing version receiving the file.
    pub version_id: i64,
    #[serde(flatten)]
    pub file: FileManifestEntry,
}

/// Manifest for the add-files operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddFilesManifest {
    pub files: Vec<AddFileEntry>,
}

impl AddFilesManifest {
    /// Validate manifest shape before any catalog access.
    pub fn validate(&self) -> crate::Result<()> {
        if self.files.is_empty() {
            return Err(crate::Error::InvalidManifest(
                "manifest declares no files".to_string(),
            ));
        }
        for entry in &self.files {
            entry.file.validate()?;
        }
        Ok(())
    }
}

/// A new version to be created at commit, together with its files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewVersion {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<FileManifestEntry>,
}

impl NewVersion {
    fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidManifest(
                "version name must not be empty".to_string(),
            ));
        }
        if self.files.is_empty() {
            return Err(crate::Error::InvalidManifest(format!(
                "version {:?} declares no files",
                self.name
            )));
        }
        for file in &self.files {
            file.validate()?;
        }
        Ok(())
    }
}

/// A new version under an existing product.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionManifest {
    /// The existing product receiving the version.
    pub product_id: i64,
    #[serde(flatten)]
    pub version: NewVersion,
}

/// Manifest for the add-version operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddVersionManifest {
    pub versions: Vec<VersionManifest>,
}

impl AddVersionManifest {
    /// Validate manifest shape before any catalog access.
    pub fn validate(&self) -> crate::Result<()> {
        if self.versions.is_empty() {
            return Err(crate::Error::InvalidManifest(
                "manifest declares no versions".to_string(),
            ));
        }
        for entry in &self.versions {
            entry.version.validate()?;
        }
        Ok(())
    }
}

/// A new product with its versions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductManifest {
    pub name: String,
    /// Category determining the target volume via its primary binding.
    pub category_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub versions: Vec<NewVersion>,
}

/// Manifest for the add-product operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddProductManifest {
    pub products: Vec<ProductManifest>,
}

impl AddProductManifest {
    /// Validate manifest shape before any catalog access.
    pub fn validate(&self) -> crate::Result<()> {
        if self.products.is_empty() {
            return Err(crate::Error::InvalidManifest(
                "manifest declares no products".to_string(),
            ));
        }
        let mut names: Vec<&str> = Vec::with_capacity(self.products.len());
        for product in &self.products {
            if product.name.trim().is_empty() {
                return Err(crate::Error::InvalidManifest(
                    "product name must not be empty".to_string(),
                ));
            }
            if names.contains(&product.name.as_str()) {
                return Err(crate::Error::InvalidManifest(format!(
                    "duplicate product name in manifest: {:?}",
                    product.name
                )));
            }
            names.push(product.name.as_str());
            if product.versions.is_empty() {
                return Err(crate::Error::InvalidManifest(format!(
                    "product {:?} declares no versions",
                    product.name
                )));
            }
            for version in &product.versions {
                version.validate()?;
            }
        }
        Ok(())
    }
}

/// One resolved destination handed back to the client at prepare time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadTarget {
    pub logical_name: String,
    pub physical_name: String,
    /// Exact path the client must copy the bytes to.
    pub destination_path: String,
    /// Echo of the declared checksum the commit will verify against.
    pub declared_checksum: Checksum,
}

/// Result of a successful prepare call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrepareOutcome {
    pub session_id: SessionId,
    pub operation: OperationKind,
    pub targets: Vec<UploadTarget>,
}

/// Per-file verdict inside a confirm report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileOutcome {
    pub logical_name: String,
    pub physical_name: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Definite terminal result of a confirm call. Per-file failures are data
/// here, never errors: the caller inspects the report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmReport {
    pub session_id: SessionId,
    pub status: crate::session::SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub files: Vec<FileOutcome>,
}
