//! Core domain types and shared logic for the maproom geospatial archive.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Checksums and the streaming hasher
//! - Download tokens and their lifecycle
//! - Upload session identifiers, operations and state machine
//! - File kinds, statuses and physical path construction
//! - Upload manifests and prepare/confirm payloads
//! - Archive configuration

pub mod checksum;
pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod manifest;
pub mod session;
pub mod token;

pub use checksum::{Checksum, ChecksumHasher};
pub use config::ArchiveConfig;
pub use download::{
    ConfirmStatus, ConfirmationOutcome, DownloadConfirmation, DownloadStatus, PreparedDownload,
};
pub use error::{Error, Result};
pub use file::{FileKind, FileStatus, storage_path};
pub use manifest::{
    AddFileEntry, AddFilesManifest, AddProductManifest, AddVersionManifest, ConfirmReport,
    FileManifestEntry, FileOutcome, NewVersion, PrepareOutcome, ProductManifest, UploadTarget,
    VersionManifest,
};
pub use session::{OperationKind, SessionId, SessionStatus, UploadSession};
pub use token::DownloadToken;

/// Default lifetime of a download token: 24 hours.
pub const DEFAULT_DOWNLOAD_EXPIRY_SECS: u64 = 86_400;

/// Default lifetime of an upload session: 24 hours.
pub const DEFAULT_UPLOAD_EXPIRY_SECS: u64 = 86_400;

/// Default number of concurrent filesystem checks during reconciliation.
pub const DEFAULT_RECONCILE_PARALLELISM: usize = 50;
