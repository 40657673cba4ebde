//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use time::Duration;

/// Archive behavior configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Download token lifetime in seconds.
    #[serde(default = "default_download_expiry_secs")]
    pub download_expiry_secs: u64,
    /// Upload session lifetime in seconds.
    #[serde(default = "default_upload_expiry_secs")]
    pub upload_expiry_secs: u64,
    /// Page size when the reconciler loads file records from the catalog.
    #[serde(default = "default_reconcile_page_size")]
    pub reconcile_page_size: u32,
    /// Maximum concurrent filesystem checks during reconciliation.
    #[serde(default = "default_reconcile_parallelism")]
    pub reconcile_parallelism: usize,
}

fn default_download_expiry_secs() -> u64 {
    crate::DEFAULT_DOWNLOAD_EXPIRY_SECS
}

fn default_upload_expiry_secs() -> u64 {
    crate::DEFAULT_UPLOAD_EXPIRY_SECS
}

fn default_reconcile_page_size() -> u32 {
    500
}

fn default_reconcile_parallelism() -> usize {
    crate::DEFAULT_RECONCILE_PARALLELISM
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            download_expiry_secs: default_download_expiry_secs(),
            upload_expiry_secs: default_upload_expiry_secs(),
            reconcile_page_size: default_reconcile_page_size(),
            reconcile_parallelism: default_reconcile_parallelism(),
        }
    }
}

impl ArchiveConfig {
    /// Get the download token lifetime as a Duration.
    pub fn download_expiry(&self) -> Duration {
        // Saturate at i64::MAX to prevent overflow wrapping to negative
        let secs = i64::try_from(self.download_expiry_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Get the upload session lifetime as a Duration.
    pub fn upload_expiry(&self) -> Duration {
        let secs = i64::try_from(self.upload_expiry_secs).unwrap_or(i64::MAX);
        Duration::seconds(secs)
    }

    /// Create a test configuration with small page sizes.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            download_expiry_secs: 3600,
            upload_expiry_secs: 3600,
            reconcile_page_size: 10,
            reconcile_parallelism: 4,
        }
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.reconcile_page_size == 0 {
            return Err("reconcile_page_size must be at least 1".to_string());
        }
        if self.reconcile_parallelism == 0 {
            return Err("reconcile_parallelism must be at least 1".to_string());
        }
        Ok(())
    }
}
