//! Checksum types and streaming hashing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 file checksum represented as 32 bytes.
///
/// The catalog stores checksums as lowercase hex digests, which is also the
/// form clients declare in upload manifests.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Create a new Checksum from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Compute the SHA-256 checksum of in-memory data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher for streaming computation.
    pub fn hasher() -> ChecksumHasher {
        ChecksumHasher(Sha256::new())
    }

    /// Parse from a lowercase or uppercase hex digest.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() != 64 {
            return Err(crate::Error::InvalidChecksum(format!(
                "expected 64 hex chars, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
            bytes[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|e| crate::Error::InvalidChecksum(e.to_string()))?;
        }
        Ok(Self(bytes))
    }

    /// Encode as a lowercase hex digest.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Serialized as a hex string so manifests and confirm reports carry the same
// representation the catalog stores.
impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Checksum::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 hasher for streaming file reads.
pub struct ChecksumHasher(Sha256);

impl ChecksumHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finalize and return the checksum.
    pub fn finalize(self) -> Checksum {
        Checksum(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_hex_roundtrip() {
        let checksum = Checksum::compute(b"hello world");
        let hex = checksum.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed = Checksum::from_hex(&hex).unwrap();
        assert_eq!(checksum, parsed);
    }

    #[test]
    fn test_checksum_rejects_bad_hex() {
        assert!(Checksum::from_hex("abc").is_err());
        assert!(Checksum::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hasher = Checksum::hasher();
        for chunk in data.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.finalize(), Checksum::compute(data));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let checksum = Checksum::compute(b"payload");
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json, format!("\"{}\"", checksum.to_hex()));
        let back: Checksum = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checksum);
    }
}
