//! Download token generation and validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the URL-safe base64 encoding of 32 random bytes.
const ENCODED_LEN: usize = 43;

/// An opaque, unguessable credential authorizing one file download.
///
/// Tokens are minted at prepare time, stored alongside the download record
/// and presented back by the client at confirm time. They carry no structure
/// beyond 32 bytes of CSPRNG entropy.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadToken(String);

impl DownloadToken {
    /// Generate a new random token using a cryptographically secure RNG.
    pub fn generate() -> Self {
        use base64::Engine;
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Parse a token presented by a client.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.len() != ENCODED_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            return Err(crate::Error::InvalidToken(
                "malformed download token".to_string(),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the encoded token string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log full credentials.
        f.debug_tuple("DownloadToken")
            .field(&format!("{}...", &self.0[..6.min(self.0.len())]))
            .finish()
    }
}

impl fmt::Display for DownloadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_parseable_and_unique() {
        let a = DownloadToken::generate();
        let b = DownloadToken::generate();
        assert_ne!(a, b);
        assert_eq!(DownloadToken::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(DownloadToken::parse("").is_err());
        assert!(DownloadToken::parse("short").is_err());
        assert!(DownloadToken::parse(&"!".repeat(ENCODED_LEN)).is_err());
    }

    #[test]
    fn test_debug_redacts() {
        let token = DownloadToken::generate();
        let debug = format!("{token:?}");
        assert!(!debug.contains(token.as_str()));
    }
}
