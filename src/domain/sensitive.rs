//! Redacted carrier for secret material.
//!
//! Plaintext values and master keys travel through the core inside
//! [`SecretString`], which keeps the bytes out of every accidental output
//! channel: formatting and serialization emit a placeholder, the backing
//! buffer is wiped on drop, and equality runs in constant time. The only
//! way to reach the bytes is an explicit [`SecretString::expose_secret`]
//! call at the sites that genuinely need them (policy checks, checksums,
//! the encryption path).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

/// Placeholder emitted wherever a secret would otherwise leak.
pub const REDACTION_MARKER: &str = "<redacted>";

/// A secret value held as a zeroized byte buffer.
///
/// The buffer is always valid UTF-8; construction goes through `String`,
/// and [`expose_secret`](Self::expose_secret) hands back a `&str` without
/// copying. Dropping the wrapper overwrites the buffer before the
/// allocation is returned.
pub struct SecretString {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self { bytes: Zeroizing::new(value.into().into_bytes()) }
    }

    /// Hand back the plaintext.
    ///
    /// Call this only where the bytes are actually consumed; the result
    /// must never reach a log line or an error message.
    pub fn expose_secret(&self) -> &str {
        // The buffer originates from a String and is never mutated, so it
        // stays valid UTF-8.
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    /// Byte length, safe to report.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Compare two byte slices without short-circuiting on the first
/// difference. Length is checked up front; equal-length inputs always scan
/// the full slice.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        constant_time_eq(&self.bytes, &other.bytes)
    }
}

impl Eq for SecretString {}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self { bytes: Zeroizing::new(self.bytes.to_vec()) }
    }
}

impl Default for SecretString {
    fn default() -> Self {
        Self { bytes: Zeroizing::new(Vec::new()) }
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTION_MARKER)
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTION_MARKER)
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Secrets leave the process encrypted or not at all; anything
        // serializing this type directly gets the marker.
        serializer.serialize_str(REDACTION_MARKER)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Config files and request payloads carry real values in.
        String::deserialize(deserializer).map(Self::new)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SecretId, SecretPolicy, SecretVersion};
    use chrono::Utc;

    #[test]
    fn debug_of_a_version_never_shows_plaintext() {
        // Versions get Debug-formatted by tracing instrumentation; the
        // value field must collapse to the marker.
        let version = SecretVersion {
            version: 1,
            created_at: Utc::now(),
            value: SecretString::new("hunter2hunter2"),
            checksum: crate::crypto::checksum("hunter2hunter2"),
            created_by: "tester".to_string(),
            expires_at: None,
        };

        let rendered = format!("{:?}", version);
        assert!(rendered.contains(REDACTION_MARKER));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn display_and_serialize_emit_marker() {
        let secret = SecretString::new("hunter2hunter2");
        assert_eq!(secret.to_string(), REDACTION_MARKER);
        assert_eq!(
            serde_json::to_string(&secret).unwrap(),
            format!("\"{}\"", REDACTION_MARKER)
        );
    }

    #[test]
    fn expose_feeds_policy_and_checksum() {
        // The two in-crate consumers of the plaintext.
        let secret = SecretString::new("0123456789abcdef");
        let policy = SecretPolicy::default();
        assert!(policy.enforce(secret.expose_secret()).is_ok());
        assert_eq!(
            crate::crypto::checksum(secret.expose_secret()),
            crate::crypto::checksum("0123456789abcdef")
        );
    }

    #[test]
    fn deserializes_real_values_from_config_json() {
        let secret: SecretString = serde_json::from_str("\"from-config-file\"").unwrap();
        assert_eq!(secret.expose_secret(), "from-config-file");
        assert_eq!(secret.len(), "from-config-file".len());
    }

    #[test]
    fn equality_is_by_value() {
        assert_eq!(SecretString::new("same"), SecretString::new("same"));
        assert_ne!(SecretString::new("same"), SecretString::new("sane"));
        assert_ne!(SecretString::new("same"), SecretString::new("same-but-longer"));
    }

    #[test]
    fn constant_time_eq_scans_equal_length_slices() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeX"));
        assert!(!constant_time_eq(b"Xbcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abc", b"abcdef"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn clone_preserves_value_independently() {
        let original = SecretString::new("cloneable-secret");
        let copy = original.clone();
        drop(original);
        assert_eq!(copy.expose_secret(), "cloneable-secret");
    }

    #[test]
    fn empty_default() {
        let secret = SecretString::default();
        assert!(secret.is_empty());
        assert_eq!(secret.expose_secret(), "");

        // An aggregate id formatted next to it stays visible; only the
        // secret collapses.
        let id = SecretId::from_str_unchecked("abc-123");
        let line = format!("{} {:?}", id, secret);
        assert!(line.starts_with("abc-123"));
        assert!(line.ends_with(REDACTION_MARKER));
    }
}
