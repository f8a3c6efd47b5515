//! The secret aggregate and its version history.
//!
//! A [`Secret`] owns an ordered history of [`SecretVersion`]s. Version
//! numbers are monotonic, gap-free positive integers starting at 1; the
//! latest version is the one with the greatest number, not the last
//! appended. Plaintext values live only in memory wrapped in
//! [`SecretString`]; the storage layer encrypts them before serialization.

use crate::domain::{SecretId, SecretPolicy, SecretString};
use chrono::{DateTime, Utc};

/// One immutable snapshot of a secret's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretVersion {
    /// Monotonic positive version number, starting at 1
    pub version: u32,
    /// When this version was written
    pub created_at: DateTime<Utc>,
    /// Plaintext value; never persisted in the clear
    pub value: SecretString,
    /// SHA-256 hex digest of the plaintext, retained post-encryption
    pub checksum: String,
    /// Subject that wrote this version
    pub created_by: String,
    /// Optional expiry; a past value marks the version expired
    pub expires_at: Option<DateTime<Utc>>,
}

impl SecretVersion {
    /// Whether this version is past its expiry at the given instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if expiry <= now)
    }
}

/// The secret aggregate: identity, policy, and version history.
#[derive(Debug, Clone)]
pub struct Secret {
    /// Opaque 128-bit random identifier
    pub id: SecretId,
    /// Human label; not unique
    pub name: String,
    /// Owning tenant; immutable for the life of the secret
    pub tenant: String,
    /// Constraint bundle; immutable after attachment
    pub policy: SecretPolicy,
    /// When the secret was created
    pub created_at: DateTime<Utc>,
    /// Subject that created the secret
    pub created_by: String,
    /// Ordered version history; never empty
    pub versions: Vec<SecretVersion>,
    /// Optional free-form description
    pub description: Option<String>,
    /// Optional rotation handler id, resolved against the handler registry
    pub rotation_handler: Option<String>,
}

impl Secret {
    /// The version with the greatest version number.
    ///
    /// A secret always has at least one version, so this only returns
    /// `None` on an aggregate that was constructed incorrectly.
    pub fn latest_version(&self) -> Option<&SecretVersion> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    /// The number the next appended version must carry: `max(version) + 1`.
    pub fn next_version_number(&self) -> u32 {
        self.versions.iter().map(|v| v.version).max().unwrap_or(0) + 1
    }

    /// Append a new version, keeping the history sorted by version number.
    pub fn push_version(&mut self, version: SecretVersion) {
        self.versions.push(version);
        self.versions.sort_by_key(|v| v.version);
    }

    /// Verify the monotonic, gap-free numbering invariant.
    pub fn versions_are_contiguous(&self) -> bool {
        self.versions
            .iter()
            .enumerate()
            .all(|(index, v)| v.version == index as u32 + 1)
    }
}
