//! Serialization form shared by every store backend.
//!
//! A [`StoredSecret`] is the on-disk/on-wire shape of a secret: the
//! per-version value is the opaque ciphertext token, the plaintext checksum
//! rides alongside for integrity and drift diagnostics, and timestamps are
//! ISO-8601 UTC. Reading reconstructs domain objects by decrypting each
//! version; a decryption failure or checksum mismatch surfaces as an
//! integrity error and aborts the load.

use crate::domain::{Secret, SecretId, SecretPolicy, SecretString, SecretVersion};
use crate::envelope::EnvelopeKeyManager;
use crate::errors::{Result, StrongroomError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored form of one secret version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Opaque ciphertext token `base64(nonce || tag || ciphertext)`
    pub value: String,
    /// SHA-256 hex digest of the plaintext
    pub checksum: String,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Stored form of a secret aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSecret {
    pub id: String,
    pub name: String,
    pub tenant: String,
    pub policy: SecretPolicy,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub versions: Vec<StoredVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_handler: Option<String>,
}

/// Encrypt a secret's versions and produce its stored form.
pub fn seal_secret(secret: &Secret, keys: &EnvelopeKeyManager) -> Result<StoredSecret> {
    let versions = secret
        .versions
        .iter()
        .map(|version| {
            Ok(StoredVersion {
                version: version.version,
                created_at: version.created_at,
                value: keys.seal(version.value.expose_secret())?,
                checksum: version.checksum.clone(),
                created_by: version.created_by.clone(),
                expires_at: version.expires_at,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StoredSecret {
        id: secret.id.as_str().to_string(),
        name: secret.name.clone(),
        tenant: secret.tenant.clone(),
        policy: secret.policy.clone(),
        created_at: secret.created_at,
        created_by: secret.created_by.clone(),
        versions,
        description: secret.description.clone(),
        rotation_handler: secret.rotation_handler.clone(),
    })
}

/// Decrypt a stored secret back into its domain form.
///
/// Every version's token must authenticate and its plaintext must hash to
/// the recorded checksum; anything else is an integrity error.
pub fn unseal_secret(stored: StoredSecret, keys: &EnvelopeKeyManager) -> Result<Secret> {
    let mut versions = Vec::with_capacity(stored.versions.len());
    for version in stored.versions {
        let plaintext = keys.open(&version.value)?;
        if crate::crypto::checksum(&plaintext) != version.checksum {
            return Err(StrongroomError::integrity(format!(
                "checksum mismatch on secret '{}' version {}",
                stored.id, version.version
            )));
        }
        versions.push(SecretVersion {
            version: version.version,
            created_at: version.created_at,
            value: SecretString::new(plaintext),
            checksum: version.checksum,
            created_by: version.created_by,
            expires_at: version.expires_at,
        });
    }
    versions.sort_by_key(|v| v.version);

    Ok(Secret {
        id: SecretId::from_string(stored.id),
        name: stored.name,
        tenant: stored.tenant,
        policy: stored.policy,
        created_at: stored.created_at,
        created_by: stored.created_by,
        versions,
        description: stored.description,
        rotation_handler: stored.rotation_handler,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SecretPolicy;

    fn keys() -> EnvelopeKeyManager {
        EnvelopeKeyManager::new(SecretString::new("doc-test-master"), 90)
    }

    fn sample_secret() -> Secret {
        let now = Utc::now();
        Secret {
            id: SecretId::new(),
            name: "db-pass".to_string(),
            tenant: "acme".to_string(),
            policy: SecretPolicy::default(),
            created_at: now,
            created_by: "tester".to_string(),
            versions: vec![SecretVersion {
                version: 1,
                created_at: now,
                value: SecretString::new("P@ssw0rd!P@ssw0rd!"),
                checksum: crate::crypto::checksum("P@ssw0rd!P@ssw0rd!"),
                created_by: "tester".to_string(),
                expires_at: None,
            }],
            description: Some("primary database password".to_string()),
            rotation_handler: None,
        }
    }

    #[test]
    fn test_seal_never_contains_plaintext() {
        let keys = keys();
        let secret = sample_secret();
        let stored = seal_secret(&secret, &keys).unwrap();

        let json = serde_json::to_string(&stored).unwrap();
        assert!(!json.contains("P@ssw0rd!"));
        assert!(json.contains(&stored.versions[0].checksum));
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let keys = keys();
        let secret = sample_secret();
        let stored = seal_secret(&secret, &keys).unwrap();
        let restored = unseal_secret(stored, &keys).unwrap();

        assert_eq!(restored.id, secret.id);
        assert_eq!(restored.tenant, secret.tenant);
        assert_eq!(
            restored.versions[0].value.expose_secret(),
            secret.versions[0].value.expose_secret()
        );
        assert_eq!(restored.versions[0].checksum, secret.versions[0].checksum);
    }

    #[test]
    fn test_checksum_drift_is_integrity_error() {
        let keys = keys();
        let secret = sample_secret();
        let mut stored = seal_secret(&secret, &keys).unwrap();
        stored.versions[0].checksum = crate::crypto::checksum("something-else");

        let err = unseal_secret(stored, &keys).unwrap_err();
        assert!(matches!(err, StrongroomError::Integrity { .. }));
    }

    #[test]
    fn test_wrong_key_is_integrity_error() {
        let secret = sample_secret();
        let stored = seal_secret(&secret, &keys()).unwrap();

        let other = EnvelopeKeyManager::new(SecretString::new("other-master"), 90);
        let err = unseal_secret(stored, &other).unwrap_err();
        assert!(matches!(err, StrongroomError::Integrity { .. }));
    }

    #[test]
    fn test_unseal_sorts_versions() {
        let keys = keys();
        let mut secret = sample_secret();
        let mut second = secret.versions[0].clone();
        second.version = 2;
        // Deliberately store out of order.
        secret.versions.insert(0, second);

        let stored = seal_secret(&secret, &keys).unwrap();
        let restored = unseal_secret(stored, &keys).unwrap();
        let numbers: Vec<u32> = restored.versions.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![1, 2]);
    }
}
