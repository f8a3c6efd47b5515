//! Envelope key management: data-encryption keys with online rotation.
//!
//! The manager keeps a registry of [`EncryptionKey`]s with exactly one
//! marked active. Encryption always uses the active key; decryption can
//! target any retained key, so values written under retired keys stay
//! readable until they are re-wrapped.
//!
//! The initial key carries the fixed id `primary` and derives its bytes
//! from the master key by SHA-256, which keeps the ciphertext token
//! contract stable across process restarts. Rotated keys derive their
//! bytes with Argon2id using the key id as salt; key bytes are held only
//! in memory and are zeroed on drop.

use crate::crypto;
use crate::domain::SecretString;
use crate::errors::{Result, StrongroomError};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Id of the key derived directly from the master key.
pub const PRIMARY_KEY_ID: &str = "primary";

/// A data-encryption key record. Key bytes never leave this module.
struct EncryptionKey {
    id: String,
    bytes: Zeroizing<[u8; crypto::KEY_SIZE]>,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    is_active: bool,
}

/// Metadata view of a key, safe to expose and log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Result of an envelope encryption: ciphertext plus the key and nonce
/// needed to reverse it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    /// Base64 ciphertext with the authentication tag appended
    pub ciphertext: String,
    /// Id of the key the value was encrypted under
    pub key_id: String,
    /// Base64 96-bit nonce
    pub iv: String,
}

struct KeyRing {
    keys: HashMap<String, EncryptionKey>,
    active_id: String,
}

/// Maintains data-encryption keys and performs envelope encryption.
pub struct EnvelopeKeyManager {
    master_key: SecretString,
    ring: RwLock<KeyRing>,
    rotation_days: i64,
}

impl std::fmt::Debug for EnvelopeKeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EnvelopeKeyManager")
            .field("active_id", &ring.active_id)
            .field("key_count", &ring.keys.len())
            .field("master_key", &crate::domain::REDACTION_MARKER)
            .finish()
    }
}

impl EnvelopeKeyManager {
    /// Create a manager seeded with the primary master-derived key.
    pub fn new(master_key: SecretString, rotation_days: u32) -> Self {
        let primary = EncryptionKey {
            id: PRIMARY_KEY_ID.to_string(),
            bytes: Zeroizing::new(crypto::derive_key(master_key.expose_secret())),
            created_at: Utc::now(),
            expires_at: None,
            is_active: true,
        };

        let mut keys = HashMap::new();
        keys.insert(primary.id.clone(), primary);

        Self {
            master_key,
            ring: RwLock::new(KeyRing { keys, active_id: PRIMARY_KEY_ID.to_string() }),
            rotation_days: i64::from(rotation_days),
        }
    }

    /// Derive 32 bytes of key material for a rotated key.
    ///
    /// Argon2id with the key id as salt: deterministic for a given
    /// (master key, key id) pair, so an embedder that records key ids can
    /// reconstruct the ring after a restart.
    fn derive_dek(&self, key_id: &str) -> Result<Zeroizing<[u8; crypto::KEY_SIZE]>> {
        let mut out = Zeroizing::new([0u8; crypto::KEY_SIZE]);
        argon2::Argon2::default()
            .hash_password_into(
                self.master_key.expose_secret().as_bytes(),
                key_id.as_bytes(),
                out.as_mut_slice(),
            )
            .map_err(|err| {
                StrongroomError::internal(format!("Key derivation failed: {}", err))
            })?;
        Ok(out)
    }

    /// Encrypt plaintext under the active key.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedValue> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let active = ring
            .keys
            .get(&ring.active_id)
            .ok_or_else(|| StrongroomError::key_not_found(ring.active_id.clone()))?;

        let (sealed, nonce) = crypto::seal_bytes(&active.bytes, plaintext.as_bytes())?;
        Ok(EncryptedValue {
            ciphertext: base64::engine::general_purpose::STANDARD.encode(sealed),
            key_id: active.id.clone(),
            iv: base64::engine::general_purpose::STANDARD.encode(nonce),
        })
    }

    /// Decrypt a ciphertext produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with key-not-found if the named key is unknown, and with an
    /// integrity error if the tag check fails.
    pub fn decrypt(&self, ciphertext: &str, key_id: &str, iv: &str) -> Result<String> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let key = ring
            .keys
            .get(key_id)
            .ok_or_else(|| StrongroomError::key_not_found(key_id))?;

        let sealed = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| StrongroomError::integrity("ciphertext is not valid base64"))?;
        let iv_bytes = base64::engine::general_purpose::STANDARD
            .decode(iv)
            .map_err(|_| StrongroomError::integrity("iv is not valid base64"))?;
        if iv_bytes.len() != crypto::NONCE_SIZE {
            return Err(StrongroomError::integrity(format!(
                "iv must be {} bytes, got {}",
                crypto::NONCE_SIZE,
                iv_bytes.len()
            )));
        }
        let mut nonce = [0u8; crypto::NONCE_SIZE];
        nonce.copy_from_slice(&iv_bytes);

        let plaintext = crypto::open_bytes(&key.bytes, &sealed, &nonce)?;
        String::from_utf8(plaintext)
            .map_err(|_| StrongroomError::integrity("decrypted value is not valid UTF-8"))
    }

    /// Encrypt plaintext under the active key into the opaque
    /// `base64(nonce || tag || ciphertext)` token the storage layer persists.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let active = ring
            .keys
            .get(&ring.active_id)
            .ok_or_else(|| StrongroomError::key_not_found(ring.active_id.clone()))?;

        let (sealed, nonce) = crypto::seal_bytes(&active.bytes, plaintext.as_bytes())?;
        Ok(crypto::encode_token(&nonce, &sealed))
    }

    /// Decrypt an opaque token, trying the active key first and then every
    /// retained retired key.
    ///
    /// This is what keeps values written under retired keys readable after
    /// a key rotation. Fails with an integrity error if no retained key
    /// authenticates the token.
    pub fn open(&self, token: &str) -> Result<String> {
        let (nonce, sealed) = crypto::decode_token(token)?;
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);

        let active_first = ring.keys.get(&ring.active_id).into_iter().chain(
            ring.keys.values().filter(|key| key.id != ring.active_id),
        );

        for key in active_first {
            if let Ok(plaintext) = crypto::open_bytes(&key.bytes, &sealed, &nonce) {
                return String::from_utf8(plaintext).map_err(|_| {
                    StrongroomError::integrity("decrypted value is not valid UTF-8")
                });
            }
        }

        Err(StrongroomError::integrity(
            "no retained encryption key authenticates this ciphertext",
        ))
    }

    /// Generate a new key, mark it active, and demote the previous active
    /// key to retired (retained for decryption). Returns the new key id.
    pub fn rotate_key(&self) -> Result<String> {
        let key_id = uuid::Uuid::new_v4().to_string();
        let bytes = self.derive_dek(&key_id)?;

        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let previous_id = ring.active_id.clone();
        if let Some(previous) = ring.keys.get_mut(&previous_id) {
            previous.is_active = false;
        }

        let created_at = Utc::now();
        ring.keys.insert(
            key_id.clone(),
            EncryptionKey { id: key_id.clone(), bytes, created_at, expires_at: None, is_active: true },
        );
        ring.active_id = key_id.clone();

        info!(key_id = %key_id, "Encryption key rotated");
        Ok(key_id)
    }

    /// Whether the active key is older than the configured rotation cadence.
    pub fn should_rotate_key(&self) -> bool {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        match ring.keys.get(&ring.active_id) {
            Some(active) => Utc::now() - active.created_at >= Duration::days(self.rotation_days),
            None => true,
        }
    }

    /// Schedule a retired key for purging at the given instant.
    ///
    /// Only call this once every ciphertext written under the key has been
    /// re-wrapped; the active key cannot be expired.
    pub fn expire_key(&self, key_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        if key_id == ring.active_id {
            return Err(StrongroomError::config("the active key cannot be expired"));
        }
        let key = ring
            .keys
            .get_mut(key_id)
            .ok_or_else(|| StrongroomError::key_not_found(key_id))?;
        key.expires_at = Some(at);
        Ok(())
    }

    /// Purge retired keys whose expiry has passed. Returns how many were
    /// removed.
    pub fn cleanup_expired_keys(&self) -> usize {
        let now = Utc::now();
        let mut ring = self.ring.write().unwrap_or_else(PoisonError::into_inner);
        let before = ring.keys.len();
        ring.keys.retain(|_, key| {
            key.is_active || !matches!(key.expires_at, Some(expiry) if expiry <= now)
        });
        let removed = before - ring.keys.len();
        if removed > 0 {
            debug!(removed, "Purged expired encryption keys");
        }
        removed
    }

    /// Metadata snapshot of every retained key.
    pub fn list_keys(&self) -> Vec<KeyInfo> {
        let ring = self.ring.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<KeyInfo> = ring
            .keys
            .values()
            .map(|key| KeyInfo {
                id: key.id.clone(),
                created_at: key.created_at,
                expires_at: key.expires_at,
                is_active: key.is_active,
            })
            .collect();
        keys.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        keys
    }

    /// Id of the currently active key.
    pub fn active_key_id(&self) -> String {
        self.ring.read().unwrap_or_else(PoisonError::into_inner).active_id.clone()
    }
}
