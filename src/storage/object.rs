//! Object-storage store backend.
//!
//! Same document semantics as the file backend, with an object store
//! replacing local file I/O: the whole secret map lives in one JSON object.
//! Absence of the object is equivalent to an empty document; clients map
//! their vendor's not-found signal (`NoSuchKey`, HTTP 404) to `None`.
//!
//! The backend is generic over [`ObjectClient`], so the document logic is
//! shared between the in-memory client used in tests and vendor clients
//! such as the S3 client shipped behind the `aws` cargo feature.

use crate::audit::AuditSink;
use crate::domain::{Identity, Secret, SecretAction, SecretId};
use crate::envelope::EnvelopeKeyManager;
use crate::errors::{Result, StrongroomError};
use crate::storage::document::{seal_secret, unseal_secret, StoredSecret};
use crate::storage::{observe_delete, observe_mutation, SecretStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::debug;

/// Object name the secret document is stored under, appended to the
/// configured key prefix.
pub const DOCUMENT_OBJECT_NAME: &str = "secrets.json";

/// Minimal object-store client surface the backend needs.
#[async_trait]
pub trait ObjectClient: Send + Sync + std::fmt::Debug {
    /// Fetch an object's bytes; `None` when the object does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an object.
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Remove an object; removing a missing object is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// In-memory object client for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(key).cloned())
    }

    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object in an object store.
pub struct ObjectStore {
    client: Arc<dyn ObjectClient>,
    object_key: String,
    keys: Arc<EnvelopeKeyManager>,
    audit: Arc<dyn AuditSink>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("object_key", &self.object_key)
            .field("client", &self.client)
            .finish()
    }
}

impl ObjectStore {
    /// Create a store writing under `key_prefix` (for example `secrets/`).
    pub fn new(
        client: Arc<dyn ObjectClient>,
        key_prefix: &str,
        keys: Arc<EnvelopeKeyManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            client,
            object_key: format!("{}{}", key_prefix, DOCUMENT_OBJECT_NAME),
            keys,
            audit,
            write_lock: Mutex::new(()),
        }
    }

    /// Full object key of the secret document.
    pub fn object_key(&self) -> &str {
        &self.object_key
    }

    async fn load_document(&self) -> Result<BTreeMap<String, StoredSecret>> {
        match self.client.get_object(&self.object_key).await? {
            None => Ok(BTreeMap::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StrongroomError::integrity(format!(
                    "secret store object '{}' is malformed: {}",
                    self.object_key, err
                ))
            }),
        }
    }

    async fn write_document(&self, document: &BTreeMap<String, StoredSecret>) -> Result<()> {
        let bytes = serde_json::to_vec(document)?;
        self.client.put_object(&self.object_key, bytes).await?;
        debug!(object_key = %self.object_key, secrets = document.len(), "Secret store object written");
        Ok(())
    }
}

#[async_trait]
impl SecretStore for ObjectStore {
    async fn list_secrets(&self, tenant: Option<&str>) -> Result<Vec<Secret>> {
        self.load_document()
            .await?
            .into_values()
            .filter(|secret| tenant.map_or(true, |t| secret.tenant == t))
            .map(|secret| unseal_secret(secret, &self.keys))
            .collect()
    }

    async fn get(&self, id: &SecretId) -> Result<Secret> {
        let mut document = self.load_document().await?;
        let stored = document
            .remove(id.as_str())
            .ok_or_else(|| StrongroomError::not_found(id.as_str()))?;
        unseal_secret(stored, &self.keys)
    }

    async fn save(&self, secret: &Secret, actor: &Identity, action: SecretAction) -> Result<()> {
        let stored = seal_secret(secret, &self.keys)?;

        {
            let _guard = self.write_lock.lock().await;
            let mut document = self.load_document().await?;
            document.insert(stored.id.clone(), stored);
            self.write_document(&document).await?;
        }

        observe_mutation(&self.audit, actor, action, secret).await;
        Ok(())
    }

    async fn delete(&self, id: &SecretId, actor: &Identity) -> Result<()> {
        {
            let _guard = self.write_lock.lock().await;
            let mut document = self.load_document().await?;
            if document.remove(id.as_str()).is_none() {
                return Err(StrongroomError::not_found(id.as_str()));
            }
            self.write_document(&document).await?;
        }

        observe_delete(&self.audit, actor, id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::domain::{Role, SecretPolicy, SecretString, SecretVersion};
    use chrono::Utc;

    fn store() -> ObjectStore {
        let keys = Arc::new(EnvelopeKeyManager::new(SecretString::new("object-test"), 90));
        ObjectStore::new(
            Arc::new(MemoryObjectClient::new()),
            "secrets/",
            keys,
            Arc::new(MemoryAuditSink::new()),
        )
    }

    fn secret(tenant: &str) -> Secret {
        let now = Utc::now();
        Secret {
            id: SecretId::new(),
            name: "api-key".to_string(),
            tenant: tenant.to_string(),
            policy: SecretPolicy::default(),
            created_at: now,
            created_by: "tester".to_string(),
            versions: vec![SecretVersion {
                version: 1,
                created_at: now,
                value: SecretString::new("0123456789abcdef"),
                checksum: crate::crypto::checksum("0123456789abcdef"),
                created_by: "tester".to_string(),
                expires_at: None,
            }],
            description: None,
            rotation_handler: None,
        }
    }

    fn actor(tenant: &str) -> Identity {
        Identity::new("tester", [Role::Admin], tenant)
    }

    #[test]
    fn test_object_key_uses_prefix() {
        let store = store();
        assert_eq!(store.object_key(), "secrets/secrets.json");
    }

    #[tokio::test]
    async fn test_absent_object_is_empty_store() {
        let store = store();
        assert!(store.list_secrets(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_get_roundtrip() {
        let store = store();
        let secret = secret("acme");

        store.save(&secret, &actor("acme"), SecretAction::Create).await.unwrap();
        let loaded = store.get(&secret.id).await.unwrap();
        assert_eq!(loaded.versions[0].value.expose_secret(), "0123456789abcdef");
    }

    #[tokio::test]
    async fn test_list_filters_by_tenant() {
        let store = store();
        store.save(&secret("acme"), &actor("acme"), SecretAction::Create).await.unwrap();
        store.save(&secret("globex"), &actor("globex"), SecretAction::Create).await.unwrap();

        let acme = store.list_secrets(Some("acme")).await.unwrap();
        assert_eq!(acme.len(), 1);
        assert_eq!(acme[0].tenant, "acme");
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let store = store();
        let err = store.delete(&SecretId::new(), &actor("acme")).await.unwrap_err();
        assert!(matches!(err, StrongroomError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_malformed_object_is_integrity_error() {
        let client = Arc::new(MemoryObjectClient::new());
        client.put_object("secrets/secrets.json", b"{ nope".to_vec()).await.unwrap();

        let keys = Arc::new(EnvelopeKeyManager::new(SecretString::new("object-test"), 90));
        let store =
            ObjectStore::new(client, "secrets/", keys, Arc::new(MemoryAuditSink::new()));

        let err = store.list_secrets(None).await.unwrap_err();
        assert!(matches!(err, StrongroomError::Integrity { .. }));
    }
}
