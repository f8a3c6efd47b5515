//! In-memory store backend.
//!
//! Holds sealed documents in a map and resolves every operation
//! immediately. Used by the test suites and by embedders that manage
//! durability themselves. Values are still encrypted at rest to exercise
//! the same seal/unseal path as the durable backends.

use crate::audit::AuditSink;
use crate::domain::{Identity, Secret, SecretAction, SecretId};
use crate::envelope::EnvelopeKeyManager;
use crate::errors::{Result, StrongroomError};
use crate::storage::document::{seal_secret, unseal_secret, StoredSecret};
use crate::storage::{observe_delete, observe_mutation, SecretStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Map-backed store for tests and embedders.
pub struct MemoryStore {
    secrets: RwLock<BTreeMap<String, StoredSecret>>,
    keys: Arc<EnvelopeKeyManager>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemoryStore").field("secret_count", &secrets.len()).finish()
    }
}

impl MemoryStore {
    pub fn new(keys: Arc<EnvelopeKeyManager>, audit: Arc<dyn AuditSink>) -> Self {
        Self { secrets: RwLock::new(BTreeMap::new()), keys, audit }
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn list_secrets(&self, tenant: Option<&str>) -> Result<Vec<Secret>> {
        let stored: Vec<StoredSecret> = {
            let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
            secrets
                .values()
                .filter(|secret| tenant.map_or(true, |t| secret.tenant == t))
                .cloned()
                .collect()
        };

        stored.into_iter().map(|secret| unseal_secret(secret, &self.keys)).collect()
    }

    async fn get(&self, id: &SecretId) -> Result<Secret> {
        let stored = {
            let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
            secrets
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| StrongroomError::not_found(id.as_str()))?
        };
        unseal_secret(stored, &self.keys)
    }

    async fn save(&self, secret: &Secret, actor: &Identity, action: SecretAction) -> Result<()> {
        let stored = seal_secret(secret, &self.keys)?;
        {
            let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
            secrets.insert(stored.id.clone(), stored);
        }
        observe_mutation(&self.audit, actor, action, secret).await;
        Ok(())
    }

    async fn delete(&self, id: &SecretId, actor: &Identity) -> Result<()> {
        {
            let mut secrets = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
            if secrets.remove(id.as_str()).is_none() {
                return Err(StrongroomError::not_found(id.as_str()));
            }
        }
        observe_delete(&self.audit, actor, id).await;
        Ok(())
    }
}
