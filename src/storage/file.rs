//! Local file store backend.
//!
//! Persists every secret of the deployment into one JSON document keyed by
//! secret id. Writes are read-modify-write over the whole document,
//! serialized behind an async mutex and landed with a temp-file-plus-rename
//! so a crash never leaves a torn document. Cross-process exclusion is the
//! deployment's responsibility (single writer per store instance).

use crate::audit::AuditSink;
use crate::domain::{Identity, Secret, SecretAction, SecretId};
use crate::envelope::EnvelopeKeyManager;
use crate::errors::{Result, StrongroomError};
use crate::storage::document::{seal_secret, unseal_secret, StoredSecret};
use crate::storage::{observe_delete, observe_mutation, SecretStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Store backed by a single JSON document on local disk.
pub struct FileStore {
    path: PathBuf,
    keys: Arc<EnvelopeKeyManager>,
    audit: Arc<dyn AuditSink>,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

impl FileStore {
    pub fn new(
        path: impl AsRef<Path>,
        keys: Arc<EnvelopeKeyManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            keys,
            audit,
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_document(&self) -> Result<BTreeMap<String, StoredSecret>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(StrongroomError::Io {
                    source: err,
                    context: format!("Failed to read secret store at {}", self.path.display()),
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|err| {
            StrongroomError::integrity(format!(
                "secret store document at {} is malformed: {}",
                self.path.display(),
                err
            ))
        })
    }

    async fn write_document(&self, document: &BTreeMap<String, StoredSecret>) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(document)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| StrongroomError::Io {
                    source: err,
                    context: format!("Failed to create store directory {}", parent.display()),
                })?;
            }
        }

        // Write the whole document to a sibling temp file, then rename over
        // the live one so readers never see a partial write.
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await.map_err(|err| StrongroomError::Io {
            source: err,
            context: format!("Failed to write secret store at {}", tmp_path.display()),
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|err| StrongroomError::Io {
            source: err,
            context: format!("Failed to replace secret store at {}", self.path.display()),
        })?;

        debug!(path = %self.path.display(), secrets = document.len(), "Secret store written");
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FileStore {
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
