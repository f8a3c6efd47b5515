//! Pluggable persistence for secret aggregates.
//!
//! The [`SecretStore`] trait is the contract every backend honors: four
//! async operations whose implementations preserve version monotonicity
//! under concurrent access and partial failure. Every mutation also emits
//! an audit entry through the shared sink; audit failures after a durable
//! write are warned about and never roll the mutation back.
//!
//! Backends: [`MemoryStore`] (tests and embedders), [`FileStore`] (single
//! JSON document with atomic replace), [`ObjectStore`] (same document
//! semantics over any [`ObjectClient`]), and [`RelationalStore`]
//! (PostgreSQL rows via sqlx).

pub mod document;
mod file;
mod memory;
mod object;
mod relational;
#[cfg(feature = "aws")]
mod s3;

use crate::audit::{AuditLogEntry, AuditSink};
use crate::domain::{Identity, Secret, SecretAction, SecretId};
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub use document::{seal_secret, unseal_secret, StoredSecret, StoredVersion};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use object::{MemoryObjectClient, ObjectClient, ObjectStore};
pub use relational::{DbPool, RelationalStore, DEFAULT_TABLE_NAME};
#[cfg(feature = "aws")]
pub use s3::S3ObjectClient;

/// The persistence contract.
///
/// Implementations must serialize writers (or document the single-writer
/// assumption) so version numbering stays monotonic and gap-free, and must
/// never hold locks across awaits that span external I/O.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// List stored secrets, optionally filtered to one tenant.
    async fn list_secrets(&self, tenant: Option<&str>) -> Result<Vec<Secret>>;

    /// Load one secret, failing with not-found for unknown ids.
    async fn get(&self, id: &SecretId) -> Result<Secret>;

    /// Persist a secret (insert or replace) and emit an audit entry
    /// carrying the lifecycle verb.
    async fn save(&self, secret: &Secret, actor: &Identity, action: SecretAction) -> Result<()>;

    /// Remove a secret and emit an audit entry.
    async fn delete(&self, id: &SecretId, actor: &Identity) -> Result<()>;
}

/// Emit the audit entry for a completed mutation.
///
/// The mutation is already durable at this point, so a sink failure is
/// warned about locally and does not fail the operation.
pub(crate) async fn observe_mutation(
    audit: &Arc<dyn AuditSink>,
    actor: &Identity,
    action: SecretAction,
    secret: &Secret,
) {
    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), secret.name.clone());
    metadata.insert("versions".to_string(), secret.versions.len().to_string());

    let entry = AuditLogEntry::for_action(actor, action, Some(secret.id.clone()), metadata);
    if let Err(err) = audit.append(&entry).await {
        warn!(
            error = %err,
            action = action.as_str(),
            secret_id = %secret.id,
            "Audit emission failed after durable write; continuing"
        );
    }
}

/// Emit the audit entry for a completed delete.
pub(crate) async fn observe_delete(audit: &Arc<dyn AuditSink>, actor: &Identity, id: &SecretId) {
    let entry =
        AuditLogEntry::for_action(actor, SecretAction::Delete, Some(id.clone()), BTreeMap::new());
    if let Err(err) = audit.append(&entry).await {
        warn!(
            error = %err,
            secret_id = %id,
            "Audit emission failed after durable delete; continuing"
        );
    }
}
