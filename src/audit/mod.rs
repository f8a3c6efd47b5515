//! Append-only structured audit logging.
//!
//! Every state change and read is observed as an [`AuditLogEntry`]; the
//! file sink serializes each entry as one JSON line with stable keys and
//! flushes after every write. An unavailable sink never silently succeeds:
//! the error propagates to the caller, which logs a local warning and
//! continues (audit failures do not roll back a durable mutation).
//!
//! # Security
//!
//! Secret values are NEVER logged. Entries carry only ids, subjects,
//! actions, and operation metadata.

use crate::domain::{Identity, SecretAction, SecretId};
use crate::errors::{Result, StrongroomError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex as StdMutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::info;

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub subject: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_id: Option<SecretId>,
    pub tenant: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl AuditLogEntry {
    /// Build an entry for a lifecycle action, stamped with the current time.
    pub fn for_action(
        actor: &Identity,
        action: SecretAction,
        secret_id: Option<SecretId>,
        metadata: BTreeMap<String, String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: actor.subject.clone(),
            action: action.as_str().to_string(),
            secret_id,
            tenant: actor.tenant.clone(),
            metadata,
        }
    }
}

/// Append-only audit destination shared by the lifecycle manager and the
/// store backends.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Append one entry. Implementations must not silently drop entries;
    /// failures surface as errors for the caller to warn on.
    async fn append(&self, entry: &AuditLogEntry) -> Result<()>;
}

/// File-backed sink: one JSON object per line, flushed per write.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl FileAuditSink {
    /// Open (or create) the audit log in append-only mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| StrongroomError::Io {
                source: err,
                context: format!("Failed to open audit log at {}", path.display()),
            })?;

        info!(path = %path.display(), "Audit log opened");
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Path this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(|err| StrongroomError::Io {
            source: err,
            context: format!("Failed to append audit entry to {}", self.path.display()),
        })?;
        file.flush().await.map_err(|err| StrongroomError::Io {
            source: err,
            context: format!("Failed to flush audit log at {}", self.path.display()),
        })?;
        Ok(())
    }
}

/// Sink that records entries in memory; used by tests and embedders that
/// ship audit records through their own pipeline.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: StdMutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).push(entry.clone());
        Ok(())
    }
}

/// Fallback sink used when no audit log path is configured: entries go to
/// the structured log stream instead of a dedicated file.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        info!(
            target: "audit",
            subject = %entry.subject,
            action = %entry.action,
            secret_id = entry.secret_id.as_ref().map(|id| id.as_str()),
            tenant = %entry.tenant,
            "audit"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    fn entry(action: SecretAction) -> AuditLogEntry {
        let actor = Identity::new("tester", [Role::Admin], "acme");
        AuditLogEntry::for_action(&actor, action, Some(SecretId::new()), BTreeMap::new())
    }

    #[test]
    fn test_entry_serializes_with_stable_keys() {
        let entry = entry(SecretAction::Create);
        let json = serde_json::to_value(&entry).unwrap();

        assert!(json.get("timestamp").is_some());
        assert_eq!(json["subject"], "tester");
        assert_eq!(json["action"], "create");
        assert_eq!(json["tenant"], "acme");
        assert!(json.get("secret_id").is_some());
        assert!(json.get("metadata").is_some());
    }

    #[test]
    fn test_entry_omits_absent_secret_id() {
        let actor = Identity::new("tester", [Role::Reader], "acme");
        let entry = AuditLogEntry::for_action(&actor, SecretAction::List, None, BTreeMap::new());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("secret_id").is_none());
    }

    #[tokio::test]
    async fn test_file_sink_appends_one_line_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        let sink = FileAuditSink::open(&path).await.unwrap();
        sink.append(&entry(SecretAction::Create)).await.unwrap();
        sink.append(&entry(SecretAction::Get)).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: AuditLogEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.action, "create");
        let second: AuditLogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.action, "get");
    }

    #[tokio::test]
    async fn test_file_sink_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");

        {
            let sink = FileAuditSink::open(&path).await.unwrap();
            sink.append(&entry(SecretAction::Create)).await.unwrap();
        }
        {
            let sink = FileAuditSink::open(&path).await.unwrap();
            sink.append(&entry(SecretAction::Delete)).await.unwrap();
        }

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_memory_sink_records_entries() {
        let sink = MemoryAuditSink::new();
        sink.append(&entry(SecretAction::Put)).await.unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "put");
    }
}
