//! Durable-store round-trips: file and object backends driven through the
//! full lifecycle manager, plus the audit file format.

use std::sync::Arc;

use strongroom::audit::{AuditLogEntry, FileAuditSink, MemoryAuditSink};
use strongroom::domain::{Role, SecretPolicy, SecretString};
use strongroom::envelope::EnvelopeKeyManager;
use strongroom::lifecycle::{NewSecret, SecretManager};
use strongroom::storage::{FileStore, MemoryObjectClient, ObjectStore, SecretStore};
use strongroom::Identity;

const MASTER_KEY: &str = "storage-roundtrip-master-key";

fn keys() -> Arc<EnvelopeKeyManager> {
    Arc::new(EnvelopeKeyManager::new(SecretString::new(MASTER_KEY), 90))
}

fn actor() -> Identity {
    Identity::new("t", [Role::Admin, Role::Writer, Role::Reader], "default")
}

fn policy() -> SecretPolicy {
    SecretPolicy { min_length: 8, ..SecretPolicy::named("roundtrip") }
}

#[tokio::test]
async fn file_store_roundtrip_through_manager() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("secrets.json");
    let audit_path = dir.path().join("audit.log");

    let secret_id = {
        let audit = Arc::new(FileAuditSink::open(&audit_path).await.unwrap());
        let store = Arc::new(FileStore::new(&store_path, keys(), audit.clone()));
        let manager = SecretManager::new(store, audit);

        let created = manager
            .create_secret(NewSecret::new("db-pass", "P@ssw0rd!").with_policy(policy()), &actor())
            .await
            .unwrap();
        manager
            .put_secret(&created.id, SecretString::new("NewP@ssw0rd!"), &actor(), None)
            .await
            .unwrap();
        created.id
    };

    // A brand-new process with the same master key reads everything back.
    let audit = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(FileStore::new(&store_path, keys(), audit.clone()));
    let manager = SecretManager::new(store, audit);

    let fetched = manager.get_secret(&secret_id, &actor()).await.unwrap();
    assert_eq!(fetched.versions.len(), 2);
    assert_eq!(fetched.versions[0].value.expose_secret(), "P@ssw0rd!");
    assert_eq!(fetched.latest_version().unwrap().value.expose_secret(), "NewP@ssw0rd!");
    for version in &fetched.versions {
        assert_eq!(strongroom::crypto::checksum(version.value.expose_secret()), version.checksum);
    }

    // The audit log is one JSON object per line with stable keys.
    let audit_contents = tokio::fs::read_to_string(&audit_path).await.unwrap();
    let entries: Vec<AuditLogEntry> = audit_contents
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["create", "put"]);
    assert!(entries.iter().all(|e| e.tenant == "default"));

    // Neither store nor audit file ever contains plaintext.
    let raw_store = tokio::fs::read_to_string(&store_path).await.unwrap();
    assert!(!raw_store.contains("P@ssw0rd!"));
    assert!(!audit_contents.contains("P@ssw0rd!"));
}

#[tokio::test]
async fn object_store_roundtrip_through_manager() {
    let client = Arc::new(MemoryObjectClient::new());
    let audit = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(ObjectStore::new(client, "secrets/", keys(), audit.clone()));
    let manager = SecretManager::new(store, audit);

    let created = manager
        .create_secret(NewSecret::new("api-key", "0123456789abcdef").with_policy(policy()), &actor())
        .await
        .unwrap();

    let fetched = manager.get_secret(&created.id, &actor()).await.unwrap();
    assert_eq!(fetched.latest_version().unwrap().value.expose_secret(), "0123456789abcdef");

    manager.delete_secret(&created.id, &actor()).await.unwrap();
    assert!(manager.get_secret(&created.id, &actor()).await.is_err());
}

#[tokio::test]
async fn values_written_before_key_rotation_stay_readable() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("secrets.json");

    let keys = keys();
    let audit = Arc::new(MemoryAuditSink::new());
    let store = Arc::new(FileStore::new(&store_path, Arc::clone(&keys), audit.clone()));
    let manager = SecretManager::new(store, audit);

    let created = manager
        .create_secret(NewSecret::new("db-pass", "P@ssw0rd!").with_policy(policy()), &actor())
        .await
        .unwrap();

    // Rotate the data-encryption key. The put must first decrypt version 1,
    // written under the now-retired key, before appending version 2.
    keys.rotate_key().unwrap();
    manager
        .put_secret(&created.id, SecretString::new("NewP@ssw0rd!"), &actor(), None)
        .await
        .unwrap();

    let fetched = manager.get_secret(&created.id, &actor()).await.unwrap();
    assert_eq!(fetched.versions[0].value.expose_secret(), "P@ssw0rd!");
    assert_eq!(fetched.versions[1].value.expose_secret(), "NewP@ssw0rd!");
}

#[tokio::test]
async fn wrong_master_key_fails_with_integrity_error() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("secrets.json");

    {
        let audit = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(FileStore::new(&store_path, keys(), audit.clone()));
        let manager = SecretManager::new(store, audit);
        manager
            .create_secret(NewSecret::new("db-pass", "P@ssw0rd!").with_policy(policy()), &actor())
            .await
            .unwrap();
    }

    let wrong_keys =
        Arc::new(EnvelopeKeyManager::new(SecretString::new("a-different-master-key"), 90));
    let store = FileStore::new(&store_path, wrong_keys, Arc::new(MemoryAuditSink::new()));

    let err = store.list_secrets(None).await.unwrap_err();
    assert!(matches!(err, strongroom::StrongroomError::Integrity { .. }));
}
