//! The lifecycle manager: create / put / rotate / get / list / delete.
//!
//! Each operation performs, in order: resolve the secret, authorize,
//! validate, mutate, persist, audit, emit event. Persistence and audit
//! emission are the only observable side effects; event delivery is
//! best-effort. If the store write fails nothing else happens; if audit
//! emission fails after a durable write the operation still succeeds and
//! the failure is logged.

mod handler;

pub use handler::{RotationHandler, RotationHandlerRegistry, SecretContext};

use crate::audit::{AuditLogEntry, AuditSink};
use crate::auth::allow_action;
use crate::domain::{
    Identity, Secret, SecretAction, SecretEvent, SecretEventKind, SecretId, SecretPolicy,
    SecretString, SecretVersion,
};
use crate::errors::{Result, StrongroomError};
use crate::events::EventBus;
use crate::storage::SecretStore;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Input for [`SecretManager::create_secret`].
#[derive(Debug, Clone)]
pub struct NewSecret {
    pub name: String,
    pub value: SecretString,
    pub policy: SecretPolicy,
    pub description: Option<String>,
    pub rotation_handler: Option<String>,
    pub ttl_seconds: Option<u64>,
}

impl NewSecret {
    /// A new secret with the default policy and no TTL.
    pub fn new(name: impl Into<String>, value: impl Into<SecretString>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            policy: SecretPolicy::default(),
            description: None,
            rotation_handler: None,
            ttl_seconds: None,
        }
    }

    pub fn with_policy(mut self, policy: SecretPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_rotation_handler(mut self, handler_id: impl Into<String>) -> Self {
        self.rotation_handler = Some(handler_id.into());
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }
}

/// Orchestrates secret state transitions over a pluggable store.
pub struct SecretManager {
    store: Arc<dyn SecretStore>,
    audit: Arc<dyn AuditSink>,
    events: EventBus,
    handlers: RotationHandlerRegistry,
}

impl std::fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretManager")
            .field("store", &self.store)
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl SecretManager {
    /// Create a manager over a store and audit sink with a fresh event bus
    /// and an empty handler registry.
    pub fn new(store: Arc<dyn SecretStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            events: EventBus::default(),
            handlers: RotationHandlerRegistry::new(),
        }
    }

    /// Replace the event bus (to share one across components).
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The event bus lifecycle events are published to.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The rotation handler registry secrets reference by id.
    pub fn handlers(&self) -> &RotationHandlerRegistry {
        &self.handlers
    }

    /// Create a secret with its first version.
    ///
    /// Requires the admin role. Names are not unique; every call creates a
    /// fresh aggregate under a new random id.
    #[instrument(skip(self, spec), fields(name = %spec.name, actor = %actor.subject))]
    pub async fn create_secret(&self, spec: NewSecret, actor: &Identity) -> Result<Secret> {
        spec.policy.enforce(spec.value.expose_secret())?;
        allow_action(actor, &actor.tenant, SecretAction::Create)?;

        let now = Utc::now();
        let expires_at = spec.ttl_seconds.map(|ttl| now + Duration::seconds(ttl as i64));
        let checksum = crate::crypto::checksum(spec.value.expose_secret());

        let secret = Secret {
            id: SecretId::new(),
            name: spec.name,
            tenant: actor.tenant.clone(),
            policy: spec.policy,
            created_at: now,
            created_by: actor.subject.clone(),
            versions: vec![SecretVersion {
                version: 1,
                created_at: now,
                value: spec.value,
                checksum,
                created_by: actor.subject.clone(),
                expires_at,
            }],
            description: spec.description,
            rotation_handler: spec.rotation_handler,
        };

        self.store.save(&secret, actor, SecretAction::Create).await?;

        self.events.publish(SecretEvent::now(
            SecretEventKind::Created {
                name: secret.name.clone(),
                policy: secret.policy.name.clone(),
                ttl_seconds: spec.ttl_seconds,
            },
            secret.id.clone(),
            secret.tenant.clone(),
            actor.subject.clone(),
        ));

        info!(secret_id = %secret.id, tenant = %secret.tenant, "Secret created");
        Ok(secret)
    }

    /// Append a new version to an existing secret.
    ///
    /// Requires the writer role within the secret's tenant. Version numbers
    /// are strictly increasing with no gaps.
    #[instrument(skip(self, value), fields(secret_id = %id, actor = %actor.subject))]
    pub async fn put_secret(
        &self,
        id: &SecretId,
        value: SecretString,
        actor: &Identity,
        ttl_seconds: Option<u64>,
    ) -> Result<Secret> {
        let mut secret = self.store.get(id).await?;
        allow_action(actor, &secret.tenant, SecretAction::Put)?;
        secret.policy.enforce(value.expose_secret())?;

        let now = Utc::now();
        let version = secret.next_version_number();
        let checksum = crate::crypto::checksum(value.expose_secret());
        secret.push_version(SecretVersion {
            version,
            created_at: now,
            value,
            checksum,
            created_by: actor.subject.clone(),
            expires_at: ttl_seconds.map(|ttl| now + Duration::seconds(ttl as i64)),
        });

        self.store.save(&secret, actor, SecretAction::Put).await?;

        self.events.publish(SecretEvent::now(
            SecretEventKind::Updated { version, ttl_seconds, rotated: false },
            secret.id.clone(),
            secret.tenant.clone(),
            actor.subject.clone(),
        ));

        info!(secret_id = %secret.id, version, "Secret version written");
        Ok(secret)
    }

    /// Rotate a secret by invoking its registered rotation handler.
    ///
    /// Requires the writer role. Fails with no-handler when the secret has
    /// no handler reference or the reference resolves to nothing.
    #[instrument(skip(self), fields(secret_id = %id, actor = %actor.subject))]
    pub async fn rotate(&self, id: &SecretId, actor: &Identity) -> Result<Secret> {
        let mut secret = self.store.get(id).await?;
        allow_action(actor, &secret.tenant, SecretAction::Rotate)?;

        let handler_id = secret
            .rotation_handler
            .clone()
            .ok_or_else(|| StrongroomError::no_rotation_handler(id.as_str()))?;
        let handler = self
            .handlers
            .resolve(&handler_id)
            .ok_or_else(|| StrongroomError::no_rotation_handler(id.as_str()))?;

        let context = SecretContext {
            id: secret.id.clone(),
            name: secret.name.clone(),
            tenant: secret.tenant.clone(),
            current_version: secret.latest_version().map(|v| v.version).unwrap_or(0),
        };
        let new_value = handler.produce(&context).await?;
        secret.policy.enforce(&new_value)?;

        let now = Utc::now();
        let version = secret.next_version_number();
        let checksum = crate::crypto::checksum(&new_value);
        secret.push_version(SecretVersion {
            version,
            created_at: now,
            value: SecretString::new(new_value),
            checksum,
            created_by: actor.subject.clone(),
            expires_at: None,
        });

        self.store.save(&secret, actor, SecretAction::Rotate).await?;

        self.events.publish(SecretEvent::now(
            SecretEventKind::Updated { version, ttl_seconds: None, rotated: true },
            secret.id.clone(),
            secret.tenant.clone(),
            actor.subject.clone(),
        ));

        info!(secret_id = %secret.id, version, handler = %handler_id, "Secret rotated");
        Ok(secret)
    }

    /// Fetch a secret including the plaintext of its latest version.
    ///
    /// Requires the reader role. Fails with expired when the latest version
    /// is past its expiry.
    #[instrument(skip(self), fields(secret_id = %id, actor = %actor.subject))]
    pub async fn get_secret(&self, id: &SecretId, actor: &Identity) -> Result<Secret> {
        let secret = self.store.get(id).await?;
        allow_action(actor, &secret.tenant, SecretAction::Get)?;

        let latest = secret
            .latest_version()
            .ok_or_else(|| StrongroomError::internal(format!("secret '{}' has no versions", id)))?;
        if latest.is_expired(Utc::now()) {
            self.events.publish(SecretEvent::now(
                SecretEventKind::Expired { version: latest.version },
                secret.id.clone(),
                secret.tenant.clone(),
                actor.subject.clone(),
            ));
            return Err(StrongroomError::expired(id.as_str()));
        }

        let version = latest.version;
        self.observe_read(actor, SecretAction::Get, Some(secret.id.clone()), &secret.name).await;

        self.events.publish(SecretEvent::now(
            SecretEventKind::Accessed { version },
            secret.id.clone(),
            secret.tenant.clone(),
            actor.subject.clone(),
        ));

        Ok(secret)
    }

    /// List every secret in the actor's tenant. Requires the reader role.
    #[instrument(skip(self), fields(actor = %actor.subject, tenant = %actor.tenant))]
    pub async fn list_secrets(&self, actor: &Identity) -> Result<Vec<Secret>> {
        allow_action(actor, &actor.tenant, SecretAction::List)?;

        let secrets = self.store.list_secrets(Some(&actor.tenant)).await?;
        for secret in &secrets {
            self.observe_read(actor, SecretAction::List, Some(secret.id.clone()), &secret.name)
                .await;
        }
        Ok(secrets)
    }

    /// Remove a secret and its whole version history. Requires admin.
    #[instrument(skip(self), fields(secret_id = %id, actor = %actor.subject))]
    pub async fn delete_secret(&self, id: &SecretId, actor: &Identity) -> Result<()> {
        let secret = self.store.get(id).await?;
        allow_action(actor, &secret.tenant, SecretAction::Delete)?;

        self.store.delete(id, actor).await?;

        self.events.publish(SecretEvent::now(
            SecretEventKind::Deleted,
            secret.id.clone(),
            secret.tenant.clone(),
            actor.subject.clone(),
        ));

        info!(secret_id = %id, "Secret deleted");
        Ok(())
    }

    /// Audit a read operation; reads are observed by the manager since the
    /// store only audits mutations.
    async fn observe_read(
        &self,
        actor: &Identity,
        action: SecretAction,
        secret_id: Option<SecretId>,
        name: &str,
    ) {
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), name.to_string());
        let entry = AuditLogEntry::for_action(actor, action, secret_id, metadata);
        if let Err(err) = self.audit.append(&entry).await {
            warn!(error = %err, action = action.as_str(), "Audit emission failed; continuing");
        }
    }
}
