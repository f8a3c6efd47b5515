//! Secret lifecycle events delivered to external collaborators.
//!
//! Each event kind is a tagged enum variant with typed fields; the
//! string-valued metadata map consumed by notification transports is
//! produced at the serialization boundary by [`SecretEvent::metadata`].
//! Delivery is best-effort and asynchronous; event failures never roll
//! back the triggering operation.

use crate::domain::SecretId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened to a secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretEventKind {
    /// A secret was created with its first version
    Created {
        name: String,
        policy: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_seconds: Option<u64>,
    },
    /// A new version was written (manually or by rotation)
    Updated {
        version: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ttl_seconds: Option<u64>,
        #[serde(default)]
        rotated: bool,
    },
    /// The secret was removed from the store
    Deleted,
    /// The latest version's plaintext was dispensed
    Accessed { version: u32 },
    /// A read found the latest version past its expiry
    Expired { version: u32 },
}

impl SecretEventKind {
    /// Stable event type identifier.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted => "deleted",
            Self::Accessed { .. } => "accessed",
            Self::Expired { .. } => "expired",
        }
    }
}

/// A secret lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretEvent {
    /// What happened
    #[serde(flatten)]
    pub kind: SecretEventKind,
    /// The secret affected
    pub secret_id: SecretId,
    /// Tenant owning the secret
    pub tenant: String,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Subject that triggered the change
    pub actor: String,
}

impl SecretEvent {
    /// Build an event stamped with the current time.
    pub fn now(
        kind: SecretEventKind,
        secret_id: SecretId,
        tenant: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            secret_id,
            tenant: tenant.into(),
            timestamp: Utc::now(),
            actor: actor.into(),
        }
    }

    /// Stable event type identifier.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Flatten the typed fields into a string-valued metadata map.
    ///
    /// Notification transports consume this shape; structured payloads stay
    /// JSON-encoded strings inside the map.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        match &self.kind {
            SecretEventKind::Created { name, policy, ttl_seconds } => {
                map.insert("name".to_string(), name.clone());
                map.insert("policy".to_string(), policy.clone());
                if let Some(ttl) = ttl_seconds {
                    map.insert("ttl_seconds".to_string(), ttl.to_string());
                }
            }
            SecretEventKind::Updated { version, ttl_seconds, rotated } => {
                map.insert("version".to_string(), version.to_string());
                if let Some(ttl) = ttl_seconds {
                    map.insert("ttl_seconds".to_string(), ttl.to_string());
                }
                if *rotated {
                    map.insert("rotated".to_string(), "true".to_string());
                }
            }
            SecretEventKind::Deleted => {}
            SecretEventKind::Accessed { version } | SecretEventKind::Expired { version } => {
                map.insert("version".to_string(), version.to_string());
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let id = SecretId::new();
        let event = SecretEvent::now(
            SecretEventKind::Created {
                name: "db-pass".to_string(),
                policy: "default".to_string(),
                ttl_seconds: None,
            },
            id,
            "acme",
            "admin",
        );
        assert_eq!(event.event_type(), "created");
    }

    #[test]
    fn test_created_metadata() {
        let event = SecretEvent::now(
            SecretEventKind::Created {
                name: "db-pass".to_string(),
                policy: "strict".to_string(),
                ttl_seconds: Some(300),
            },
            SecretId::new(),
            "acme",
            "admin",
        );
        let metadata = event.metadata();
        assert_eq!(metadata.get("name").unwrap(), "db-pass");
        assert_eq!(metadata.get("policy").unwrap(), "strict");
        assert_eq!(metadata.get("ttl_seconds").unwrap(), "300");
    }

    #[test]
    fn test_updated_metadata_marks_rotation() {
        let event = SecretEvent::now(
            SecretEventKind::Updated { version: 4, ttl_seconds: None, rotated: true },
            SecretId::new(),
            "acme",
            "rotation-scheduler",
        );
        let metadata = event.metadata();
        assert_eq!(metadata.get("version").unwrap(), "4");
        assert_eq!(metadata.get("rotated").unwrap(), "true");
        assert!(!metadata.contains_key("ttl_seconds"));
    }

    #[test]
    fn test_serialization_tags_kind() {
        let event = SecretEvent::now(
            SecretEventKind::Deleted,
            SecretId::from_str_unchecked("abc"),
            "acme",
            "admin",
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "deleted");
        assert_eq!(json["secret_id"], "abc");
        assert_eq!(json["tenant"], "acme");
    }
}
