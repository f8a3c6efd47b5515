//! Principal identities and the lifecycle action vocabulary.
//!
//! An [`Identity`] is an authenticated principal supplied by the caller on
//! every request; the core does not itself authenticate. Identities are
//! ephemeral and constructed per request. Authorization always compares the
//! identity's tenant to the target resource's tenant.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Role names recognized by the role gate.
///
/// Higher roles are NOT implied by lower ones: an identity must carry the
/// exact role an action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May create and delete secrets
    Admin,
    /// May write new versions and trigger rotation
    Writer,
    /// May read and list secrets
    Reader,
}

impl Role {
    /// Get the wire representation of this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Writer => "writer",
            Self::Reader => "reader",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "writer" => Ok(Self::Writer),
            "reader" => Ok(Self::Reader),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle actions gated by the authorization kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretAction {
    Create,
    Put,
    Rotate,
    Get,
    List,
    Delete,
}

impl SecretAction {
    /// Get the audit-log representation of this action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Put => "put",
            Self::Rotate => "rotate",
            Self::Get => "get",
            Self::List => "list",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SecretAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "put" => Ok(Self::Put),
            "rotate" => Ok(Self::Rotate),
            "get" => Ok(Self::Get),
            "list" => Ok(Self::List),
            "delete" => Ok(Self::Delete),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

impl fmt::Display for SecretAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An authenticated principal: subject, role set, and owning tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque subject string (user id, service account name)
    pub subject: String,
    /// Roles granted to this principal
    pub roles: HashSet<Role>,
    /// Namespace the principal operates in
    pub tenant: String,
}

impl Identity {
    /// Construct an identity from its parts.
    pub fn new(
        subject: impl Into<String>,
        roles: impl IntoIterator<Item = Role>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().collect(),
            tenant: tenant.into(),
        }
    }

    /// Check whether this identity carries the given role.
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Role names as strings, for ABAC condition evaluation.
    pub fn role_names(&self) -> Vec<&'static str> {
        self.roles.iter().map(Role::as_str).collect()
    }
}
