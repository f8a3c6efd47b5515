//! Secret policies: declarative constraints a candidate value must satisfy.
//!
//! A policy is immutable after attachment to a secret; replacing a policy
//! requires a new secret. Enforcement is a pure function over the candidate
//! value and never logs the value itself.

use crate::errors::{Result, StrongroomError};
use serde::{Deserialize, Serialize};

/// Default rotation cadence in days
pub const DEFAULT_ROTATION_DAYS: u32 = 90;

/// Default minimum value length
pub const DEFAULT_MIN_LENGTH: usize = 16;

fn default_rotation_days() -> u32 {
    DEFAULT_ROTATION_DAYS
}

fn default_min_length() -> usize {
    DEFAULT_MIN_LENGTH
}

/// Named constraint bundle attached to a secret at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPolicy {
    /// Policy name, recorded in audit metadata
    pub name: String,

    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Rotation cadence in days (positive)
    #[serde(default = "default_rotation_days")]
    pub rotation_days: u32,

    /// Minimum accepted value length
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    /// Substrings that must not appear in a candidate value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forbid_patterns: Option<Vec<String>>,

    /// Informational CIDR allow-list consumed by adjacent access rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_cidrs: Option<Vec<String>>,
}

impl Default for SecretPolicy {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: None,
            rotation_days: DEFAULT_ROTATION_DAYS,
            min_length: DEFAULT_MIN_LENGTH,
            forbid_patterns: None,
            allowed_cidrs: None,
        }
    }
}

impl SecretPolicy {
    /// Create a named policy with the default constraints.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Evaluate this policy against a candidate secret value.
    ///
    /// Fails with a policy-violation error if the value is shorter than
    /// `min_length` or contains any non-empty forbidden substring. The
    /// candidate value itself never appears in the error or in logs.
    pub fn enforce(&self, candidate: &str) -> Result<()> {
        if candidate.len() < self.min_length {
            return Err(StrongroomError::policy_violation(format!(
                "value length {} is below policy '{}' minimum of {}",
                candidate.len(),
                self.name,
                self.min_length
            )));
        }

        if let Some(patterns) = &self.forbid_patterns {
            for pattern in patterns {
                if !pattern.is_empty() && candidate.contains(pattern.as_str()) {
                    return Err(StrongroomError::policy_violation(format!(
                        "value contains a substring forbidden by policy '{}'",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}
