//! # Strongroom
//!
//! Strongroom is a multi-tenant secret management core: it accepts,
//! encrypts, versions, rotates, and dispenses opaque string values on
//! behalf of named principals, subject to role-based authorization and
//! per-secret policy.
//!
//! ## Architecture
//!
//! ```text
//! Caller (CLI / HTTP front-end) → Lifecycle Manager
//!        ↓                            ↓
//! Authorization Kernel      Policy Enforcer + Envelope Encryption
//!                                     ↓
//!                  Persistence (file / object / relational)
//!                                     ↓
//!                      Audit Sink → Event Bus (best-effort)
//! ```
//!
//! ## Core Components
//!
//! - **Lifecycle manager** ([`lifecycle::SecretManager`]): orchestrates
//!   create / put / rotate / get / list / delete with version monotonicity
//!   and TTL semantics
//! - **Authorization kernel** ([`auth`]): tenant isolation and role checks
//!   on every transition, plus the rule-based ABAC evaluator and session
//!   tracking
//! - **Envelope encryption** ([`envelope::EnvelopeKeyManager`]): AES-256-GCM
//!   data-encryption keys with online rotation and backwards-compatible
//!   decryption under retired keys
//! - **Persistence contract** ([`storage::SecretStore`]): pluggable
//!   file / object-storage / relational backends with shared audit emission
//! - **Rotation scheduler** ([`rotation::RotationScheduler`]): timer-driven
//!   rotation with windows, retry, and backoff

pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod envelope;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod observability;
pub mod rotation;
pub mod storage;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use domain::{Identity, Role, Secret, SecretId, SecretPolicy, SecretString};
pub use errors::{Error, Result, StrongroomError};
pub use lifecycle::{NewSecret, SecretManager};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "strongroom");
    }
}
