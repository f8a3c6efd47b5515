//! # Error Types
//!
//! Error types for the Strongroom secret management core using `thiserror`.
//! Every lifecycle, crypto, and storage failure surfaces as one of these
//! variants; nothing is silently swallowed.

/// Custom result type for Strongroom operations
pub type Result<T> = std::result::Result<T, StrongroomError>;

/// Main error type for the Strongroom core
#[derive(thiserror::Error, Debug)]
pub enum StrongroomError {
    /// Secret id unknown to the store
    #[error("Secret not found: '{id}'")]
    NotFound { id: String },

    /// Actor tenant does not match the resource tenant
    #[error("Tenant mismatch: actor belongs to '{actor_tenant}', resource belongs to '{resource_tenant}'")]
    TenantMismatch {
        actor_tenant: String,
        resource_tenant: String,
    },

    /// Required role absent from the actor's role set
    #[error("Missing role: '{action}' requires role '{required}'")]
    MissingRole { required: String, action: String },

    /// Candidate secret value violates the attached policy
    #[error("Policy violation: {message}")]
    PolicyViolation { message: String },

    /// Latest version is past its expiry
    #[error("Secret expired: '{id}'")]
    Expired { id: String },

    /// Rotate called on a secret without a rotation handler
    #[error("No rotation handler registered for secret '{id}'")]
    NoRotationHandler { id: String },

    /// Ciphertext failed authentication or a stored document is malformed
    #[error("Integrity error: {message}")]
    Integrity { message: String },

    /// Decryption requested with an unknown key id
    #[error("Encryption key not found: '{key_id}'")]
    KeyNotFound { key_id: String },

    /// Underlying persistence I/O failed
    #[error("Store unavailable: {context}")]
    Store {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Missing or invalid mandatory configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Relational backend errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors (RNG failures, poisoned locks, handler panics)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl StrongroomError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a tenant mismatch error
    pub fn tenant_mismatch(
        actor_tenant: impl Into<String>,
        resource_tenant: impl Into<String>,
    ) -> Self {
        Self::TenantMismatch {
            actor_tenant: actor_tenant.into(),
            resource_tenant: resource_tenant.into(),
        }
    }

    /// Create a missing role error
    pub fn missing_role(required: impl Into<String>, action: impl Into<String>) -> Self {
        Self::MissingRole { required: required.into(), action: action.into() }
    }

    /// Create a policy violation error
    pub fn policy_violation(message: impl Into<String>) -> Self {
        Self::PolicyViolation { message: message.into() }
    }

    /// Create an expired error
    pub fn expired(id: impl Into<String>) -> Self {
        Self::Expired { id: id.into() }
    }

    /// Create a no rotation handler error
    pub fn no_rotation_handler(id: impl Into<String>) -> Self {
        Self::NoRotationHandler { id: id.into() }
    }

    /// Create an integrity error
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity { message: message.into() }
    }

    /// Create a key not found error
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound { key_id: key_id.into() }
    }

    /// Create a store unavailable error
    pub fn store(context: impl Into<String>) -> Self {
        Self::Store { context: context.into(), source: None }
    }

    /// Create a store unavailable error with source
    pub fn store_with_source(
        context: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Store { context: context.into(), source: Some(source) }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Get the HTTP status code a front-end should map this error to
    pub fn status_code(&self) -> u16 {
        match self {
            StrongroomError::NotFound { .. } => 404,
            StrongroomError::TenantMismatch { .. } => 403,
            StrongroomError::MissingRole { .. } => 403,
            StrongroomError::PolicyViolation { .. } => 400,
            StrongroomError::Config { .. } => 400,
            StrongroomError::Expired { .. } => 500,
            StrongroomError::NoRotationHandler { .. } => 500,
            StrongroomError::Integrity { .. } => 500,
            StrongroomError::KeyNotFound { .. } => 500,
            StrongroomError::Store { .. } => 500,
            StrongroomError::Database { .. } => 500,
            StrongroomError::Io { .. } => 500,
            StrongroomError::Serialization { .. } => 500,
            StrongroomError::Internal { .. } => 500,
        }
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StrongroomError::Store { .. }
                | StrongroomError::Database { .. }
                | StrongroomError::Io { .. }
        )
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for StrongroomError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for StrongroomError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for StrongroomError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<validator::ValidationErrors> for StrongroomError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = StrongroomError::config("missing master key");
        assert!(matches!(error, StrongroomError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: missing master key");
    }

    #[test]
    fn test_missing_role_display() {
        let error = StrongroomError::missing_role("admin", "create");
        assert_eq!(error.to_string(), "Missing role: 'create' requires role 'admin'");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StrongroomError::not_found("abc").status_code(), 404);
        assert_eq!(StrongroomError::tenant_mismatch("a", "b").status_code(), 403);
        assert_eq!(StrongroomError::missing_role("admin", "delete").status_code(), 403);
        assert_eq!(StrongroomError::policy_violation("too short").status_code(), 400);
        assert_eq!(StrongroomError::config("bad").status_code(), 400);
        assert_eq!(StrongroomError::expired("abc").status_code(), 500);
        assert_eq!(StrongroomError::integrity("tag mismatch").status_code(), 500);
        assert_eq!(StrongroomError::key_not_found("k1").status_code(), 500);
        assert_eq!(StrongroomError::store("disk full").status_code(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StrongroomError::store("transient").is_retryable());
        assert!(!StrongroomError::policy_violation("x").is_retryable());
        assert!(!StrongroomError::not_found("x").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: StrongroomError = io_error.into();
        assert!(matches!(error, StrongroomError::Io { .. }));

        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: StrongroomError = json_error.into();
        assert!(matches!(error, StrongroomError::Serialization { .. }));
    }
}
