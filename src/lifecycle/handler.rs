//! Rotation handler registry.
//!
//! A secret stores only a handler id; the runtime resolves it against this
//! registry of strategies when rotation runs. Handlers may be synchronous
//! closures or fully async implementations; the lifecycle manager awaits
//! their completion either way.

use crate::domain::SecretId;
use crate::errors::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What a rotation handler gets to see about the secret being rotated.
///
/// Deliberately excludes the current plaintext: a handler produces a fresh
/// value, it does not derive one.
#[derive(Debug, Clone)]
pub struct SecretContext {
    pub id: SecretId,
    pub name: String,
    pub tenant: String,
    pub current_version: u32,
}

/// Strategy producing the next value of a secret.
#[async_trait]
pub trait RotationHandler: Send + Sync {
    /// Produce the value the next version will carry.
    async fn produce(&self, context: &SecretContext) -> Result<String>;
}

/// Adapter for synchronous closures.
struct FnRotationHandler<F> {
    f: F,
}

#[async_trait]
impl<F> RotationHandler for FnRotationHandler<F>
where
    F: Fn(&SecretContext) -> Result<String> + Send + Sync,
{
    async fn produce(&self, context: &SecretContext) -> Result<String> {
        (self.f)(context)
    }
}

/// Registry of rotation strategies keyed by handler id.
#[derive(Default)]
pub struct RotationHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn RotationHandler>>>,
}

impl std::fmt::Debug for RotationHandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("RotationHandlerRegistry")
            .field("handler_ids", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RotationHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under an id, replacing any previous registration.
    pub fn register(&self, id: impl Into<String>, handler: Arc<dyn RotationHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.insert(id.into(), handler);
    }

    /// Register a synchronous closure as a handler.
    pub fn register_fn<F>(&self, id: impl Into<String>, f: F)
    where
        F: Fn(&SecretContext) -> Result<String> + Send + Sync + 'static,
    {
        self.register(id, Arc::new(FnRotationHandler { f }));
    }

    /// Look up a handler by id.
    pub fn resolve(&self, id: &str) -> Option<Arc<dyn RotationHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(id).cloned()
    }

    /// Whether a handler id is registered.
    pub fn contains(&self, id: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SecretContext {
        SecretContext {
            id: SecretId::new(),
            name: "db-pass".to_string(),
            tenant: "acme".to_string(),
            current_version: 3,
        }
    }

    #[tokio::test]
    async fn test_register_and_resolve_fn_handler() {
        let registry = RotationHandlerRegistry::new();
        registry.register_fn("random-hex", |ctx| Ok(format!("v{}-fresh-value", ctx.current_version + 1)));

        let handler = registry.resolve("random-hex").unwrap();
        let value = handler.produce(&context()).await.unwrap();
        assert_eq!(value, "v4-fresh-value");
    }

    #[tokio::test]
    async fn test_async_handler() {
        struct Remote;

        #[async_trait]
        impl RotationHandler for Remote {
            async fn produce(&self, _context: &SecretContext) -> Result<String> {
                tokio::task::yield_now().await;
                Ok("remote-minted-value".to_string())
            }
        }

        let registry = RotationHandlerRegistry::new();
        registry.register("remote", Arc::new(Remote));

        let value = registry.resolve("remote").unwrap().produce(&context()).await.unwrap();
        assert_eq!(value, "remote-minted-value");
    }

    #[test]
    fn test_unknown_handler_is_none() {
        let registry = RotationHandlerRegistry::new();
        assert!(registry.resolve("nope").is_none());
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn test_reregistration_replaces() {
        let registry = RotationHandlerRegistry::new();
        registry.register_fn("h", |_| Ok("first".to_string()));
        registry.register_fn("h", |_| Ok("second".to_string()));
        assert!(registry.contains("h"));
    }
}
