//! Structured logging for the secret management core.
//!
//! Installs a global `tracing` subscriber sized for a service that must
//! never log secret material: operational fields only, with either JSON
//! lines for log shippers or a compact format for terminals. `RUST_LOG`
//! takes precedence over the configured level so operators can turn up
//! verbosity per target without touching configuration.

use crate::config::ObservabilityConfig;
use crate::errors::{Result, StrongroomError};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Level;
use tracing_subscriber::EnvFilter;

static SUBSCRIBER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the process-wide subscriber.
///
/// Idempotent: the first caller wins, later calls validate their
/// configuration and return without touching the installed subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_filter(config)?;

    if SUBSCRIBER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let installed = if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_target(true)
            .try_init()
    };

    installed.map_err(|err| {
        StrongroomError::config(format!("Failed to install tracing subscriber: {}", err))
    })
}

/// Resolve the active filter: `RUST_LOG` when present, otherwise the
/// configured level applied to every target.
fn build_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env().map_err(|err| {
            StrongroomError::config(format!("Invalid RUST_LOG directive: {}", err))
        });
    }

    let level: Level = config.log_level.trim().parse().map_err(|_| {
        StrongroomError::config(format!(
            "Unknown log level '{}' (expected trace, debug, info, warn, or error)",
            config.log_level
        ))
    })?;
    EnvFilter::try_new(level.to_string()).map_err(|err| {
        StrongroomError::config(format!("Invalid log level '{}': {}", config.log_level, err))
    })
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    let store_backend = match &config.store {
        crate::config::StoreConfig::Memory => "memory",
        crate::config::StoreConfig::File { .. } => "file",
        crate::config::StoreConfig::Object { .. } => "object",
        crate::config::StoreConfig::Relational(_) => "relational",
    };

    tracing::info!(
        store_backend,
        audit_log = config.audit.log_path.as_ref().map(|p| p.display().to_string()),
        check_interval_ms = config.scheduler.check_interval_ms,
        max_concurrent_rotations = config.scheduler.max_concurrent_rotations,
        session_timeout_ms = config.session.session_timeout_ms,
        key_rotation_days = config.envelope.key_rotation_days,
        "Strongroom configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str) -> ObservabilityConfig {
        ObservabilityConfig { log_level: level.to_string(), json_logging: false }
    }

    #[test]
    fn test_level_parsing_is_case_insensitive() {
        assert!(build_filter(&config("info")).is_ok());
        assert!(build_filter(&config("WARN")).is_ok());
        assert!(build_filter(&config(" debug ")).is_ok());
    }

    #[test]
    fn test_unknown_level_rejected() {
        let err = build_filter(&config("loud")).unwrap_err();
        assert!(matches!(err, StrongroomError::Config { .. }));

        let err = init_logging(&config("loud")).unwrap_err();
        assert!(matches!(err, StrongroomError::Config { .. }));
    }

    #[test]
    fn test_init_is_idempotent() {
        // Whichever test installs first, later calls must not error on a
        // valid configuration.
        let _ = init_logging(&config("info"));
        assert!(init_logging(&config("debug")).is_ok());
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();

        // Must not panic
        log_config_info(&config);
    }
}
