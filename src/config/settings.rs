//! # Configuration Settings
//!
//! Configuration structure for the Strongroom core: master key, store
//! backend selection, audit sink, rotation scheduler, session tracking,
//! and envelope key management.

use crate::domain::SecretString;
use crate::errors::{Result, StrongroomError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Environment variable the master key is loaded from
pub const MASTER_KEY_ENV: &str = "STRONGROOM_MASTER_KEY";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Master key every data-encryption key derives from (required, secret)
    pub master_key: SecretString,

    /// Store backend selection and settings
    pub store: StoreConfig,

    /// Audit sink configuration
    pub audit: AuditConfig,

    /// Rotation scheduler configuration
    #[validate(nested)]
    pub scheduler: SchedulerConfig,

    /// Session tracking configuration
    #[validate(nested)]
    pub session: SessionConfig,

    /// Envelope key management configuration
    #[validate(nested)]
    pub envelope: EnvelopeConfig,

    /// Logging configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(StrongroomError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic beyond what the validator crate covers
    fn validate_custom(&self) -> Result<()> {
        if self.master_key.is_empty() {
            return Err(StrongroomError::config(format!(
                "master key is required; set {} or provide it explicitly",
                MASTER_KEY_ENV
            )));
        }

        if self.master_key.len() < 16 {
            return Err(StrongroomError::config(
                "master key must be at least 16 characters long",
            ));
        }

        self.store.validate()?;
        self.envelope.validate_custom()?;
        Ok(())
    }

    /// Load the master key from the environment, keeping everything else
    /// at its default.
    pub fn from_env() -> Result<Self> {
        let master_key = std::env::var(MASTER_KEY_ENV).map_err(|_| {
            StrongroomError::config(format!(
                "{} environment variable not set. Generate a key with: openssl rand -base64 32",
                MASTER_KEY_ENV
            ))
        })?;

        Ok(Self { master_key: SecretString::new(master_key), ..Self::default() })
    }
}

/// Store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (tests, embedders)
    Memory,
    /// Single JSON document on local disk
    File {
        store_path: PathBuf,
    },
    /// Single JSON object in an object store
    Object {
        bucket: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        region: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_id: Option<String>,
        #[serde(default = "default_key_prefix")]
        key_prefix: String,
    },
    /// PostgreSQL rows
    Relational(RelationalStoreConfig),
}

fn default_key_prefix() -> String {
    "secrets/".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::File { store_path: PathBuf::from("./data/secrets.json") }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Memory => Ok(()),
            Self::File { store_path } => {
                if store_path.as_os_str().is_empty() {
                    return Err(StrongroomError::config("file store path cannot be empty"));
                }
                Ok(())
            }
            Self::Object { bucket, .. } => {
                if bucket.is_empty() {
                    return Err(StrongroomError::config(
                        "object store bucket is required and cannot be empty",
                    ));
                }
                Ok(())
            }
            Self::Relational(config) => {
                if config.connection_string.is_empty() {
                    return Err(StrongroomError::config(
                        "relational store connection string cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Relational (PostgreSQL) store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RelationalStoreConfig {
    /// PostgreSQL connection string
    pub connection_string: String,

    /// Table holding the secret rows
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,
}

fn default_table_name() -> String {
    "secrets".to_string()
}

impl Default for RelationalStoreConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            table_name: default_table_name(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
        }
    }
}

impl RelationalStoreConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }
}

/// Audit sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// Path of the append-only JSONL audit log; entries go to the
    /// structured log stream when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

/// Rotation scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SchedulerConfig {
    /// How often the scheduler scans its schedules
    #[validate(range(min = 100, message = "Check interval must be at least 100ms"))]
    pub check_interval_ms: u64,

    /// Schedules processed per pass
    #[validate(range(min = 1, max = 64, message = "Concurrency must be between 1 and 64"))]
    pub max_concurrent_rotations: usize,

    /// Retry budget for schedules registered without an explicit one
    #[validate(range(min = 1, max = 20, message = "Max retries must be between 1 and 20"))]
    pub default_max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { check_interval_ms: 60_000, max_concurrent_rotations: 4, default_max_retries: 3 }
    }
}

/// Session tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SessionConfig {
    /// Inactivity timeout for sessions
    #[validate(range(min = 1000, message = "Session timeout must be at least one second"))]
    pub session_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { session_timeout_ms: 60 * 60 * 1000 }
    }
}

/// Envelope key management configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnvelopeConfig {
    /// Cadence after which the active key should rotate
    #[validate(range(min = 1, max = 3650, message = "Key rotation must be between 1 and 3650 days"))]
    pub key_rotation_days: u32,

    /// Key size in bytes
    pub key_size: usize,

    /// Cipher name
    pub algorithm: String,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self { key_rotation_days: 90, key_size: 32, algorithm: "aes-256-gcm".to_string() }
    }
}

impl EnvelopeConfig {
    fn validate_custom(&self) -> Result<()> {
        if self.algorithm != "aes-256-gcm" {
            return Err(StrongroomError::config(format!(
                "unsupported envelope algorithm '{}'; only aes-256-gcm is available",
                self.algorithm
            )));
        }
        if self.key_size != 32 {
            return Err(StrongroomError::config(format!(
                "aes-256-gcm requires a 32-byte key, got {}",
                self.key_size
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Emit JSON structured logs instead of the pretty format
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}
