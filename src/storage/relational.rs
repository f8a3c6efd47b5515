//! Relational store backend (PostgreSQL via sqlx).
//!
//! One row per secret: `(id PRIMARY KEY, tenant, data JSONB, created_at,
//! updated_at)`. Saves upsert with `ON CONFLICT (id) DO UPDATE`, listing
//! filters by tenant in SQL. Operations draw connections from a shared
//! pool sized by [`RelationalStoreConfig`]; [`RelationalStore::connect`]
//! is the one entry point that checks the configuration, dials the
//! database, and prepares the schema.

use crate::audit::AuditSink;
use crate::config::RelationalStoreConfig;
use crate::domain::{Identity, Secret, SecretAction, SecretId};
use crate::envelope::EnvelopeKeyManager;
use crate::errors::{Result, StrongroomError};
use crate::storage::document::{seal_secret, unseal_secret, StoredSecret};
use crate::storage::{observe_delete, observe_mutation, SecretStore};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Connection pool shared by relational-store operations.
pub type DbPool = PgPool;

/// Default table name for the secret rows.
pub const DEFAULT_TABLE_NAME: &str = "secrets";

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Reject configurations the pool would choke on at runtime.
fn check_config(config: &RelationalStoreConfig) -> Result<()> {
    let url = config.connection_string.as_str();
    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
        return Err(StrongroomError::config(
            "relational store requires a postgresql:// connection string",
        ));
    }
    if config.max_connections == 0 {
        return Err(StrongroomError::config("max_connections must be greater than 0"));
    }
    if config.min_connections > config.max_connections {
        return Err(StrongroomError::config(
            "min_connections cannot be greater than max_connections",
        ));
    }
    Ok(())
}

/// Strip userinfo from a connection string before it reaches a log line.
fn scrub_credentials(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else { return url.to_string() };
    let rest = &url[scheme_end + 3..];
    match rest.rfind('@') {
        Some(at) => format!("{}://***@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Store backed by a PostgreSQL table.
pub struct RelationalStore {
    pool: DbPool,
    table: String,
    keys: Arc<EnvelopeKeyManager>,
    audit: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for RelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalStore")
            .field("table", &self.table)
            .field("pool_size", &self.pool.size())
            .finish()
    }
}

impl RelationalStore {
    /// Create a store over an existing pool.
    ///
    /// The table name must be a bare SQL identifier; anything else is a
    /// configuration error (it is interpolated into statements).
    pub fn new(
        pool: DbPool,
        table: impl Into<String>,
        keys: Arc<EnvelopeKeyManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let table = table.into();
        if !TABLE_NAME_RE.is_match(&table) {
            return Err(StrongroomError::config(format!(
                "table name '{}' is not a valid SQL identifier",
                table
            )));
        }
        Ok(Self { pool, table, keys, audit })
    }

    /// Validate the configuration, open the connection pool, and ensure
    /// the backing schema exists.
    pub async fn connect(
        config: &RelationalStoreConfig,
        keys: Arc<EnvelopeKeyManager>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        check_config(config)?;

        let connect_options =
            PgConnectOptions::from_str(&config.connection_string).map_err(|err| {
                StrongroomError::Database {
                    source: err,
                    context: format!(
                        "Invalid connection string: {}",
                        scrub_credentials(&config.connection_string)
                    ),
                }
            })?;

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .test_before_acquire(true);
        if let Some(idle_timeout) = config.idle_timeout() {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        let pool = pool_options.connect_with(connect_options).await.map_err(|err| {
            StrongroomError::Database {
                source: err,
                context: format!(
                    "Failed to connect to {}",
                    scrub_credentials(&config.connection_string)
                ),
            }
        })?;

        info!(
            url = %scrub_credentials(&config.connection_string),
            table = %config.table_name,
            max_connections = config.max_connections,
            "Relational store connected"
        );

        let store = Self::new(pool, config.table_name.clone(), keys, audit)?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the backing table and tenant index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                tenant TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
            table = self.table
        );
        sqlx::query(&create_table).execute(&self.pool).await.map_err(|err| {
            StrongroomError::Database {
                source: err,
                context: format!("Failed to create table '{}'", self.table),
            }
        })?;

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_tenant ON {table} (tenant)",
            table = self.table
        );
        sqlx::query(&create_index).execute(&self.pool).await.map_err(|err| {
            StrongroomError::Database {
                source: err,
                context: format!("Failed to create tenant index on '{}'", self.table),
            }
        })?;

        debug!(table = %self.table, "Relational store schema ensured");
        Ok(())
    }

    /// Round-trip a trivial query and report pool occupancy.
    ///
    /// Intended for readiness probes and periodic health logging.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(|err| {
            StrongroomError::Database {
                source: err,
                context: "Relational store health check failed".to_string(),
            }
        })?;

        debug!(
            pool_size = self.pool.size(),
            pool_idle = self.pool.num_idle(),
            table = %self.table,
            "Relational store healthy"
        );
        Ok(())
    }

    fn decode_row(&self, data: serde_json::Value) -> Result<Secret> {
        let stored: StoredSecret = serde_json::from_value(data).map_err(|err| {
            StrongroomError::integrity(format!("stored secret row is malformed: {}", err))
        })?;
        unseal_secret(stored, &self.keys)
    }
}

#[async_trait]
impl SecretStore for RelationalStore {
    async fn list_secrets(&self, tenant: Option<&str>) -> Result<Vec<Secret>> {
        let sql = format!(
            "SELECT data FROM {table} WHERE $1::text IS NULL OR tenant = $1 ORDER BY created_at",
            table = self.table
        );
        let rows = sqlx::query(&sql)
            .bind(tenant)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| StrongroomError::Database {
                source: err,
                context: format!("Failed to list secrets from '{}'", self.table),
            })?;

        rows.into_iter()
            .map(|row| {
                let data: serde_json::Value = row.try_get("data").map_err(|err| {
                    StrongroomError::Database {
                        source: err,
                        context: "Failed to decode data column".to_string(),
                    }
                })?;
                self.decode_row(data)
            })
            .collect()
    }

    async fn get(&self, id: &SecretId) -> Result<Secret> {
        let sql = format!("SELECT data FROM {table} WHERE id = $1", table = self.table);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StrongroomError::Database {
                source: err,
                context: format!("Failed to load secret '{}'", id),
            })?
            .ok_or_else(|| StrongroomError::not_found(id.as_str()))?;

        let data: serde_json::Value =
            row.try_get("data").map_err(|err| StrongroomError::Database {
                source: err,
                context: "Failed to decode data column".to_string(),
            })?;
        self.decode_row(data)
    }

    async fn save(&self, secret: &Secret, actor: &Identity, action: SecretAction) -> Result<()> {
        let stored = seal_secret(secret, &self.keys)?;
        let data = serde_json::to_value(&stored)?;

        let sql = format!(
            "INSERT INTO {table} (id, tenant, data, created_at, updated_at)
             VALUES ($1, $2, $3, NOW(), NOW())
             ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
            table = self.table
        );
        sqlx::query(&sql)
            .bind(stored.id.as_str())
            .bind(stored.tenant.as_str())
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|err| StrongroomError::Database {
                source: err,
                context: format!("Failed to save secret '{}'", secret.id),
            })?;

        observe_mutation(&self.audit, actor, action, secret).await;
        Ok(())
    }

    async fn delete(&self, id: &SecretId, actor: &Identity) -> Result<()> {
        let sql = format!("DELETE FROM {table} WHERE id = $1", table = self.table);
        let result = sqlx::query(&sql)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|err| StrongroomError::Database {
                source: err,
                context: format!("Failed to delete secret '{}'", id),
            })?;

        if result.rows_affected() == 0 {
            return Err(StrongroomError::not_found(id.as_str()));
        }

        observe_delete(&self.audit, actor, id).await;
        Ok(())
    }
}
