//! Configuration for the Strongroom core.

mod settings;

pub use settings::{
    AppConfig, AuditConfig, EnvelopeConfig, ObservabilityConfig, RelationalStoreConfig,
    SchedulerConfig, SessionConfig, StoreConfig, MASTER_KEY_ENV,
};
