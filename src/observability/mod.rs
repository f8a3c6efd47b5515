//! Observability: structured logging setup.

mod logging;

pub use logging::{init_logging, log_config_info};
