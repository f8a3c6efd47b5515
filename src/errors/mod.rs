//! Error handling for the Strongroom core.

mod types;

pub use types::{Result, StrongroomError};

/// Convenience alias used throughout the crate
pub use types::StrongroomError as Error;
