//! Error taxonomy for configuration operations.
//!
//! Absence of an item is not an error: lookups return `Option`.

use std::time::Duration;

use nidavellir_store::StoreError;
use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by the registry, seeder and watch bridge.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required identity field was missing or unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored bytes could not be decoded into a configuration item.
    #[error("malformed item at {key}: {reason}")]
    MalformedItem { key: String, reason: String },

    #[error("failed to encode item: {0}")]
    Serialize(String),

    /// The backing store could not be reached or failed the request.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The operation did not finish within its time budget.
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

impl ConfigError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ConfigError::InvalidArgument(msg.into())
    }
}
