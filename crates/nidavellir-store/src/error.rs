//! Error types for the Nidavellir store adapter.

use thiserror::Error;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the backing store.
///
/// Every variant means the store could not serve the request. Callers
/// decide whether to retry; the adapter never does.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("store task failed: {0}")]
    Task(String),

    #[error("watcher fell behind by {0} events")]
    WatchLagged(u64),

    #[error("store unreachable: {0}")]
    Unreachable(String),
}
