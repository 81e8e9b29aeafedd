//! The store adapter contract.
//!
//! Everything above this crate talks to the consistent store through
//! [`KvStore`]. Implementations make direct calls with no local caching
//! and never retry; any failure surfaces as a [`StoreError`].
//!
//! [`StoreError`]: crate::StoreError

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::StoreResult;
use crate::types::WatchStream;

/// Async key-value store with prefix scans and revision-ordered watches.
///
/// Implementations are cheap to clone and safe to share across tasks.
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Fetch the value at `key`, or `None` if absent.
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send;

    /// Insert or overwrite `key`.
    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send;

    /// Remove exactly `key`. Returns true if it existed.
    fn delete(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Remove every key starting with `prefix`. Returns the number removed.
    fn delete_prefix(&self, prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Fetch every key starting with `prefix`.
    fn get_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, Vec<u8>>>> + Send;

    /// Subscribe to changes on `key`, or on every key under it when
    /// `match_prefix` is set. Only changes committed after the call
    /// returns are delivered.
    fn watch(
        &self,
        key: &str,
        match_prefix: bool,
    ) -> impl Future<Output = StoreResult<WatchStream>> + Send;
}
