//! Store doubles for unit tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use nidavellir_store::{KvStore, StoreError, StoreResult, WatchEvent, WatchStream};

fn unreachable() -> StoreError {
    StoreError::Unreachable("connection refused".to_string())
}

/// Fails every call as if the store were down.
#[derive(Clone, Default)]
pub struct FailingStore;

impl KvStore for FailingStore {
    fn get(&self, _key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        async { Err(unreachable()) }
    }

    fn put(&self, _key: &str, _value: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        async { Err(unreachable()) }
    }

    fn delete(&self, _key: &str) -> impl Future<Output = StoreResult<bool>> + Send {
        async { Err(unreachable()) }
    }

    fn delete_prefix(&self, _prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send {
        async { Err(unreachable()) }
    }

    fn get_prefix(
        &self,
        _prefix: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, Vec<u8>>>> + Send {
        async { Err(unreachable()) }
    }

    fn watch(
        &self,
        _key: &str,
        _match_prefix: bool,
    ) -> impl Future<Output = StoreResult<WatchStream>> + Send {
        async { Err(unreachable()) }
    }
}

/// Never answers.
#[derive(Clone, Default)]
pub struct StalledStore;

impl KvStore for StalledStore {
    fn get(&self, _key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        std::future::pending()
    }

    fn put(&self, _key: &str, _value: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        std::future::pending()
    }

    fn delete(&self, _key: &str) -> impl Future<Output = StoreResult<bool>> + Send {
        std::future::pending()
    }

    fn delete_prefix(&self, _prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send {
        std::future::pending()
    }

    fn get_prefix(
        &self,
        _prefix: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, Vec<u8>>>> + Send {
        std::future::pending()
    }

    fn watch(
        &self,
        _key: &str,
        _match_prefix: bool,
    ) -> impl Future<Output = StoreResult<WatchStream>> + Send {
        std::future::pending()
    }
}

/// Serves one watch from a fixed script, then ends the stream.
///
/// Data operations fail; only `watch` is meaningful.
#[derive(Clone)]
pub struct ScriptedStore {
    script: Arc<Mutex<Option<Vec<StoreResult<WatchEvent>>>>>,
}

impl ScriptedStore {
    pub fn new(script: Vec<StoreResult<WatchEvent>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(Some(script))),
        }
    }
}

impl KvStore for ScriptedStore {
    fn get(&self, _key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        async { Err(unreachable()) }
    }

    fn put(&self, _key: &str, _value: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        async { Err(unreachable()) }
    }

    fn delete(&self, _key: &str) -> impl Future<Output = StoreResult<bool>> + Send {
        async { Err(unreachable()) }
    }

    fn delete_prefix(&self, _prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send {
        async { Err(unreachable()) }
    }

    fn get_prefix(
        &self,
        _prefix: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, Vec<u8>>>> + Send {
        async { Err(unreachable()) }
    }

    fn watch(
        &self,
        _key: &str,
        _match_prefix: bool,
    ) -> impl Future<Output = StoreResult<WatchStream>> + Send {
        let script = self.script.lock().unwrap().take().unwrap_or_default();
        async move {
            let stream: WatchStream = Box::pin(futures_util::stream::iter(script));
            Ok(stream)
        }
    }
}
