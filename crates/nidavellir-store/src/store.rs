//! redb-backed implementation of [`KvStore`].
//!
//! All keys live in a single table. Every mutation bumps a persisted
//! revision counter inside its write transaction and, once committed,
//! publishes a [`WatchEvent`] on a broadcast channel. A write gate is
//! held from transaction start through publication so watchers observe
//! events in commit order.
//!
//! redb is synchronous; the async [`KvStore`] methods run each operation
//! on tokio's blocking pool.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::kv::KvStore;
use crate::tables::*;
use crate::types::{EventKind, KeyFilter, WatchEvent, WatchStream};

/// Default number of events buffered per watcher before it is considered lagging.
pub const DEFAULT_WATCH_BUFFER: usize = 1024;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe key-value store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    inner: Arc<Inner>,
}

struct Inner {
    db: Database,
    /// `None` once watches have been closed.
    events: RwLock<Option<broadcast::Sender<Arc<WatchEvent>>>>,
    write_gate: Mutex<()>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path, watch_buffer: usize) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_db(db, watch_buffer)?;
        debug!(?path, "store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_in_memory_with_buffer(DEFAULT_WATCH_BUFFER)
    }

    /// Create an ephemeral in-memory store with a custom watch buffer.
    pub fn open_in_memory_with_buffer(watch_buffer: usize) -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_db(db, watch_buffer)?;
        debug!("in-memory store opened");
        Ok(store)
    }

    fn from_db(db: Database, watch_buffer: usize) -> StoreResult<Self> {
        let (tx, _) = broadcast::channel(watch_buffer.max(1));
        let inner = Inner {
            db,
            events: RwLock::new(Some(tx)),
            write_gate: Mutex::new(()),
        };
        inner.ensure_tables()?;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Revision of the last committed mutation (0 for a fresh store).
    pub fn revision(&self) -> StoreResult<u64> {
        let txn = self.inner.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        Ok(meta
            .get(REVISION_KEY)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value())
            .unwrap_or(0))
    }

    /// End every open watch stream and refuse new ones.
    ///
    /// Reads and writes keep working. Used on shutdown so long-lived
    /// subscribers terminate instead of holding connections open.
    pub fn close_watches(&self) {
        let sender = self
            .inner
            .events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_some() {
            debug!("watch channel closed");
        }
    }

    async fn blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&Inner) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(map_err!(Task))?
    }
}

impl Inner {
    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(KV).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        Ok(table
            .get(key)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_vec()))
    }

    fn get_prefix(&self, prefix: &str) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(KV).map_err(map_err!(Table))?;
        let mut results = BTreeMap::new();
        for entry in table.range(prefix..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let key = key.value();
            // Keys are sorted, so the first miss ends the prefix.
            if !key.starts_with(prefix) {
                break;
            }
            results.insert(key.to_string(), value.value().to_vec());
        }
        Ok(results)
    }

    fn put(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let prev_value;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            prev_value = table
                .insert(key, value)
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());
        }
        let revision = bump_revision(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, revision, "key stored");

        self.publish(WatchEvent {
            kind: EventKind::Put,
            key: key.to_string(),
            value: Some(value.to_vec()),
            prev_value,
            revision,
        });
        Ok(())
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let prev_value;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            prev_value = table
                .remove(key)
                .map_err(map_err!(Write))?
                .map(|guard| guard.value().to_vec());
        }
        let Some(prev_value) = prev_value else {
            txn.abort().map_err(map_err!(Transaction))?;
            return Ok(false);
        };
        let revision = bump_revision(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, revision, "key deleted");

        self.publish(WatchEvent {
            kind: EventKind::Delete,
            key: key.to_string(),
            value: None,
            prev_value: Some(prev_value),
            revision,
        });
        Ok(true)
    }

    fn delete_prefix(&self, prefix: &str) -> StoreResult<u64> {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed: Vec<(String, Vec<u8>)>;
        {
            let mut table = txn.open_table(KV).map_err(map_err!(Table))?;
            // Collect first; the range borrows the table.
            let mut matched = Vec::new();
            for entry in table.range(prefix..).map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let key = key.value();
                if !key.starts_with(prefix) {
                    break;
                }
                matched.push((key.to_string(), value.value().to_vec()));
            }
            for (key, _) in &matched {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
            }
            removed = matched;
        }
        if removed.is_empty() {
            txn.abort().map_err(map_err!(Transaction))?;
            return Ok(0);
        }
        let revision = bump_revision(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%prefix, count = removed.len(), revision, "prefix deleted");

        let count = removed.len() as u64;
        for (key, prev_value) in removed {
            self.publish(WatchEvent {
                kind: EventKind::Delete,
                key,
                value: None,
                prev_value: Some(prev_value),
                revision,
            });
        }
        Ok(count)
    }

    fn subscribe(&self) -> StoreResult<broadcast::Receiver<Arc<WatchEvent>>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(broadcast::Sender::subscribe)
            .ok_or_else(|| StoreError::Unreachable("watch channel closed".to_string()))
    }

    fn publish(&self, event: WatchEvent) {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = events.as_ref() {
            // An error only means nobody is watching.
            let _ = tx.send(Arc::new(event));
        }
    }
}

/// Increment and return the store revision inside `txn`.
fn bump_revision(txn: &WriteTransaction) -> StoreResult<u64> {
    let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
    let current = meta
        .get(REVISION_KEY)
        .map_err(map_err!(Read))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = current + 1;
    meta.insert(REVISION_KEY, next).map_err(map_err!(Write))?;
    Ok(next)
}

/// Turn a broadcast receiver into a filtered [`WatchStream`].
fn filtered_stream(rx: broadcast::Receiver<Arc<WatchEvent>>, filter: KeyFilter) -> WatchStream {
    let stream = futures_util::stream::unfold(Some(rx), move |state| {
        let filter = filter.clone();
        async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(event) if filter.matches(&event.key) => {
                        return Some((Ok(event.as_ref().clone()), Some(rx)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Closed) => return None,
                    Err(RecvError::Lagged(missed)) => {
                        return Some((Err(StoreError::WatchLagged(missed)), None));
                    }
                }
            }
        }
    });
    Box::pin(stream)
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<Vec<u8>>>> + Send {
        let key = key.to_string();
        self.blocking(move |inner| inner.get(&key))
    }

    fn put(&self, key: &str, value: Vec<u8>) -> impl Future<Output = StoreResult<()>> + Send {
        let key = key.to_string();
        self.blocking(move |inner| inner.put(&key, &value))
    }

    fn delete(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send {
        let key = key.to_string();
        self.blocking(move |inner| inner.delete(&key))
    }

    fn delete_prefix(&self, prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send {
        let prefix = prefix.to_string();
        self.blocking(move |inner| inner.delete_prefix(&prefix))
    }

    fn get_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, Vec<u8>>>> + Send {
        let prefix = prefix.to_string();
        self.blocking(move |inner| inner.get_prefix(&prefix))
    }

    fn watch(
        &self,
        key: &str,
        match_prefix: bool,
    ) -> impl Future<Output = StoreResult<WatchStream>> + Send {
        let filter = KeyFilter {
            key: key.to_string(),
            match_prefix,
        };
        let subscribed = self.inner.subscribe();
        async move {
            let rx = subscribed?;
            debug!(key = %filter.key, match_prefix = filter.match_prefix, "watch opened");
            Ok(filtered_stream(rx, filter))
        }
    }
}
