//! Change-notification bridge.
//!
//! Turns raw store watch events into typed [`ChangeEvent`]s. Each call to
//! [`ConfigWatcher::watch`] opens its own store subscription and spawns a
//! producer task feeding a bounded queue owned by the returned
//! [`WatchHandle`]:
//!
//! ```text
//! store watch ──▶ producer task ──▶ mpsc queue ──▶ WatchHandle (consumer)
//!                 decode + classify
//! ```
//!
//! Lifecycle per watch: `Subscribing -> Streaming -> {Closed, Failed}`.
//! Dropping or cancelling the handle closes the queue; the producer
//! notices, drops the store subscription and ends in `Closed`. A store
//! error is delivered once as the last item and ends in `Failed`. There
//! is no replay and no reconnect: a new watch starts from "now".
//!
//! Deletes carry the item rebuilt from the value the key held before the
//! delete. If that value is missing or does not decode, the event is
//! key-only: `item` is `None` and only `service_name`/`key` identify it.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use nidavellir_store::{EventKind, KvStore, WatchEvent, WatchStream};

use crate::error::{ConfigError, ConfigResult};
use crate::item::ConfigItem;
use crate::keyspace;
use crate::registry::DEFAULT_TIMEOUT;

/// Default capacity of each watcher's queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Classified change type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// A typed notification about one configuration item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub service_name: String,
    pub key: String,
    /// The item after the change; for deletes, the item that was removed.
    pub item: Option<ConfigItem>,
    /// Store revision of the change.
    pub revision: u64,
}

impl ChangeEvent {
    /// Decode and classify a raw store event.
    ///
    /// Returns `None` for events that cannot be attributed to an item:
    /// keys outside the key-space, or puts whose value does not decode.
    pub fn from_raw(event: &WatchEvent) -> Option<Self> {
        let Some((service, key)) = keyspace::parse_item_key(&event.key) else {
            warn!(key = %event.key, "dropping watch event outside the key-space");
            return None;
        };

        let (kind, item) = match event.kind {
            EventKind::Put => {
                let bytes = event.value.as_deref().unwrap_or_default();
                match keyspace::decode(&event.key, bytes) {
                    Ok(item) => {
                        let kind = if event.is_create() {
                            ChangeKind::Created
                        } else {
                            ChangeKind::Updated
                        };
                        (kind, Some(item))
                    }
                    Err(e) => {
                        warn!(key = %event.key, error = %e, "dropping undecodable watch event");
                        return None;
                    }
                }
            }
            EventKind::Delete => {
                let item = event
                    .prev_value
                    .as_deref()
                    .and_then(|bytes| keyspace::decode(&event.key, bytes).ok());
                (ChangeKind::Deleted, item)
            }
        };

        Some(Self {
            kind,
            service_name: service.to_string(),
            key: key.to_string(),
            item,
            revision: event.revision,
        })
    }
}

/// Lifecycle of a single watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Subscribing,
    Streaming,
    /// Ended by the consumer or by the store going away.
    Closed,
    /// Ended by a store error.
    Failed,
}

/// Opens watches on the configuration key-space.
#[derive(Clone)]
pub struct ConfigWatcher<S> {
    store: S,
    timeout: Duration,
    queue_capacity: usize,
}

impl<S: KvStore> ConfigWatcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Deadline for establishing the store subscription.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capacity of each watcher's queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Watch one item, or every item of `service` when `key` is `None`
    /// or empty.
    ///
    /// Returns once the store subscription is established; changes
    /// committed after that point are delivered.
    pub async fn watch(&self, service: &str, key: Option<&str>) -> ConfigResult<WatchHandle> {
        keyspace::validate_service(service)?;
        let (target, match_prefix) = match key.filter(|k| !k.is_empty()) {
            Some(key) => (keyspace::item_key(service, key), false),
            None => (keyspace::service_prefix(service), true),
        };

        let (state_tx, state_rx) = watch::channel(WatchState::Subscribing);
        let subscribed = tokio::time::timeout(self.timeout, self.store.watch(&target, match_prefix))
            .await
            .map_err(|_| ConfigError::DeadlineExceeded(self.timeout))
            .and_then(|res| res.map_err(ConfigError::from));
        let raw = match subscribed {
            Ok(raw) => raw,
            Err(e) => {
                state_tx.send_replace(WatchState::Failed);
                warn!(%target, error = %e, "watch subscription failed");
                return Err(e);
            }
        };

        state_tx.send_replace(WatchState::Streaming);
        let (events_tx, events_rx) = mpsc::channel(self.queue_capacity);
        tokio::spawn(produce(raw, events_tx, state_tx, target.clone()));
        info!(%target, match_prefix, "watch started");

        Ok(WatchHandle {
            events: events_rx,
            state: state_rx,
            target,
        })
    }
}

/// Pump raw events into the consumer queue until either side goes away.
async fn produce(
    mut raw: WatchStream,
    events: mpsc::Sender<ConfigResult<ChangeEvent>>,
    state: watch::Sender<WatchState>,
    target: String,
) {
    let end = loop {
        tokio::select! {
            _ = events.closed() => break WatchState::Closed,
            next = raw.next() => match next {
                None => break WatchState::Closed,
                Some(Err(e)) => {
                    warn!(%target, error = %e, "watch failed");
                    let _ = events.send(Err(e.into())).await;
                    break WatchState::Failed;
                }
                Some(Ok(event)) => {
                    let Some(change) = ChangeEvent::from_raw(&event) else {
                        continue;
                    };
                    if events.send(Ok(change)).await.is_err() {
                        break WatchState::Closed;
                    }
                }
            },
        }
    };
    // Release the store subscription before reporting the final state.
    drop(raw);
    state.send_replace(end);
    debug!(%target, state = ?end, "watch ended");
}

/// Consumer end of a watch.
///
/// Yields `Ok(ChangeEvent)` in store order; a store failure arrives as a
/// single `Err` followed by the end of the stream. Dropping the handle
/// cancels the watch.
#[derive(Debug)]
pub struct WatchHandle {
    events: mpsc::Receiver<ConfigResult<ChangeEvent>>,
    state: watch::Receiver<WatchState>,
    target: String,
}

impl WatchHandle {
    /// Next change, or `None` once the watch has ended.
    pub async fn next(&mut self) -> Option<ConfigResult<ChangeEvent>> {
        self.events.recv().await
    }

    pub fn state(&self) -> WatchState {
        *self.state.borrow()
    }

    /// A receiver that observes state transitions, usable after the
    /// handle is gone.
    pub fn state_updates(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// The store key or prefix being watched.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Stop watching.
    pub fn cancel(mut self) {
        self.events.close();
    }
}

impl Stream for WatchHandle {
    type Item = ConfigResult<ChangeEvent>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}
