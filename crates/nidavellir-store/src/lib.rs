//! nidavellir-store: store adapter for the Nidavellir configuration store.
//!
//! Defines the [`KvStore`] contract the configuration layer is written
//! against (get/put/delete, prefix scan, prefix delete and revision-ordered
//! watches) and ships [`RedbStore`], an implementation backed by
//! [redb](https://docs.rs/redb) that runs on disk or in memory.
//!
//! # Architecture
//!
//! Keys are UTF-8 strings in one flat, sorted table, so prefix scans are
//! range reads. Every committed mutation carries a monotonically increasing
//! revision and is fanned out to watchers through a broadcast channel.
//!
//! `RedbStore` is `Clone` + `Send` + `Sync` (backed by `Arc`) and can be
//! shared across async tasks.

pub mod error;
pub mod kv;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use kv::KvStore;
pub use store::{DEFAULT_WATCH_BUFFER, RedbStore};
pub use types::{EventKind, WatchEvent, WatchStream};
