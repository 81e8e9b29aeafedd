//! nidavellir-config: configuration items over a [`KvStore`].
//!
//! Every item belongs to a service and lives at one well-known store key:
//!
//! ```text
//! /config/{service}/{key}
//! ```
//!
//! - [`ConfigRegistry`] reads and writes items and keeps their timestamps.
//! - [`seed_defaults`] fills an empty key-space from declared defaults.
//! - [`ConfigWatcher`] turns store watches into typed [`ChangeEvent`]s.
//!
//! [`KvStore`]: nidavellir_store::KvStore

pub mod clock;
pub mod error;
pub mod item;
pub mod keyspace;
pub mod registry;
pub mod seed;
pub mod watch;

#[cfg(test)]
mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, ConfigResult};
pub use item::{ConfigItem, ConfigValue};
pub use registry::{ConfigRegistry, DEFAULT_TIMEOUT};
pub use seed::{DefaultEntry, Defaults, SeedOutcome, ServiceDefaults, seed_defaults};
pub use watch::{
    ChangeEvent, ChangeKind, ConfigWatcher, DEFAULT_QUEUE_CAPACITY, WatchHandle, WatchState,
};
