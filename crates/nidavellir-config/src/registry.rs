//! Typed CRUD over the configuration key-space.
//!
//! The registry holds no cache and no mutable state; every call goes
//! straight to the store and is bounded by the registry's timeout.
//!
//! `set_config` reads the existing item to carry its `created_at`
//! forward, then writes. The read and the write are not one transaction:
//! concurrent writers to the same identity race and the last write wins
//! with whatever `created_at` it observed.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use nidavellir_store::KvStore;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{ConfigError, ConfigResult};
use crate::item::{ConfigItem, ConfigValue};
use crate::keyspace;

/// Time budget applied to each operation unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration registry over a [`KvStore`].
///
/// Cheap to clone; clones share the store handle and clock.
#[derive(Clone)]
pub struct ConfigRegistry<S> {
    store: S,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl<S: KvStore> ConfigRegistry<S> {
    /// Create a registry using the system clock and the default timeout.
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the per-operation deadline.
    ///
    /// Applies to every call made through this registry. For a different
    /// budget on a single call, use a clone:
    /// `registry.clone().with_timeout(budget).get_config(..)`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the time source used for item timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `op`, failing with `DeadlineExceeded` if it outlives the timeout.
    async fn bounded<T>(&self, op: impl Future<Output = ConfigResult<T>>) -> ConfigResult<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| ConfigError::DeadlineExceeded(self.timeout))?
    }

    /// Create or update an item.
    ///
    /// `created_at` is carried over from an existing item at the same
    /// identity; `updated_at` is always the current time.
    pub async fn set_config(
        &self,
        service: &str,
        key: &str,
        value: ConfigValue,
        description: &str,
    ) -> ConfigResult<()> {
        keyspace::validate_service(service)?;
        keyspace::validate_key(key)?;
        let store_key = keyspace::item_key(service, key);

        self.bounded(async {
            let now = self.clock.now();
            let created_at = match self.store.get(&store_key).await? {
                Some(bytes) => match keyspace::decode(&store_key, &bytes) {
                    Ok(existing) => existing.created_at,
                    Err(e) => {
                        warn!(key = %store_key, error = %e, "overwriting undecodable item");
                        now
                    }
                },
                None => now,
            };

            let item = ConfigItem {
                key: key.to_string(),
                value,
                service_name: service.to_string(),
                description: description.to_string(),
                created_at,
                updated_at: now,
            };
            self.store.put(&store_key, keyspace::encode(&item)?).await?;
            Ok(())
        })
        .await?;

        info!(%service, %key, "config set");
        Ok(())
    }

    /// Fetch one item. `Ok(None)` means it does not exist.
    pub async fn get_config(&self, service: &str, key: &str) -> ConfigResult<Option<ConfigItem>> {
        keyspace::validate_service(service)?;
        keyspace::validate_key(key)?;
        let store_key = keyspace::item_key(service, key);

        self.bounded(async {
            match self.store.get(&store_key).await? {
                Some(bytes) => Ok(Some(keyspace::decode(&store_key, &bytes)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Fetch every item of a service, keyed by item key.
    ///
    /// Entries that fail to decode are logged and left out.
    pub async fn get_service_configs(
        &self,
        service: &str,
    ) -> ConfigResult<BTreeMap<String, ConfigItem>> {
        keyspace::validate_service(service)?;
        let prefix = keyspace::service_prefix(service);

        let raw = self
            .bounded(async { Ok(self.store.get_prefix(&prefix).await?) })
            .await?;

        let mut items = BTreeMap::new();
        for (store_key, bytes) in raw {
            let Some(key) = store_key.strip_prefix(&prefix) else {
                continue;
            };
            match keyspace::decode(&store_key, &bytes) {
                Ok(item) => {
                    items.insert(key.to_string(), item);
                }
                Err(e) => {
                    warn!(key = %store_key, error = %e, "skipping undecodable item");
                }
            }
        }
        debug!(%service, count = items.len(), "service configs loaded");
        Ok(items)
    }

    /// Delete one item. Deleting an absent item succeeds.
    pub async fn delete_config(&self, service: &str, key: &str) -> ConfigResult<()> {
        keyspace::validate_service(service)?;
        keyspace::validate_key(key)?;
        let store_key = keyspace::item_key(service, key);

        let existed = self
            .bounded(async { Ok(self.store.delete(&store_key).await?) })
            .await?;

        info!(%service, %key, existed, "config deleted");
        Ok(())
    }

    /// Delete every item of a service. Returns how many were removed.
    pub async fn delete_service_configs(&self, service: &str) -> ConfigResult<u64> {
        keyspace::validate_service(service)?;
        let prefix = keyspace::service_prefix(service);

        let removed = self
            .bounded(async { Ok(self.store.delete_prefix(&prefix).await?) })
            .await?;

        info!(%service, removed, "service configs deleted");
        Ok(removed)
    }

    /// Names of every service owning at least one key.
    ///
    /// Scans the whole key-space; cost grows with the total item count.
    pub async fn list_services(&self) -> ConfigResult<BTreeSet<String>> {
        let raw = self
            .bounded(async { Ok(self.store.get_prefix(keyspace::ROOT_PREFIX).await?) })
            .await?;

        Ok(raw
            .keys()
            .filter_map(|store_key| keyspace::service_name(store_key))
            .map(str::to_string)
            .collect())
    }

    /// True if nothing at all is stored under the key-space root.
    pub async fn is_empty(&self) -> ConfigResult<bool> {
        let raw = self
            .bounded(async { Ok(self.store.get_prefix(keyspace::ROOT_PREFIX).await?) })
            .await?;
        Ok(raw.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{FailingStore, StalledStore};
    use nidavellir_store::RedbStore;
    use serde_json::json;

    fn registry_at(now: i64) -> (ConfigRegistry<RedbStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = RedbStore::open_in_memory().unwrap();
        let registry = ConfigRegistry::new(store).with_clock(clock.clone());
        (registry, clock)
    }

    // ── Set / Get ──────────────────────────────────────────────────

    #[tokio::test]
    async fn first_write_sets_both_timestamps() {
        let (registry, _) = registry_at(1000);
        registry
            .set_config("orders", "timeout", json!("30s"), "request timeout")
            .await
            .unwrap();

        let item = registry.get_config("orders", "timeout").await.unwrap().unwrap();
        assert_eq!(
            item,
            ConfigItem {
                key: "timeout".to_string(),
                value: json!("30s"),
                service_name: "orders".to_string(),
                description: "request timeout".to_string(),
                created_at: 1000,
                updated_at: 1000,
            }
        );
    }

    #[tokio::test]
    async fn rewrite_preserves_created_at() {
        let (registry, clock) = registry_at(1000);
        registry
            .set_config("orders", "timeout", json!("30s"), "request timeout")
            .await
            .unwrap();

        clock.advance(10);
        registry
            .set_config("orders", "timeout", json!("45s"), "")
            .await
            .unwrap();

        let item = registry.get_config("orders", "timeout").await.unwrap().unwrap();
        assert_eq!(item.created_at, 1000);
        assert_eq!(item.updated_at, 1010);
        assert_eq!(item.value, json!("45s"));
        assert_eq!(item.description, "");
    }

    #[tokio::test]
    async fn delete_then_write_gets_fresh_created_at() {
        let (registry, clock) = registry_at(1000);
        registry.set_config("s", "k", json!(1), "").await.unwrap();
        registry.delete_config("s", "k").await.unwrap();

        clock.advance(50);
        registry.set_config("s", "k", json!(2), "").await.unwrap();

        let item = registry.get_config("s", "k").await.unwrap().unwrap();
        assert_eq!(item.created_at, 1050);
    }

    #[tokio::test]
    async fn structured_values_round_trip() {
        let (registry, _) = registry_at(1);
        let value = json!({"hosts": ["a", "b"], "retries": 3, "tls": {"enabled": true}});
        registry.set_config("db", "pool", value.clone(), "").await.unwrap();

        let item = registry.get_config("db", "pool").await.unwrap().unwrap();
        assert_eq!(item.value, value);
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let (registry, _) = registry_at(1);
        assert!(registry.get_config("orders", "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_malformed_is_an_error() {
        let (registry, _) = registry_at(1);
        registry
            .store()
            .put("/config/orders/broken", b"{oops".to_vec())
            .await
            .unwrap();

        let err = registry.get_config("orders", "broken").await.unwrap_err();
        assert!(matches!(err, ConfigError::MalformedItem { .. }));
    }

    #[tokio::test]
    async fn set_over_malformed_item_repairs_it() {
        let (registry, _) = registry_at(77);
        registry
            .store()
            .put("/config/orders/broken", b"{oops".to_vec())
            .await
            .unwrap();

        registry.set_config("orders", "broken", json!(true), "").await.unwrap();
        let item = registry.get_config("orders", "broken").await.unwrap().unwrap();
        assert_eq!(item.created_at, 77);
    }

    #[tokio::test]
    async fn identity_is_validated() {
        let (registry, _) = registry_at(1);
        for (service, key) in [("", "k"), ("s", ""), ("a/b", "k")] {
            let err = registry.set_config(service, key, json!(1), "").await.unwrap_err();
            assert!(matches!(err, ConfigError::InvalidArgument(_)), "{service:?}/{key:?}");
        }
        assert!(matches!(
            registry.get_service_configs("").await.unwrap_err(),
            ConfigError::InvalidArgument(_)
        ));
    }

    // ── Service scope ──────────────────────────────────────────────

    #[tokio::test]
    async fn service_configs_respect_segment_boundary() {
        let (registry, _) = registry_at(1);
        registry.set_config("svcA", "one", json!(1), "").await.unwrap();
        registry.set_config("svcA", "two", json!(2), "").await.unwrap();
        registry.set_config("svcA2", "one", json!(3), "").await.unwrap();

        let items = registry.get_service_configs("svcA").await.unwrap();
        assert_eq!(items.keys().collect::<Vec<_>>(), vec!["one", "two"]);
        assert!(items.values().all(|item| item.service_name == "svcA"));
    }

    #[tokio::test]
    async fn service_configs_skip_malformed_entries() {
        let (registry, _) = registry_at(1);
        registry.set_config("svc", "good", json!("ok"), "").await.unwrap();
        registry
            .store()
            .put("/config/svc/bad", b"\xff\xfe".to_vec())
            .await
            .unwrap();

        let items = registry.get_service_configs("svc").await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items.contains_key("good"));
    }

    #[tokio::test]
    async fn delete_absent_is_ok() {
        let (registry, _) = registry_at(1);
        registry.delete_config("orders", "ghost").await.unwrap();
        assert!(registry.get_config("orders", "ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_service_configs_is_scoped() {
        let (registry, _) = registry_at(1);
        registry.set_config("svcA", "a", json!(1), "").await.unwrap();
        registry.set_config("svcA", "b", json!(1), "").await.unwrap();
        registry.set_config("svcA2", "a", json!(1), "").await.unwrap();

        assert_eq!(registry.delete_service_configs("svcA").await.unwrap(), 2);
        assert!(registry.get_service_configs("svcA").await.unwrap().is_empty());
        assert_eq!(registry.get_service_configs("svcA2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_services_deduplicates() {
        let (registry, _) = registry_at(1);
        assert!(registry.list_services().await.unwrap().is_empty());
        assert!(registry.is_empty().await.unwrap());

        for key in ["a", "b", "c"] {
            registry.set_config("orders", key, json!(1), "").await.unwrap();
        }
        registry.set_config("billing", "x", json!(1), "").await.unwrap();

        let services = registry.list_services().await.unwrap();
        assert_eq!(
            services.into_iter().collect::<Vec<_>>(),
            vec!["billing".to_string(), "orders".to_string()]
        );
        assert!(!registry.is_empty().await.unwrap());
    }

    // ── Failure modes ──────────────────────────────────────────────

    #[tokio::test]
    async fn store_failure_surfaces_as_unavailable() {
        let registry = ConfigRegistry::new(FailingStore);
        let err = registry.set_config("s", "k", json!(1), "").await.unwrap_err();
        assert!(matches!(err, ConfigError::StoreUnavailable(_)));

        let err = registry.get_service_configs("s").await.unwrap_err();
        assert!(matches!(err, ConfigError::StoreUnavailable(_)));

        let err = registry.list_services().await.unwrap_err();
        assert!(matches!(err, ConfigError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn stalled_store_hits_deadline() {
        let registry =
            ConfigRegistry::new(StalledStore).with_timeout(Duration::from_millis(20));

        let err = registry.get_config("s", "k").await.unwrap_err();
        assert!(matches!(err, ConfigError::DeadlineExceeded(d) if d == Duration::from_millis(20)));

        let err = registry.delete_config("s", "k").await.unwrap_err();
        assert!(matches!(err, ConfigError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn clone_carries_its_own_deadline() {
        let registry = ConfigRegistry::new(StalledStore);
        let tight = registry.clone().with_timeout(Duration::from_millis(10));

        let err = tight.list_services().await.unwrap_err();
        assert!(matches!(err, ConfigError::DeadlineExceeded(d) if d == Duration::from_millis(10)));

        // The original keeps the default budget.
        let still_waiting =
            tokio::time::timeout(Duration::from_millis(50), registry.list_services()).await;
        assert!(still_waiting.is_err());
    }
}
