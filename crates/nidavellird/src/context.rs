//! Application context: everything the daemon wires together at startup.

use anyhow::Context;
use tracing::{error, info};

use nidavellir_api::ApiState;
use nidavellir_config::{Defaults, SeedOutcome, seed_defaults};
use nidavellir_store::RedbStore;

use crate::settings::{Settings, StoreSettings};

pub struct AppContext {
    pub settings: Settings,
    pub store: RedbStore,
    pub api: ApiState,
}

impl AppContext {
    /// Open the store and build the registry and watcher on top of it.
    pub fn open(settings: Settings) -> anyhow::Result<Self> {
        let store = open_store(&settings.store)?;
        let api = ApiState::new(store.clone(), settings.http.request_timeout());
        Ok(Self {
            settings,
            store,
            api,
        })
    }

    /// Seed defaults into an empty store. Failures are logged, never fatal.
    pub async fn seed(&self, defaults: &Defaults) -> SeedOutcome {
        let outcome = seed_defaults(&self.api.registry, defaults).await;
        if let SeedOutcome::Aborted { written, error } = &outcome {
            error!(written, error = %error, "seeding did not complete");
        }
        outcome
    }
}

fn open_store(settings: &StoreSettings) -> anyhow::Result<RedbStore> {
    if settings.in_memory {
        info!("opening in-memory store");
        return RedbStore::open_in_memory_with_buffer(settings.watch_buffer)
            .context("failed to open in-memory store");
    }

    if let Some(dir) = settings.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let store = RedbStore::open(&settings.path, settings.watch_buffer)
        .with_context(|| format!("failed to open store at {}", settings.path.display()))?;
    info!(path = %settings.path.display(), "store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nidavellir_config::{DefaultEntry, ServiceDefaults};
    use serde_json::json;

    fn defaults() -> Defaults {
        Defaults {
            services: vec![ServiceDefaults {
                name: "orders".to_string(),
                entries: vec![DefaultEntry {
                    key: "timeout".to_string(),
                    value: json!("30s"),
                    description: String::new(),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn seeds_on_disk_store_once_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.store.path = dir.path().join("nested/config.redb");

        let ctx = AppContext::open(settings.clone()).unwrap();
        assert!(matches!(ctx.seed(&defaults()).await, SeedOutcome::Seeded { written: 1 }));
        drop(ctx);

        let ctx = AppContext::open(settings).unwrap();
        assert!(matches!(ctx.seed(&defaults()).await, SeedOutcome::AlreadyInitialized));
        let item = ctx.api.registry.get_config("orders", "timeout").await.unwrap();
        assert_eq!(item.unwrap().value, json!("30s"));
    }

    #[tokio::test]
    async fn in_memory_store_starts_empty() {
        let mut settings = Settings::default();
        settings.store.in_memory = true;

        let ctx = AppContext::open(settings).unwrap();
        assert!(ctx.api.registry.is_empty().await.unwrap());
    }
}
