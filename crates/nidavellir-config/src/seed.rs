//! Bootstrap seeding of default configuration.
//!
//! Runs once at startup before any traffic is served. Seeding is fenced
//! on the whole key-space: if any item exists under the root, the store
//! is considered initialized and nothing is written. The fence is a
//! plain read, not a lock; processes starting at the same moment may
//! both seed, and their writes may interleave.

use serde::Deserialize;
use tracing::{error, info};

use nidavellir_store::KvStore;

use crate::error::ConfigError;
use crate::item::ConfigValue;
use crate::registry::ConfigRegistry;

/// Declarative default configuration, usually loaded from `envs.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Defaults {
    #[serde(default, rename = "service")]
    pub services: Vec<ServiceDefaults>,
}

/// Default entries for one service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDefaults {
    pub name: String,
    #[serde(default, rename = "envs")]
    pub entries: Vec<DefaultEntry>,
}

/// A single default item.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultEntry {
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "val")]
    pub value: ConfigValue,
    #[serde(default)]
    pub description: String,
}

impl Defaults {
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// What a seeding run did.
#[derive(Debug)]
pub enum SeedOutcome {
    /// No defaults were declared.
    NothingDeclared,
    /// The key-space already held items; nothing was written.
    AlreadyInitialized,
    /// Every declared entry was written.
    Seeded { written: usize },
    /// A failure stopped the run after `written` entries.
    Aborted { written: usize, error: ConfigError },
}

/// Write `defaults` into an empty key-space.
///
/// Entries with an empty key are skipped. Each entry is written through
/// [`ConfigRegistry::set_config`], so timestamps follow the same rules as
/// any other write. Failures are logged and end the run; they are
/// reported in the outcome rather than returned as an error.
pub async fn seed_defaults<S: KvStore>(
    registry: &ConfigRegistry<S>,
    defaults: &Defaults,
) -> SeedOutcome {
    if defaults.is_empty() {
        return SeedOutcome::NothingDeclared;
    }

    match registry.is_empty().await {
        Ok(true) => {}
        Ok(false) => {
            info!("configuration already initialized, skipping seed");
            return SeedOutcome::AlreadyInitialized;
        }
        Err(e) => {
            error!(error = %e, "failed to inspect key-space before seeding");
            return SeedOutcome::Aborted { written: 0, error: e };
        }
    }

    let mut written = 0;
    for service in &defaults.services {
        for entry in service.entries.iter().filter(|e| !e.key.is_empty()) {
            if let Err(e) = registry
                .set_config(&service.name, &entry.key, entry.value.clone(), &entry.description)
                .await
            {
                error!(
                    service = %service.name,
                    key = %entry.key,
                    error = %e,
                    "seeding aborted"
                );
                return SeedOutcome::Aborted { written, error: e };
            }
            written += 1;
        }
    }

    info!(written, "default configuration seeded");
    SeedOutcome::Seeded { written }
}
