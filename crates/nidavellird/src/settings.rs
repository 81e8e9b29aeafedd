//! Daemon settings and the defaults seed file.
//!
//! Both files are TOML. A missing file is not an error: settings fall
//! back to built-in defaults and the seed input is empty.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use nidavellir_config::Defaults;
use nidavellir_store::DEFAULT_WATCH_BUFFER;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub store: StoreSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    pub enable: bool,
    /// Deadline for each store-facing operation.
    pub request_timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable: true,
            request_timeout_secs: 5,
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
    /// Keep everything in memory; nothing survives a restart.
    pub in_memory: bool,
    /// Events buffered per watcher before it is cut off as lagging.
    pub watch_buffer: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/nidavellir/config.redb"),
            in_memory: false,
            watch_buffer: DEFAULT_WATCH_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl Settings {
    /// Read settings from `path`, or defaults if it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match read_optional(path)? {
            Some(text) => toml::from_str(&text)
                .with_context(|| format!("invalid settings file {}", path.display())),
            None => Ok(Self::default()),
        }
    }
}

/// Read the seed file at `path`, or an empty set if it does not exist.
pub fn load_defaults(path: &Path) -> anyhow::Result<Defaults> {
    match read_optional(path)? {
        Some(text) => toml::from_str(&text)
            .with_context(|| format!("invalid defaults file {}", path.display())),
        None => Ok(Defaults::default()),
    }
}

fn read_optional(path: &Path) -> anyhow::Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}
