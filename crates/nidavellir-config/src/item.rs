//! The configuration item record.

use serde::{Deserialize, Serialize};

/// Opaque structured value of a configuration item.
///
/// Any JSON document: null, bool, number, string, sequence or mapping.
/// Mapping key order is preserved through a store round-trip.
pub type ConfigValue = serde_json::Value;

/// A single configuration entry owned by one service.
///
/// Field order matches the persisted document layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfigItem {
    pub key: String,
    pub value: ConfigValue,
    pub service_name: String,
    #[serde(default)]
    pub description: String,
    /// Unix timestamp (seconds) of the first write. Never changes.
    pub created_at: i64,
    /// Unix timestamp (seconds) of the latest write.
    pub updated_at: i64,
}
