//! Key-space codec.
//!
//! Maps `(service, key)` identities onto store keys and items onto
//! stored bytes. The layout is the only bit-exact contract with other
//! users of the store:
//!
//! ```text
//! /config/{service}/{key}  ->  {"key":..,"value":..,"service_name":..,
//!                               "description":..,"created_at":..,"updated_at":..}
//! ```
//!
//! Service names are a single path segment, so the service prefix
//! `/config/{service}/` never matches a longer name like `{service}2`.

use crate::error::{ConfigError, ConfigResult};
use crate::item::ConfigItem;

/// Root of the configuration key-space.
pub const ROOT_PREFIX: &str = "/config/";

/// Store key for a single item.
pub fn item_key(service: &str, key: &str) -> String {
    format!("{ROOT_PREFIX}{service}/{key}")
}

/// Prefix covering every item of one service.
pub fn service_prefix(service: &str) -> String {
    format!("{ROOT_PREFIX}{service}/")
}

/// Serialize an item to its stored form.
pub fn encode(item: &ConfigItem) -> ConfigResult<Vec<u8>> {
    serde_json::to_vec(item).map_err(|e| ConfigError::Serialize(e.to_string()))
}

/// Parse stored bytes found at `store_key`.
pub fn decode(store_key: &str, bytes: &[u8]) -> ConfigResult<ConfigItem> {
    serde_json::from_slice(bytes).map_err(|e| ConfigError::MalformedItem {
        key: store_key.to_string(),
        reason: e.to_string(),
    })
}

/// First path segment below the root, i.e. the owning service.
pub fn service_name(store_key: &str) -> Option<&str> {
    let relative = store_key.strip_prefix(ROOT_PREFIX)?;
    let service = relative.split('/').next()?;
    (!service.is_empty()).then_some(service)
}

/// Split a full item key into `(service, key)`.
pub fn parse_item_key(store_key: &str) -> Option<(&str, &str)> {
    let relative = store_key.strip_prefix(ROOT_PREFIX)?;
    let (service, key) = relative.split_once('/')?;
    (!service.is_empty() && !key.is_empty()).then_some((service, key))
}

/// Reject service names that cannot form a single key segment.
pub fn validate_service(service: &str) -> ConfigResult<()> {
    if service.is_empty() {
        return Err(ConfigError::invalid("service name is required"));
    }
    if service.contains('/') {
        return Err(ConfigError::invalid(format!(
            "service name must not contain '/': {service}"
        )));
    }
    Ok(())
}

/// Reject empty item keys.
pub fn validate_key(key: &str) -> ConfigResult<()> {
    if key.is_empty() {
        return Err(ConfigError::invalid("key is required"));
    }
    Ok(())
}
