//! redb table definitions for the key-value store.
//!
//! The store is a flat namespace: one `&str -> &[u8]` table holds every
//! key, and a small metadata table tracks the global revision.

use redb::TableDefinition;

/// All user keys and their raw value bytes.
pub const KV: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

/// Store metadata keyed by name.
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Key in [`META`] holding the revision of the last committed mutation.
pub const REVISION_KEY: &str = "revision";
