//! Change events emitted by store watches.

use std::pin::Pin;

use futures_core::Stream;

use crate::error::StoreResult;

/// Kind of mutation a watch event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// A single raw change observed on the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    /// Full store key that changed.
    pub key: String,
    /// New value bytes. Always `None` for deletes.
    pub value: Option<Vec<u8>>,
    /// Value held before this mutation, if the key existed.
    pub prev_value: Option<Vec<u8>>,
    /// Store revision at which the mutation was committed.
    pub revision: u64,
}

impl WatchEvent {
    /// True if this put created the key rather than overwriting it.
    pub fn is_create(&self) -> bool {
        self.kind == EventKind::Put && self.prev_value.is_none()
    }
}

/// A type-erased, fallible stream of watch events.
///
/// The stream ends (`None`) when the store connection goes away and
/// yields at most one `Err` before ending.
pub type WatchStream = Pin<Box<dyn Stream<Item = StoreResult<WatchEvent>> + Send>>;

/// Key selector for a watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KeyFilter {
    pub key: String,
    pub match_prefix: bool,
}

impl KeyFilter {
    pub fn matches(&self, candidate: &str) -> bool {
        if self.match_prefix {
            candidate.starts_with(&self.key)
        } else {
            candidate == self.key
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_filter_matches_only_the_key() {
        let filter = KeyFilter {
            key: "/config/a/b".to_string(),
            match_prefix: false,
        };
        assert!(filter.matches("/config/a/b"));
        assert!(!filter.matches("/config/a/bc"));
    }

    #[test]
    fn prefix_filter_matches_descendants() {
        let filter = KeyFilter {
            key: "/config/a/".to_string(),
            match_prefix: true,
        };
        assert!(filter.matches("/config/a/b"));
        assert!(!filter.matches("/config/ab/c"));
    }
}
