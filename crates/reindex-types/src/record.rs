//! Change records: normalized reindex intents produced from queue events.

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, ItemKey};

/// One candidate reindex action for an (item, language, version).
///
/// Created from a single event, then mutated in place while merging:
/// the timestamp moves forward and flags are OR-ed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub key: ItemKey,

    /// Queue timestamp of the latest event folded into this record
    pub timestamp: i64,

    /// A field shared across all languages and versions changed
    #[serde(default)]
    pub shared_field_changed: bool,

    /// A field shared across the versions of one language changed
    #[serde(default)]
    pub unversioned_field_changed: bool,

    #[serde(default)]
    pub version_added: bool,

    /// The whole subtree under the item must be reindexed
    #[serde(default)]
    pub need_update_children: bool,

    /// The version before `key.version` must lose its latest-version marker
    #[serde(default)]
    pub need_update_previous_version: bool,

    /// Previous parent, set for moves only
    #[serde(default)]
    pub old_parent_id: Option<ItemId>,
}

impl ChangeRecord {
    pub fn new(key: ItemKey, timestamp: i64) -> Self {
        Self {
            key,
            timestamp,
            shared_field_changed: false,
            unversioned_field_changed: false,
            version_added: false,
            need_update_children: false,
            need_update_previous_version: false,
            old_parent_id: None,
        }
    }

    pub fn item_id(&self) -> ItemId {
        self.key.item_id
    }

    /// Whether the record affects more than its own version.
    pub fn is_wide(&self) -> bool {
        self.shared_field_changed || self.unversioned_field_changed || self.need_update_children
    }

    /// Advance the timestamp; never moves it backwards.
    pub fn touch(&mut self, timestamp: i64) {
        if timestamp > self.timestamp {
            self.timestamp = timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_is_monotonic() {
        let mut record = ChangeRecord::new(ItemKey::new(ItemId::new(), "en", 1), 20);
        record.touch(10);
        assert_eq!(record.timestamp, 20);
        record.touch(30);
        assert_eq!(record.timestamp, 30);
    }

    #[test]
    fn test_is_wide() {
        let mut record = ChangeRecord::new(ItemKey::new(ItemId::new(), "en", 1), 1);
        assert!(!record.is_wide());
        record.version_added = true;
        assert!(!record.is_wide());
        record.unversioned_field_changed = true;
        assert!(record.is_wide());
    }
}
