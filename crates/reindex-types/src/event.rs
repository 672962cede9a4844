//! Change events read from the repository's event queue.
//!
//! Events are immutable. Each carries the queue timestamp it was written
//! at and a payload for one of the seven recognised kinds. Unknown kinds
//! cannot be represented and fail to decode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, ItemKey};

/// Discriminant of an [`EventKind`], used to filter queue reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    VersionRemoved,
    ItemSaved,
    ItemDeleted,
    ItemMoved,
    VersionAdded,
    ItemCopied,
    RestoreCompleted,
}

impl EventType {
    /// Every event type the reconciliation engine consumes.
    pub const ALL: [EventType; 7] = [
        EventType::VersionRemoved,
        EventType::ItemSaved,
        EventType::ItemDeleted,
        EventType::ItemMoved,
        EventType::VersionAdded,
        EventType::ItemCopied,
        EventType::RestoreCompleted,
    ];
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::VersionRemoved => "version_removed",
            EventType::ItemSaved => "item_saved",
            EventType::ItemDeleted => "item_deleted",
            EventType::ItemMoved => "item_moved",
            EventType::VersionAdded => "version_added",
            EventType::ItemCopied => "item_copied",
            EventType::RestoreCompleted => "restore_completed",
        };
        f.write_str(name)
    }
}

/// Kind-specific payload of a change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A single version of an item was removed
    VersionRemoved { item: ItemKey },

    /// An item version was saved
    ItemSaved {
        item: ItemKey,
        #[serde(default)]
        shared_field_changed: bool,
        #[serde(default)]
        unversioned_field_changed: bool,
    },

    /// The item and all its versions were deleted
    ItemDeleted {
        item: ItemKey,
        #[serde(default)]
        parent_id: Option<ItemId>,
    },

    /// The item was moved under a new parent
    ItemMoved { item: ItemKey, old_parent_id: ItemId },

    /// A new version was added
    VersionAdded { item: ItemKey },

    /// `item` is the newly created copy
    ItemCopied {
        item: ItemKey,
        #[serde(default)]
        source_id: Option<ItemId>,
        #[serde(default)]
        deep: bool,
    },

    /// The item was restored from the archive or recycle bin
    RestoreCompleted { item: ItemKey },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::VersionRemoved { .. } => EventType::VersionRemoved,
            EventKind::ItemSaved { .. } => EventType::ItemSaved,
            EventKind::ItemDeleted { .. } => EventType::ItemDeleted,
            EventKind::ItemMoved { .. } => EventType::ItemMoved,
            EventKind::VersionAdded { .. } => EventType::VersionAdded,
            EventKind::ItemCopied { .. } => EventType::ItemCopied,
            EventKind::RestoreCompleted { .. } => EventType::RestoreCompleted,
        }
    }

    /// Identity of the item the event is about.
    pub fn item(&self) -> &ItemKey {
        match self {
            EventKind::VersionRemoved { item }
            | EventKind::ItemSaved { item, .. }
            | EventKind::ItemDeleted { item, .. }
            | EventKind::ItemMoved { item, .. }
            | EventKind::VersionAdded { item }
            | EventKind::ItemCopied { item, .. }
            | EventKind::RestoreCompleted { item } => item,
        }
    }
}

/// An event as read back from the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Queue position; strictly increasing in write order
    pub timestamp: i64,

    #[serde(flatten)]
    pub kind: EventKind,
}

impl ChangeEvent {
    pub fn new(timestamp: i64, kind: EventKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ItemKey {
        ItemKey::new(
            "0de95ae4-41ab-4d01-9eb0-67441b7c2450".parse().unwrap(),
            "en",
            1,
        )
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = ChangeEvent::new(
            42,
            EventKind::ItemCopied {
                item: key(),
                source_id: None,
                deep: true,
            },
        );
        let json = String::from_utf8(event.to_bytes().unwrap()).unwrap();
        assert!(json.contains("\"kind\":\"item_copied\""));
        assert!(json.contains("\"timestamp\":42"));
        assert!(json.contains("\"deep\":true"));
    }

    #[test]
    fn test_saved_event_flags_default_to_false() {
        let json = r#"{
            "timestamp": 7,
            "kind": "item_saved",
            "item": {"item_id": "0de95ae4-41ab-4d01-9eb0-67441b7c2450", "language": "en", "version": 1}
        }"#;
        let event = ChangeEvent::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(
            event.kind,
            EventKind::ItemSaved {
                item: key(),
                shared_field_changed: false,
                unversioned_field_changed: false,
            }
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{"timestamp": 1, "kind": "publish_ended", "item": null}"#;
        assert!(ChangeEvent::from_bytes(json.as_bytes()).is_err());
    }

    #[test]
    fn test_event_type_matches_kind() {
        let moved = EventKind::ItemMoved {
            item: key(),
            old_parent_id: ItemId::nil(),
        };
        assert_eq!(moved.event_type(), EventType::ItemMoved);
        assert_eq!(moved.item(), &key());
        assert_eq!(EventType::ALL.len(), 7);
        assert_eq!(EventType::RestoreCompleted.to_string(), "restore_completed");
    }
}
