//! Maps queue events to change records.

use reindex_types::{ChangeEvent, ChangeRecord, EventKind};

/// How a record produced from an event is merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Removal of an item or one of its versions
    Remove(ChangeRecord),
    /// A version was added
    AddVersion(ChangeRecord),
    /// Anything that changes indexed content in place
    Update(ChangeRecord),
}

impl Extracted {
    pub fn record(&self) -> &ChangeRecord {
        match self {
            Extracted::Remove(r) | Extracted::AddVersion(r) | Extracted::Update(r) => r,
        }
    }
}

/// Build the change record for one event.
pub fn extract(event: &ChangeEvent) -> Extracted {
    let mut record = ChangeRecord::new(event.kind.item().clone(), event.timestamp);

    match &event.kind {
        EventKind::VersionRemoved { .. } | EventKind::ItemDeleted { .. } => {
            Extracted::Remove(record)
        }
        EventKind::VersionAdded { .. } => {
            record.version_added = true;
            record.need_update_previous_version = true;
            Extracted::AddVersion(record)
        }
        EventKind::ItemSaved {
            shared_field_changed,
            unversioned_field_changed,
            ..
        } => {
            record.shared_field_changed = *shared_field_changed;
            record.unversioned_field_changed = *unversioned_field_changed;
            Extracted::Update(record)
        }
        EventKind::RestoreCompleted { .. } => {
            record.shared_field_changed = true;
            Extracted::Update(record)
        }
        EventKind::ItemCopied { deep, .. } => {
            record.shared_field_changed = true;
            record.need_update_children = *deep;
            Extracted::Update(record)
        }
        EventKind::ItemMoved { old_parent_id, .. } => {
            record.need_update_children = true;
            record.old_parent_id = Some(*old_parent_id);
            Extracted::Update(record)
        }
    }
}
