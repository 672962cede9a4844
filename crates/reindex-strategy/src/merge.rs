//! Collapses change records into a minimal, ordered action set.
//!
//! Records land in one of two buckets. Removals only ever advance the
//! timestamp of an existing entry. Everything else goes through the
//! update bucket, where a record touching every language of an item
//! (shared fields, subtree changes) dominates narrower records, and a
//! record touching every version of one language dominates narrower
//! records of that language.

use tracing::trace;

use reindex_types::{ChangeEvent, ChangeRecord, EventKind};

use crate::bucket::BucketMap;
use crate::extract::{extract, Extracted};

/// Accumulates events and produces the merged record list.
#[derive(Debug, Default)]
pub struct ChangeMerger {
    updates: BucketMap,
    removes: BucketMap,
}

fn dominates_item(record: &ChangeRecord) -> bool {
    record.need_update_children || record.shared_field_changed
}

impl ChangeMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every event of a slice in order.
    pub fn merge_all(events: &[ChangeEvent]) -> Vec<ChangeRecord> {
        let mut merger = Self::new();
        for event in events {
            merger.push(event);
        }
        merger.finish()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    pub fn remove_count(&self) -> usize {
        self.removes.len()
    }

    pub fn updates(&self) -> &BucketMap {
        &self.updates
    }

    pub fn removes(&self) -> &BucketMap {
        &self.removes
    }

    /// Fold one event into the buckets.
    pub fn push(&mut self, event: &ChangeEvent) {
        match extract(event) {
            Extracted::Remove(record) => {
                let whole_item = matches!(event.kind, EventKind::ItemDeleted { .. });
                self.merge_remove(record, whole_item)
            }
            Extracted::AddVersion(record) => self.merge_add_version(record),
            Extracted::Update(record) => self.merge_update(record),
        }
    }

    fn merge_remove(&mut self, record: ChangeRecord, whole_item: bool) {
        // Pending updates for what is now gone would only resolve to a delete.
        if whole_item {
            self.updates.remove_all(record.item_id());
        } else if self
            .updates
            .get(&record.key)
            .is_some_and(|pending| !pending.is_wide())
        {
            self.updates.remove(&record.key);
        }

        match self.removes.get_mut(&record.key) {
            Some(existing) => existing.touch(record.timestamp),
            None => self.removes.insert(record),
        }
    }

    // Exact key only. An item-wide record may name a version that no
    // longer resolves, so it cannot stand in for the added one.
    fn merge_add_version(&mut self, record: ChangeRecord) {
        match self.updates.get_mut(&record.key) {
            Some(existing) => {
                existing.version_added |= record.version_added;
                existing.need_update_previous_version |= record.need_update_previous_version;
                existing.touch(record.timestamp);
            }
            None => self.updates.insert(record),
        }
    }

    fn merge_update(&mut self, record: ChangeRecord) {
        let item_id = record.item_id();

        if self.updates.contains_any(item_id, dominates_item) {
            if let Some(existing) = self.updates.first_mut(item_id) {
                trace!(key = %existing.key, "Absorbed into item-wide record");
                existing.timestamp = record.timestamp;
                existing.need_update_children |= record.need_update_children;
                if existing.old_parent_id.is_none() {
                    existing.old_parent_id = record.old_parent_id;
                }
            }
            return;
        }

        if dominates_item(&record) {
            self.updates.remove_all(item_id);
            self.updates.insert(record);
            return;
        }

        let language = record.key.language.clone();
        let same_language_wide =
            |r: &ChangeRecord| r.key.language == language && r.unversioned_field_changed;
        if let Some(existing) = self.updates.first_where_mut(item_id, same_language_wide) {
            existing.touch(record.timestamp);
            return;
        }

        if record.unversioned_field_changed {
            self.updates.remove_all(item_id);
            self.updates.insert(record);
            return;
        }

        match self.updates.get_mut(&record.key) {
            Some(existing) => existing.touch(record.timestamp),
            None => self.updates.insert(record),
        }
    }

    /// Updates then removals, stably sorted by ascending timestamp.
    pub fn finish(self) -> Vec<ChangeRecord> {
        let mut merged = self.updates.into_values();
        merged.extend(self.removes.into_values());
        merged.sort_by_key(|r| r.timestamp);
        merged
    }
}
