//! Applies resolved actions to a search index.

use std::collections::HashSet;

use tracing::{debug, trace};

use reindex_types::{ChangeRecord, ContentItem, IndexDocument, ItemKey};

use crate::error::StrategyError;
use crate::index::SearchIndex;
use crate::repository::Repository;
use crate::resolve::{IndexAction, UpdateResolver, UpdateScope};

/// Result of applying a batch of change records.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    /// Records that produced at least one action
    pub applied: usize,
    /// Records that resolved to nothing
    pub skipped: usize,
    pub documents_written: usize,
    pub documents_removed: usize,
    /// The highest record timestamp seen
    pub last_timestamp: Option<i64>,
}

impl UpdateResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&mut self) {
        self.applied += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn observe_timestamp(&mut self, timestamp: i64) {
        if self.last_timestamp.is_none_or(|ts| timestamp > ts) {
            self.last_timestamp = Some(timestamp);
        }
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: &UpdateResult) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.documents_written += other.documents_written;
        self.documents_removed += other.documents_removed;
        if let Some(ts) = other.last_timestamp {
            self.observe_timestamp(ts);
        }
    }

    pub fn has_updates(&self) -> bool {
        self.applied > 0
    }

    pub fn total(&self) -> usize {
        self.applied + self.skipped
    }
}

/// Document counts of a single action.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ActionEffect {
    pub written: usize,
    pub removed: usize,
}

/// Writes index documents from the current repository state.
pub struct IndexUpdater<'a> {
    repository: &'a dyn Repository,
    index: &'a dyn SearchIndex,
}

impl<'a> IndexUpdater<'a> {
    pub fn new(repository: &'a dyn Repository, index: &'a dyn SearchIndex) -> Self {
        Self { repository, index }
    }

    /// Resolve and apply every record in order.
    ///
    /// Stops at the first failure; the caller must not advance the
    /// checkpoint past records of a failed batch.
    pub fn apply_records(&self, records: &[ChangeRecord]) -> Result<UpdateResult, StrategyError> {
        let mut resolver = UpdateResolver::new(self.repository, self.index.root());
        let mut result = UpdateResult::new();

        for record in records {
            result.observe_timestamp(record.timestamp);

            let actions = resolver.resolve(record)?;
            if actions.is_empty() {
                result.record_skip();
                continue;
            }

            for action in &actions {
                trace!(index = %self.index.name(), action = %action, "Applying action");
                let effect = self.apply(action)?;
                result.documents_written += effect.written;
                result.documents_removed += effect.removed;
            }
            result.record_applied();
        }

        debug!(
            index = %self.index.name(),
            applied = result.applied,
            skipped = result.skipped,
            written = result.documents_written,
            removed = result.documents_removed,
            "Applied change records"
        );
        Ok(result)
    }

    pub fn apply(&self, action: &IndexAction) -> Result<ActionEffect, StrategyError> {
        let mut effect = ActionEffect::default();

        match action {
            IndexAction::Delete(key) => {
                if self.index.delete_document(key)? {
                    effect.removed = 1;
                }
            }
            IndexAction::DeleteGroup(item_id) => {
                effect.removed = self.index.delete_item(*item_id)?;
            }
            IndexAction::MarkNotLatest(key) => {
                if self.index.mark_not_latest(key)? {
                    effect.written = 1;
                }
            }
            IndexAction::Update { key, scope } => {
                if let Some(item) = self.repository.get_item(key.item_id)? {
                    for doc_key in scoped_keys(&item, key, *scope) {
                        self.write(&item, &doc_key)?;
                        effect.written += 1;
                    }
                }
            }
            IndexAction::UpdateRecursive(key) => {
                effect = self.update_subtree(key)?;
            }
        }

        Ok(effect)
    }

    /// Rewrite every document of the item and all its descendants.
    fn update_subtree(&self, key: &ItemKey) -> Result<ActionEffect, StrategyError> {
        let mut effect = ActionEffect::default();

        let Some(top) = self.repository.get_item(key.item_id)? else {
            return Ok(effect);
        };
        if !self.repository.is_descendant_of(top.id, self.index.root())? {
            debug!(key = %key, "Subtree outside the indexed root, skipping");
            return Ok(effect);
        }

        let mut visited = HashSet::new();
        let mut stack = vec![top];
        while let Some(item) = stack.pop() {
            if !visited.insert(item.id) {
                continue;
            }
            effect.removed += self.index.delete_item(item.id)?;
            for doc_key in item.keys() {
                self.write(&item, &doc_key)?;
                effect.written += 1;
            }
            stack.extend(self.repository.children(item.id)?);
        }

        Ok(effect)
    }

    fn write(&self, item: &ContentItem, key: &ItemKey) -> Result<(), StrategyError> {
        self.index.put_document(&IndexDocument::from_item(item, key))
    }
}

fn scoped_keys(item: &ContentItem, key: &ItemKey, scope: UpdateScope) -> Vec<ItemKey> {
    match scope {
        UpdateScope::Version => {
            if item.has_version(&key.language, key.version) {
                vec![key.clone()]
            } else {
                Vec::new()
            }
        }
        UpdateScope::AllVersions => item
            .versions
            .get(&key.language)
            .map(|versions| versions.iter().map(|v| key.with_version(*v)).collect())
            .unwrap_or_default(),
        UpdateScope::AllLanguages => item.keys(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StoredIndex;
    use reindex_storage::Storage;
    use reindex_types::ItemId;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        storage: Arc<Storage>,
        index: StoredIndex,
        root: ContentItem,
        _temp: TempDir,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let root = ContentItem::new(ItemId::new(), None, "home").with_language("en", vec![1]);
        storage.put_item(&root).unwrap();
        let index = StoredIndex::open(storage.clone(), "web_index", root.id).unwrap();
        Fixture {
            storage,
            index,
            root,
            _temp: temp,
        }
    }

    #[test]
    fn test_update_result_merge() {
        let mut a = UpdateResult {
            applied: 2,
            skipped: 1,
            documents_written: 4,
            documents_removed: 0,
            last_timestamp: Some(10),
        };
        let b = UpdateResult {
            applied: 1,
            skipped: 0,
            documents_written: 1,
            documents_removed: 2,
            last_timestamp: Some(15),
        };
        a.merge(&b);

        assert_eq!(a.total(), 4);
        assert_eq!(a.documents_removed, 2);
        assert_eq!(a.last_timestamp, Some(15));
        assert!(a.has_updates());
        assert!(!UpdateResult::new().has_updates());
    }

    #[test]
    fn test_update_scopes() {
        let f = fixture();
        let page = ContentItem::new(ItemId::new(), Some(f.root.id), "page")
            .with_language("en", vec![1, 2])
            .with_language("de", vec![1]);
        f.storage.put_item(&page).unwrap();
        let updater = IndexUpdater::new(f.storage.as_ref(), &f.index);
        let key = ItemKey::new(page.id, "en", 2);

        let one = updater
            .apply(&IndexAction::Update {
                key: key.clone(),
                scope: UpdateScope::Version,
            })
            .unwrap();
        assert_eq!(one.written, 1);

        let lang = updater
            .apply(&IndexAction::Update {
                key: key.clone(),
                scope: UpdateScope::AllVersions,
            })
            .unwrap();
        assert_eq!(lang.written, 2);

        let all = updater
            .apply(&IndexAction::Update {
                key,
                scope: UpdateScope::AllLanguages,
            })
            .unwrap();
        assert_eq!(all.written, 3);
        assert_eq!(f.index.documents().unwrap().len(), 3);
    }

    #[test]
    fn test_recursive_update_and_group_delete() {
        let f = fixture();
        let folder =
            ContentItem::new(ItemId::new(), Some(f.root.id), "folder").with_language("en", vec![1]);
        let leaf =
            ContentItem::new(ItemId::new(), Some(folder.id), "leaf").with_language("en", vec![1, 2]);
        f.storage.put_item(&folder).unwrap();
        f.storage.put_item(&leaf).unwrap();

        let updater = IndexUpdater::new(f.storage.as_ref(), &f.index);
        let effect = updater
            .apply(&IndexAction::UpdateRecursive(ItemKey::new(folder.id, "en", 1)))
            .unwrap();
        assert_eq!(effect.written, 3);

        let leaf_v1 = f.index.get_document(&ItemKey::new(leaf.id, "en", 1)).unwrap().unwrap();
        assert!(!leaf_v1.is_latest_version);

        let removed = updater.apply(&IndexAction::DeleteGroup(leaf.id)).unwrap();
        assert_eq!(removed.removed, 2);
        assert_eq!(f.index.documents().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_records_tracks_last_timestamp() {
        let f = fixture();
        let page =
            ContentItem::new(ItemId::new(), Some(f.root.id), "page").with_language("en", vec![1]);
        f.storage.put_item(&page).unwrap();

        let records = vec![
            ChangeRecord::new(ItemKey::new(page.id, "en", 1), 4),
            ChangeRecord::new(ItemKey::new(page.id, "en", 1), 9),
        ];
        let result = IndexUpdater::new(f.storage.as_ref(), &f.index)
            .apply_records(&records)
            .unwrap();

        assert_eq!(result.applied, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.last_timestamp, Some(9));
    }
}
