//! Read access to the content tree.

use std::collections::HashSet;

use reindex_storage::Storage;
use reindex_types::{ContentItem, ItemId, ItemKey};

use crate::error::StrategyError;

/// Content repository as seen by the resolver and the rebuild walk.
pub trait Repository: Send + Sync {
    fn get_item(&self, item_id: ItemId) -> Result<Option<ContentItem>, StrategyError>;

    /// Direct children of an item.
    fn children(&self, item_id: ItemId) -> Result<Vec<ContentItem>, StrategyError>;

    /// The item if it still has the key's language and version.
    fn resolve(&self, key: &ItemKey) -> Result<Option<ContentItem>, StrategyError> {
        Ok(self
            .get_item(key.item_id)?
            .filter(|item| item.has_version(&key.language, key.version)))
    }

    /// Whether `candidate` is `ancestor` itself or lies below it.
    fn is_descendant_of(&self, candidate: ItemId, ancestor: ItemId) -> Result<bool, StrategyError> {
        let mut seen = HashSet::new();
        let mut current = Some(candidate);

        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                return Err(StrategyError::Repository(format!(
                    "parent cycle detected at item {}",
                    id
                )));
            }
            current = self.get_item(id)?.and_then(|item| item.parent_id);
        }
        Ok(false)
    }

    /// Version numbers of one language, ascending.
    fn version_numbers(&self, item_id: ItemId, language: &str) -> Result<Vec<u32>, StrategyError> {
        Ok(self
            .get_item(item_id)?
            .and_then(|item| item.versions.get(language).cloned())
            .unwrap_or_default())
    }
}

impl Repository for Storage {
    fn get_item(&self, item_id: ItemId) -> Result<Option<ContentItem>, StrategyError> {
        Ok(Storage::get_item(self, item_id)?)
    }

    fn children(&self, item_id: ItemId) -> Result<Vec<ContentItem>, StrategyError> {
        Ok(self.get_children(item_id)?)
    }
}
