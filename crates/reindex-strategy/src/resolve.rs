//! Turns merged change records into concrete index actions.

use std::collections::HashSet;
use std::fmt;

use tracing::debug;

use reindex_types::{ChangeRecord, ItemId, ItemKey};

use crate::error::StrategyError;
use crate::repository::Repository;

/// Which documents an update rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    /// Only the identified version
    Version,
    /// Every version of the identified language
    AllVersions,
    /// Every version of every language
    AllLanguages,
}

/// A single change to apply to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// Remove one (item, language, version) document
    Delete(ItemKey),
    /// Remove every document of an item
    DeleteGroup(ItemId),
    /// Reindex the item and its whole subtree
    UpdateRecursive(ItemKey),
    Update { key: ItemKey, scope: UpdateScope },
    /// Clear the latest-version marker of a historical version
    MarkNotLatest(ItemKey),
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexAction::Delete(key) => write!(f, "delete {}", key),
            IndexAction::DeleteGroup(id) => write!(f, "delete-group {}", id),
            IndexAction::UpdateRecursive(key) => write!(f, "update-recursive {}", key),
            IndexAction::Update { key, scope } => write!(f, "update {} ({:?})", key, scope),
            IndexAction::MarkNotLatest(key) => write!(f, "mark-not-latest {}", key),
        }
    }
}

/// Resolves records for one job against the current repository state.
///
/// Holds the set of identities already handled by the job; a repeated
/// identity resolves to nothing.
pub struct UpdateResolver<'a> {
    repository: &'a dyn Repository,
    root: ItemId,
    processed: HashSet<ItemKey>,
}

impl<'a> UpdateResolver<'a> {
    pub fn new(repository: &'a dyn Repository, root: ItemId) -> Self {
        Self {
            repository,
            root,
            processed: HashSet::new(),
        }
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Actions for one record, in the order they must be applied.
    pub fn resolve(&mut self, record: &ChangeRecord) -> Result<Vec<IndexAction>, StrategyError> {
        if !self.processed.insert(record.key.clone()) {
            debug!(key = %record.key, "Already processed in this job");
            return Ok(Vec::new());
        }

        if record.need_update_children {
            if let Some(action) = self.resolve_subtree(record)? {
                return Ok(vec![action]);
            }
        }

        let mut actions = Vec::new();
        if record.need_update_previous_version {
            actions.extend(self.previous_version(&record.key)?);
        }
        actions.extend(self.resolve_single(record)?);
        Ok(actions)
    }

    fn resolve_subtree(&self, record: &ChangeRecord) -> Result<Option<IndexAction>, StrategyError> {
        let Some(item) = self.repository.resolve(&record.key)? else {
            return Ok(None);
        };

        let old_parent_in_root = match record.old_parent_id {
            Some(parent) if !parent.is_nil() => self.repository.is_descendant_of(parent, self.root)?,
            _ => false,
        };

        if old_parent_in_root && !self.repository.is_descendant_of(item.id, self.root)? {
            debug!(key = %record.key, "Moved out of the indexed subtree");
            return Ok(Some(IndexAction::Delete(record.key.clone())));
        }

        Ok(Some(IndexAction::UpdateRecursive(record.key.clone())))
    }

    fn previous_version(&self, key: &ItemKey) -> Result<Option<IndexAction>, StrategyError> {
        let versions = self
            .repository
            .version_numbers(key.item_id, &key.language)?;

        let previous = versions
            .iter()
            .position(|v| *v == key.version)
            .filter(|idx| *idx >= 1)
            .map(|idx| versions[idx - 1]);

        Ok(previous.map(|v| IndexAction::MarkNotLatest(key.with_version(v))))
    }

    fn resolve_single(&self, record: &ChangeRecord) -> Result<Option<IndexAction>, StrategyError> {
        let key = &record.key;

        match self.repository.resolve(key)? {
            Some(item) => {
                if !self.repository.is_descendant_of(item.id, self.root)? {
                    debug!(key = %key, "Outside the indexed subtree, skipping");
                    return Ok(None);
                }
                let scope = if record.shared_field_changed {
                    UpdateScope::AllLanguages
                } else if record.unversioned_field_changed {
                    UpdateScope::AllVersions
                } else {
                    UpdateScope::Version
                };
                Ok(Some(IndexAction::Update {
                    key: key.clone(),
                    scope,
                }))
            }
            None => {
                let group_gone = self
                    .repository
                    .get_item(key.item_id)?
                    .map(|item| item.versions.values().all(|v| v.is_empty()))
                    .unwrap_or(true);
                if group_gone {
                    Ok(Some(IndexAction::DeleteGroup(key.item_id)))
                } else {
                    Ok(Some(IndexAction::Delete(key.clone())))
                }
            }
        }
    }
}
