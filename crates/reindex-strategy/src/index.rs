//! Search index abstraction and the bundled RocksDB-backed index.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use reindex_storage::Storage;
use reindex_types::{IndexDocument, ItemId, ItemKey};

use crate::error::StrategyError;
use crate::summary::IndexSummary;

/// A search index kept in sync with one subtree of a content database.
pub trait SearchIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Root item of the indexed subtree.
    fn root(&self) -> ItemId;

    /// Last applied queue timestamp.
    fn checkpoint(&self) -> Option<i64>;

    /// Move the checkpoint forward and persist it. Never moves it back.
    fn advance_checkpoint(&self, timestamp: i64, applied: u64) -> Result<bool, StrategyError>;

    fn record_rebuild(&self) -> Result<(), StrategyError>;

    fn summary(&self) -> IndexSummary;

    fn is_paused(&self) -> bool;
    fn set_paused(&self, paused: bool);

    fn is_rebuilding(&self) -> bool;
    fn set_rebuilding(&self, rebuilding: bool);

    fn put_document(&self, doc: &IndexDocument) -> Result<(), StrategyError>;
    fn get_document(&self, key: &ItemKey) -> Result<Option<IndexDocument>, StrategyError>;
    fn delete_document(&self, key: &ItemKey) -> Result<bool, StrategyError>;

    /// Remove every document of an item.
    fn delete_item(&self, item_id: ItemId) -> Result<usize, StrategyError>;

    /// Clear the latest-version marker of an indexed document.
    /// Returns false when the document is not indexed.
    fn mark_not_latest(&self, key: &ItemKey) -> Result<bool, StrategyError>;

    /// Remove every document.
    fn clear(&self) -> Result<usize, StrategyError>;

    fn documents(&self) -> Result<Vec<IndexDocument>, StrategyError>;
}

/// Index whose documents and summary live in the shared RocksDB storage.
pub struct StoredIndex {
    storage: Arc<Storage>,
    name: String,
    root: ItemId,
    summary: RwLock<IndexSummary>,
    paused: AtomicBool,
    rebuilding: AtomicBool,
}

impl StoredIndex {
    /// Open an index, loading its summary if one was persisted.
    pub fn open(
        storage: Arc<Storage>,
        name: impl Into<String>,
        root: ItemId,
    ) -> Result<Self, StrategyError> {
        let name = name.into();
        let summary = match storage.get_summary(&name)? {
            Some(bytes) => {
                let summary = IndexSummary::from_bytes(&bytes)?;
                info!(
                    index = %name,
                    checkpoint = ?summary.last_updated_timestamp,
                    "Loaded index summary"
                );
                summary
            }
            None => {
                debug!(index = %name, "No existing summary, starting from 0");
                IndexSummary::new(name.clone())
            }
        };

        Ok(Self {
            storage,
            name,
            root,
            summary: RwLock::new(summary),
            paused: AtomicBool::new(false),
            rebuilding: AtomicBool::new(false),
        })
    }

    fn save_summary(&self, summary: &IndexSummary) -> Result<(), StrategyError> {
        self.storage.put_summary(&self.name, &summary.to_bytes()?)?;
        Ok(())
    }

    fn lock_error(&self) -> StrategyError {
        StrategyError::Index(format!("summary lock poisoned for index '{}'", self.name))
    }
}

impl SearchIndex for StoredIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn root(&self) -> ItemId {
        self.root
    }

    fn checkpoint(&self) -> Option<i64> {
        self.summary
            .read()
            .map(|s| s.last_updated_timestamp)
            .unwrap_or(None)
    }

    fn advance_checkpoint(&self, timestamp: i64, applied: u64) -> Result<bool, StrategyError> {
        let mut summary = self.summary.write().map_err(|_| self.lock_error())?;
        let moved = summary.advance(timestamp, applied);
        self.save_summary(&summary)?;
        debug!(
            index = %self.name,
            checkpoint = ?summary.last_updated_timestamp,
            moved = moved,
            "Saved index summary"
        );
        Ok(moved)
    }

    fn record_rebuild(&self) -> Result<(), StrategyError> {
        let mut summary = self.summary.write().map_err(|_| self.lock_error())?;
        summary.record_rebuild();
        self.save_summary(&summary)
    }

    fn summary(&self) -> IndexSummary {
        match self.summary.read() {
            Ok(summary) => summary.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    fn set_rebuilding(&self, rebuilding: bool) {
        self.rebuilding.store(rebuilding, Ordering::SeqCst);
    }

    fn put_document(&self, doc: &IndexDocument) -> Result<(), StrategyError> {
        Ok(self.storage.put_document(&self.name, doc)?)
    }

    fn get_document(&self, key: &ItemKey) -> Result<Option<IndexDocument>, StrategyError> {
        Ok(self.storage.get_document(&self.name, key)?)
    }

    fn delete_document(&self, key: &ItemKey) -> Result<bool, StrategyError> {
        Ok(self.storage.delete_document(&self.name, key)?)
    }

    fn delete_item(&self, item_id: ItemId) -> Result<usize, StrategyError> {
        Ok(self.storage.delete_item_documents(&self.name, item_id)?)
    }

    fn mark_not_latest(&self, key: &ItemKey) -> Result<bool, StrategyError> {
        match self.storage.get_document(&self.name, key)? {
            Some(mut doc) => {
                if doc.is_latest_version {
                    doc.is_latest_version = false;
                    self.storage.put_document(&self.name, &doc)?;
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn clear(&self) -> Result<usize, StrategyError> {
        Ok(self.storage.clear_documents(&self.name)?)
    }

    fn documents(&self) -> Result<Vec<IndexDocument>, StrategyError> {
        Ok(self.storage.get_documents(&self.name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_types::ContentItem;
    use tempfile::TempDir;

    fn open_index(storage: Arc<Storage>) -> StoredIndex {
        StoredIndex::open(storage, "web_index", ItemId::new()).unwrap()
    }

    #[test]
    fn test_checkpoint_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());

        let index = open_index(storage.clone());
        assert_eq!(index.checkpoint(), None);
        assert!(index.advance_checkpoint(12, 3).unwrap());
        assert!(!index.advance_checkpoint(7, 1).unwrap());
        drop(index);

        let reopened = open_index(storage);
        assert_eq!(reopened.checkpoint(), Some(12));
        assert_eq!(reopened.summary().applied_count, 4);
    }

    #[test]
    fn test_flags_start_cleared() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(Arc::new(Storage::open(temp_dir.path()).unwrap()));

        assert!(!index.is_paused());
        assert!(!index.is_rebuilding());
        index.set_paused(true);
        index.set_rebuilding(true);
        assert!(index.is_paused());
        assert!(index.is_rebuilding());
    }

    #[test]
    fn test_mark_not_latest() {
        let temp_dir = TempDir::new().unwrap();
        let index = open_index(Arc::new(Storage::open(temp_dir.path()).unwrap()));
        let item = ContentItem::new(ItemId::new(), None, "page").with_language("en", vec![1]);
        let key = ItemKey::new(item.id, "en", 1);

        assert!(!index.mark_not_latest(&key).unwrap());

        index.put_document(&IndexDocument::from_item(&item, &key)).unwrap();
        assert!(index.get_document(&key).unwrap().unwrap().is_latest_version);
        assert!(index.mark_not_latest(&key).unwrap());
        assert!(!index.get_document(&key).unwrap().unwrap().is_latest_version);
    }
}
