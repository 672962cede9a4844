//! RocksDB wrapper for content-reindex storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - An event queue with buffered writes and ordered reads
//! - The content tree read by the repository accessor
//! - Index documents and per-index summaries

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

use reindex_types::{ChangeEvent, ContentItem, EventKind, EventType, IndexDocument, ItemId, ItemKey};

use crate::column_families::{
    build_cf_descriptors, ALL_CF_NAMES, CF_DOCUMENTS, CF_EVENT_QUEUE, CF_INDEX_SUMMARIES, CF_ITEMS,
};
use crate::error::StorageError;
use crate::keys::{DocumentKey, EventKey, ItemRecordKey, SummaryKey};

/// Main storage interface for content-reindex
pub struct Storage {
    db: DB,
    /// Next event queue timestamp
    next_timestamp: AtomicI64,
    /// Events queued but not yet visible to readers
    pending: Mutex<Vec<EventKind>>,
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_timestamp = Self::load_next_timestamp(&db)?;

        Ok(Self {
            db,
            next_timestamp: AtomicI64::new(next_timestamp),
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Load the next free queue timestamp from the highest existing key
    fn load_next_timestamp(db: &DB) -> Result<i64, StorageError> {
        let cf = db
            .cf_handle(CF_EVENT_QUEUE)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(CF_EVENT_QUEUE.to_string()))?;

        let mut iter = db.iterator_cf(&cf, IteratorMode::End);
        if let Some(result) = iter.next() {
            let (key, _) = result?;
            let event_key = EventKey::from_bytes(&key)?;
            return Ok(event_key.timestamp + 1);
        }
        Ok(1)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::ColumnFamilyNotFound(name.to_string()))
    }

    // ==================== Event Queue ====================

    /// Buffer an event. It becomes visible to readers on the next
    /// [`Storage::flush_queued_events`].
    pub fn queue_event(&self, kind: EventKind) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(kind);
    }

    /// Number of buffered events.
    pub fn pending_event_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Assign timestamps to all buffered events and write them atomically.
    ///
    /// Flushes are serialized on the buffer lock, so timestamps become
    /// visible in increasing order.
    pub fn flush_queued_events(&self) -> Result<Vec<ChangeEvent>, StorageError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let cf = self.cf(CF_EVENT_QUEUE)?;
        let mut batch = WriteBatch::default();
        let mut written = Vec::with_capacity(pending.len());

        for kind in pending.iter() {
            let timestamp = self.next_timestamp.fetch_add(1, Ordering::SeqCst);
            let event = ChangeEvent::new(timestamp, kind.clone());
            batch.put_cf(&cf, EventKey::new(timestamp).to_bytes(), event.to_bytes()?);
            written.push(event);
        }

        self.db.write(batch)?;
        pending.clear();

        debug!(count = written.len(), "Flushed queued events");
        Ok(written)
    }

    /// Queue and immediately flush a single event.
    pub fn append_event(&self, kind: EventKind) -> Result<ChangeEvent, StorageError> {
        self.queue_event(kind);
        let mut written = self.flush_queued_events()?;
        written
            .pop()
            .ok_or_else(|| StorageError::NotFound("flushed event".to_string()))
    }

    /// Events with timestamp strictly greater than `since` whose type is in
    /// `types`, in queue order.
    pub fn get_events_since(
        &self,
        since: i64,
        types: &[EventType],
    ) -> Result<Vec<ChangeEvent>, StorageError> {
        let cf = self.cf(CF_EVENT_QUEUE)?;
        let start = EventKey::new(since.saturating_add(1)).to_bytes();

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward));

        for item in iter {
            let (_, value) = item?;
            let event = ChangeEvent::from_bytes(&value)?;
            if event.timestamp > since && types.contains(&event.event_type()) {
                results.push(event);
            }
        }

        Ok(results)
    }

    /// Most recent event in the queue.
    pub fn last_event(&self) -> Result<Option<ChangeEvent>, StorageError> {
        let cf = self.cf(CF_EVENT_QUEUE)?;
        let mut iter = self.db.iterator_cf(&cf, IteratorMode::End);
        match iter.next() {
            Some(result) => {
                let (_, value) = result?;
                Ok(Some(ChangeEvent::from_bytes(&value)?))
            }
            None => Ok(None),
        }
    }

    // ==================== Content Items ====================

    pub fn put_item(&self, item: &ContentItem) -> Result<(), StorageError> {
        let cf = self.cf(CF_ITEMS)?;
        self.db
            .put_cf(&cf, ItemRecordKey::new(item.id).to_bytes(), item.to_bytes()?)?;
        debug!(item_id = %item.id, "Stored item");
        Ok(())
    }

    pub fn get_item(&self, item_id: ItemId) -> Result<Option<ContentItem>, StorageError> {
        let cf = self.cf(CF_ITEMS)?;
        match self.db.get_cf(&cf, ItemRecordKey::new(item_id).to_bytes())? {
            Some(bytes) => Ok(Some(ContentItem::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_item(&self, item_id: ItemId) -> Result<(), StorageError> {
        let cf = self.cf(CF_ITEMS)?;
        self.db.delete_cf(&cf, ItemRecordKey::new(item_id).to_bytes())?;
        Ok(())
    }

    /// Direct children of an item.
    ///
    /// Scans the whole items column family.
    pub fn get_children(&self, parent_id: ItemId) -> Result<Vec<ContentItem>, StorageError> {
        let mut children: Vec<ContentItem> = self
            .all_items()?
            .into_iter()
            .filter(|item| item.parent_id == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(children)
    }

    pub fn all_items(&self) -> Result<Vec<ContentItem>, StorageError> {
        let cf = self.cf(CF_ITEMS)?;
        let mut items = Vec::new();
        for entry in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = entry?;
            items.push(ContentItem::from_bytes(&value)?);
        }
        Ok(items)
    }

    // ==================== Index Documents ====================

    pub fn put_document(&self, index: &str, doc: &IndexDocument) -> Result<(), StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        self.db
            .put_cf(&cf, DocumentKey::new(index, &doc.key).to_bytes(), doc.to_bytes()?)?;
        Ok(())
    }

    pub fn get_document(
        &self,
        index: &str,
        key: &ItemKey,
    ) -> Result<Option<IndexDocument>, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        match self.db.get_cf(&cf, DocumentKey::new(index, key).to_bytes())? {
            Some(bytes) => Ok(Some(IndexDocument::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns whether a document was present.
    pub fn delete_document(&self, index: &str, key: &ItemKey) -> Result<bool, StorageError> {
        let cf = self.cf(CF_DOCUMENTS)?;
        let doc_key = DocumentKey::new(index, key).to_bytes();
        let existed = self.db.get_cf(&cf, &doc_key)?.is_some();
        if existed {
            self.db.delete_cf(&cf, &doc_key)?;
        }
        Ok(existed)
    }

    /// Delete every document of an item. Returns the number removed.
    pub fn delete_item_documents(&self, index: &str, item_id: ItemId) -> Result<usize, StorageError> {
        self.delete_prefix(CF_DOCUMENTS, &DocumentKey::item_prefix(index, item_id))
    }

    /// Delete every document of an index. Returns the number removed.
    pub fn clear_documents(&self, index: &str) -> Result<usize, StorageError> {
        let deleted = self.delete_prefix(CF_DOCUMENTS, &DocumentKey::index_prefix(index))?;
        info!(index = %index, deleted = deleted, "Cleared index documents");
        Ok(deleted)
    }

    pub fn get_documents(&self, index: &str) -> Result<Vec<IndexDocument>, StorageError> {
        self.prefix_iterator(CF_DOCUMENTS, &DocumentKey::index_prefix(index))?
            .into_iter()
            .map(|(_, value)| IndexDocument::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    pub fn get_item_documents(
        &self,
        index: &str,
        item_id: ItemId,
    ) -> Result<Vec<IndexDocument>, StorageError> {
        self.prefix_iterator(CF_DOCUMENTS, &DocumentKey::item_prefix(index, item_id))?
            .into_iter()
            .map(|(_, value)| IndexDocument::from_bytes(&value).map_err(StorageError::from))
            .collect()
    }

    fn delete_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<usize, StorageError> {
        let cf = self.cf(cf_name)?;
        let mut batch = WriteBatch::default();
        let mut count = 0;

        for (key, _) in self.prefix_iterator(cf_name, prefix)? {
            batch.delete_cf(&cf, &key);
            count += 1;
        }

        if count > 0 {
            self.db.write(batch)?;
        }
        Ok(count)
    }

    // ==================== Index Summaries ====================

    /// Store the serialized summary of an index
    pub fn put_summary(&self, index: &str, summary_bytes: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(CF_INDEX_SUMMARIES)?;
        self.db
            .put_cf(&cf, SummaryKey::new(index).to_bytes(), summary_bytes)?;
        Ok(())
    }

    /// Get the serialized summary of an index
    pub fn get_summary(&self, index: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let cf = self.cf(CF_INDEX_SUMMARIES)?;
        Ok(self.db.get_cf(&cf, SummaryKey::new(index).to_bytes())?)
    }

    // ==================== Generic Operations ====================

    /// Iterate over keys with a given prefix in a column family.
    #[allow(clippy::type_complexity)]
    pub fn prefix_iterator(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let cf = self.cf(cf_name)?;

        let mut results = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(&cf)?;
            }
        }
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        let mut stats = StorageStats::default();

        if let Some(cf) = self.db.cf_handle(CF_EVENT_QUEUE) {
            stats.event_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_ITEMS) {
            stats.item_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_DOCUMENTS) {
            stats.document_count = self.count_cf_entries(cf)?;
        }
        if let Some(cf) = self.db.cf_handle(CF_INDEX_SUMMARIES) {
            stats.summary_count = self.count_cf_entries(cf)?;
        }
        stats.pending_event_count = self.pending_event_count() as u64;
        stats.disk_usage_bytes = self.get_disk_usage();

        Ok(stats)
    }

    fn count_cf_entries(&self, cf: &rocksdb::ColumnFamily) -> Result<u64, StorageError> {
        let mut count = 0u64;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);
        for item in iter {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage.
#[derive(Debug, Default)]
pub struct StorageStats {
    /// Number of events in the queue
    pub event_count: u64,
    /// Number of buffered, unflushed events
    pub pending_event_count: u64,
    /// Number of content items
    pub item_count: u64,
    /// Number of index documents across all indexes
    pub document_count: u64,
    /// Number of index summaries
    pub summary_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn saved(item_id: ItemId) -> EventKind {
        EventKind::ItemSaved {
            item: ItemKey::new(item_id, "en", 1),
            shared_field_changed: false,
            unversioned_field_changed: false,
        }
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_queued_events_invisible_until_flush() {
        let (storage, _temp) = create_test_storage();
        storage.queue_event(saved(ItemId::new()));
        storage.queue_event(saved(ItemId::new()));

        assert_eq!(storage.pending_event_count(), 2);
        assert!(storage.get_events_since(0, &EventType::ALL).unwrap().is_empty());

        let written = storage.flush_queued_events().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].timestamp, 1);
        assert_eq!(written[1].timestamp, 2);
        assert_eq!(storage.pending_event_count(), 0);

        let events = storage.get_events_since(0, &EventType::ALL).unwrap();
        assert_eq!(events, written);
    }

    #[test]
    fn test_get_events_since_is_exclusive_and_filtered() {
        let (storage, _temp) = create_test_storage();
        let item_id = ItemId::new();
        storage.append_event(saved(item_id)).unwrap();
        storage
            .append_event(EventKind::VersionAdded {
                item: ItemKey::new(item_id, "en", 2),
            })
            .unwrap();
        storage.append_event(saved(item_id)).unwrap();

        let after_first = storage.get_events_since(1, &EventType::ALL).unwrap();
        assert_eq!(
            after_first.iter().map(|e| e.timestamp).collect::<Vec<_>>(),
            vec![2, 3]
        );

        let saves_only = storage
            .get_events_since(0, &[EventType::ItemSaved])
            .unwrap();
        assert_eq!(saves_only.len(), 2);
    }

    #[test]
    fn test_timestamps_continue_after_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let storage = Storage::open(temp_dir.path()).unwrap();
            storage.append_event(saved(ItemId::new())).unwrap();
            storage.append_event(saved(ItemId::new())).unwrap();
        }

        let storage = Storage::open(temp_dir.path()).unwrap();
        let event = storage.append_event(saved(ItemId::new())).unwrap();
        assert_eq!(event.timestamp, 3);
        assert_eq!(storage.last_event().unwrap().unwrap().timestamp, 3);
    }

    #[test]
    fn test_last_event_empty_queue() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.last_event().unwrap().is_none());
    }

    #[test]
    fn test_item_roundtrip_and_children() {
        let (storage, _temp) = create_test_storage();
        let root = ContentItem::new(ItemId::new(), None, "root").with_language("en", vec![1]);
        let b = ContentItem::new(ItemId::new(), Some(root.id), "b").with_language("en", vec![1]);
        let a = ContentItem::new(ItemId::new(), Some(root.id), "a").with_language("en", vec![1]);

        for item in [&root, &b, &a] {
            storage.put_item(item).unwrap();
        }

        assert_eq!(storage.get_item(root.id).unwrap(), Some(root.clone()));
        let children = storage.get_children(root.id).unwrap();
        assert_eq!(
            children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        storage.delete_item(a.id).unwrap();
        assert!(storage.get_item(a.id).unwrap().is_none());
        assert_eq!(storage.get_children(root.id).unwrap().len(), 1);
    }

    #[test]
    fn test_documents_are_scoped_per_index() {
        let (storage, _temp) = create_test_storage();
        let item = ContentItem::new(ItemId::new(), None, "home").with_language("en", vec![1, 2]);

        for key in item.keys() {
            let doc = IndexDocument::from_item(&item, &key);
            storage.put_document("web", &doc).unwrap();
            storage.put_document("master", &doc).unwrap();
        }

        assert_eq!(storage.get_documents("web").unwrap().len(), 2);
        assert!(storage
            .delete_document("web", &ItemKey::new(item.id, "en", 1))
            .unwrap());
        assert!(!storage
            .delete_document("web", &ItemKey::new(item.id, "en", 1))
            .unwrap());
        assert_eq!(storage.get_item_documents("web", item.id).unwrap().len(), 1);
        assert_eq!(storage.delete_item_documents("web", item.id).unwrap(), 1);
        assert_eq!(storage.get_documents("master").unwrap().len(), 2);
        assert_eq!(storage.clear_documents("master").unwrap(), 2);
        assert_eq!(storage.get_stats().unwrap().document_count, 0);
    }

    #[test]
    fn test_summary_roundtrip() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.get_summary("web").unwrap().is_none());

        storage.put_summary("web", b"{\"x\":1}").unwrap();
        assert_eq!(
            storage.get_summary("web").unwrap(),
            Some(b"{\"x\":1}".to_vec())
        );
    }
}
