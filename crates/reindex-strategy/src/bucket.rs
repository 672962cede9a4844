//! Item-id bucketed collection of change records.
//!
//! Records are grouped per item id. Within a bucket, records keep their
//! insertion order and are unique per (language, version). Buckets are
//! yielded in the order they were first created, so extraction order is
//! fully determined by the order of inserts.

use std::collections::HashMap;

use reindex_types::{ChangeRecord, ItemId, ItemKey};

#[derive(Debug)]
struct Bucket {
    /// Creation order of the bucket
    seq: u64,
    records: Vec<ChangeRecord>,
}

/// Ordered multimap from item id to change records.
#[derive(Debug, Default)]
pub struct BucketMap {
    buckets: HashMap<ItemId, Bucket>,
    next_seq: u64,
    len: usize,
}

impl BucketMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records held for one item.
    pub fn item_len(&self, item_id: ItemId) -> usize {
        self.buckets
            .get(&item_id)
            .map(|b| b.records.len())
            .unwrap_or(0)
    }

    /// Whether a record exists for the exact (item, language, version).
    pub fn contains_key(&self, key: &ItemKey) -> bool {
        self.position(key).is_some()
    }

    /// Whether any record of the item satisfies `pred`.
    pub fn contains_any<F>(&self, item_id: ItemId, pred: F) -> bool
    where
        F: Fn(&ChangeRecord) -> bool,
    {
        self.buckets
            .get(&item_id)
            .map(|b| b.records.iter().any(pred))
            .unwrap_or(false)
    }

    /// First record inserted for the item.
    pub fn first_mut(&mut self, item_id: ItemId) -> Option<&mut ChangeRecord> {
        self.buckets
            .get_mut(&item_id)
            .and_then(|b| b.records.first_mut())
    }

    /// First record of the item that satisfies `pred`.
    pub fn first_where_mut<F>(&mut self, item_id: ItemId, pred: F) -> Option<&mut ChangeRecord>
    where
        F: Fn(&ChangeRecord) -> bool,
    {
        self.buckets
            .get_mut(&item_id)
            .and_then(|b| b.records.iter_mut().find(|r| pred(r)))
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ChangeRecord> {
        self.buckets
            .get(&key.item_id)
            .and_then(|b| b.records.iter().find(|r| r.key == *key))
    }

    pub fn get_mut(&mut self, key: &ItemKey) -> Option<&mut ChangeRecord> {
        self.buckets
            .get_mut(&key.item_id)
            .and_then(|b| b.records.iter_mut().find(|r| r.key == *key))
    }

    /// Insert a record, replacing any record with the same key in place.
    pub fn insert(&mut self, record: ChangeRecord) {
        if let Some(existing) = self.get_mut(&record.key) {
            *existing = record;
            return;
        }

        let seq = self.next_seq;
        let bucket = self.buckets.entry(record.item_id()).or_insert_with(|| Bucket {
            seq,
            records: Vec::new(),
        });
        if bucket.seq == seq {
            self.next_seq += 1;
        }
        bucket.records.push(record);
        self.len += 1;
    }

    /// Drop every record of an item. Returns how many were removed.
    pub fn remove_all(&mut self, item_id: ItemId) -> usize {
        let removed = self
            .buckets
            .remove(&item_id)
            .map(|b| b.records.len())
            .unwrap_or(0);
        self.len -= removed;
        removed
    }

    /// Remove the record for an exact key.
    pub fn remove(&mut self, key: &ItemKey) -> Option<ChangeRecord> {
        let (item_id, idx) = self.position(key)?;
        let bucket = self.buckets.get_mut(&item_id)?;
        let record = bucket.records.remove(idx);
        if bucket.records.is_empty() {
            self.buckets.remove(&item_id);
        }
        self.len -= 1;
        Some(record)
    }

    /// All records, bucket by bucket in creation order, each bucket in
    /// insertion order.
    pub fn into_values(self) -> Vec<ChangeRecord> {
        let mut buckets: Vec<Bucket> = self.buckets.into_values().collect();
        buckets.sort_by_key(|b| b.seq);
        buckets.into_iter().flat_map(|b| b.records).collect()
    }

    fn position(&self, key: &ItemKey) -> Option<(ItemId, usize)> {
        self.buckets
            .get(&key.item_id)
            .and_then(|b| b.records.iter().position(|r| r.key == *key))
            .map(|idx| (key.item_id, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(item_id: ItemId, lang: &str, version: u32, ts: i64) -> ChangeRecord {
        ChangeRecord::new(ItemKey::new(item_id, lang, version), ts)
    }

    #[test]
    fn test_insert_and_lookup() {
        let a = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(a, "en", 1, 10));
        map.insert(record(a, "de", 1, 11));

        assert_eq!(map.len(), 2);
        assert_eq!(map.item_len(a), 2);
        assert!(map.contains_key(&ItemKey::new(a, "en", 1)));
        assert!(!map.contains_key(&ItemKey::new(a, "en", 2)));
        assert!(map.contains_any(a, |r| r.key.language == "de"));
        assert!(!map.contains_any(ItemId::new(), |_| true));
    }

    #[test]
    fn test_insert_same_key_replaces_in_place() {
        let a = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(a, "en", 1, 10));
        map.insert(record(a, "de", 1, 11));
        map.insert(record(a, "en", 1, 12));

        assert_eq!(map.len(), 2);
        let values = map.into_values();
        assert_eq!(values[0].key.language, "en");
        assert_eq!(values[0].timestamp, 12);
    }

    #[test]
    fn test_first_is_insertion_order() {
        let a = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(a, "de", 3, 10));
        map.insert(record(a, "en", 1, 5));

        assert_eq!(map.first_mut(a).unwrap().key.language, "de");
        assert_eq!(
            map.first_where_mut(a, |r| r.key.language == "en")
                .unwrap()
                .timestamp,
            5
        );
        assert!(map.first_where_mut(a, |r| r.key.language == "fr").is_none());
    }

    #[test]
    fn test_remove_all_and_remove() {
        let a = ItemId::new();
        let b = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(a, "en", 1, 1));
        map.insert(record(a, "en", 2, 2));
        map.insert(record(b, "en", 1, 3));

        assert_eq!(map.remove_all(a), 2);
        assert_eq!(map.remove_all(a), 0);
        assert_eq!(map.len(), 1);

        assert!(map.remove(&ItemKey::new(b, "en", 1)).is_some());
        assert!(map.remove(&ItemKey::new(b, "en", 1)).is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_into_values_follows_bucket_creation_order() {
        let a = ItemId::new();
        let b = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(b, "en", 1, 1));
        map.insert(record(a, "en", 1, 2));
        map.insert(record(b, "de", 1, 3));

        let order: Vec<(ItemId, String)> = map
            .into_values()
            .into_iter()
            .map(|r| (r.item_id(), r.key.language))
            .collect();
        assert_eq!(
            order,
            vec![
                (b, "en".to_string()),
                (b, "de".to_string()),
                (a, "en".to_string())
            ]
        );
    }

    #[test]
    fn test_recreated_bucket_moves_to_end() {
        let a = ItemId::new();
        let b = ItemId::new();
        let mut map = BucketMap::new();
        map.insert(record(a, "en", 1, 1));
        map.insert(record(b, "en", 1, 2));
        map.remove_all(a);
        map.insert(record(a, "en", 1, 3));

        let ids: Vec<ItemId> = map.into_values().iter().map(|r| r.item_id()).collect();
        assert_eq!(ids, vec![b, a]);
    }
}
