//! Key encoding and decoding for storage layer.
//!
//! - Events: `evt:{timestamp:020}`; zero padding keeps lexicographic
//!   order equal to timestamp order for range scans.
//! - Items: `item:{item_id}`
//! - Documents: `doc:{index}:{item_id}:{language}:{version:010}`
//! - Summaries: `summary:{index}`

use reindex_types::{ItemId, ItemKey};

use crate::error::StorageError;

/// Key for event queue entries
/// Format: evt:{timestamp:020}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    /// Queue timestamp (monotonic sequence, starting at 1)
    pub timestamp: i64,
}

impl EventKey {
    pub fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("evt:{:020}", self.timestamp.max(0)).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))?;

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 || parts[0] != "evt" {
            return Err(StorageError::Key(format!("Invalid event key format: {}", s)));
        }

        let timestamp: i64 = parts[1]
            .parse()
            .map_err(|e| StorageError::Key(format!("Invalid timestamp: {}", e)))?;

        Ok(Self { timestamp })
    }
}

/// Key for content items
/// Format: item:{item_id}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRecordKey {
    pub item_id: ItemId,
}

impl ItemRecordKey {
    pub fn new(item_id: ItemId) -> Self {
        Self { item_id }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("item:{}", self.item_id).into_bytes()
    }
}

/// Key for index documents
/// Format: doc:{index}:{item_id}:{language}:{version:010}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKey<'a> {
    pub index: &'a str,
    pub key: &'a ItemKey,
}

impl<'a> DocumentKey<'a> {
    pub fn new(index: &'a str, key: &'a ItemKey) -> Self {
        Self { index, key }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "doc:{}:{}:{}:{:010}",
            self.index, self.key.item_id, self.key.language, self.key.version
        )
        .into_bytes()
    }

    /// Prefix covering every document of an index
    pub fn index_prefix(index: &str) -> Vec<u8> {
        format!("doc:{}:", index).into_bytes()
    }

    /// Prefix covering every document of one item in an index
    pub fn item_prefix(index: &str, item_id: ItemId) -> Vec<u8> {
        format!("doc:{}:{}:", index, item_id).into_bytes()
    }
}

/// Key for index summaries
/// Format: summary:{index}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryKey {
    pub index: String,
}

impl SummaryKey {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        format!("summary:{}", self.index).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_key_roundtrip() {
        let key = EventKey::new(1706540400000);
        let decoded = EventKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn test_event_key_lexicographic_order() {
        let key1 = EventKey::new(9);
        let key2 = EventKey::new(10);
        assert!(key1.to_bytes() < key2.to_bytes());
    }

    #[test]
    fn test_event_key_rejects_garbage() {
        assert!(EventKey::from_bytes(b"doc:00000000000000000001").is_err());
        assert!(EventKey::from_bytes(b"evt:abc").is_err());
    }

    #[test]
    fn test_document_key_prefixes() {
        let item_id = ItemId::new();
        let key = ItemKey::new(item_id, "en", 2);
        let bytes = DocumentKey::new("web", &key).to_bytes();

        assert!(bytes.starts_with(&DocumentKey::index_prefix("web")));
        assert!(bytes.starts_with(&DocumentKey::item_prefix("web", item_id)));
        assert!(!bytes.starts_with(&DocumentKey::index_prefix("master")));
    }
}
