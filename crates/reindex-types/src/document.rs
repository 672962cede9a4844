//! Search index documents.
//!
//! The bundled document store only tracks which item versions are indexed
//! and which of them is the latest version of its language.

use serde::{Deserialize, Serialize};

use crate::item::{ContentItem, ItemId, ItemKey};

/// One indexed (item, language, version).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub key: ItemKey,

    #[serde(default)]
    pub parent_id: Option<ItemId>,

    pub name: String,

    pub is_latest_version: bool,
}

impl IndexDocument {
    /// Build the document for one version of a content item.
    pub fn from_item(item: &ContentItem, key: &ItemKey) -> Self {
        Self {
            key: key.clone(),
            parent_id: item.parent_id,
            name: item.name.clone(),
            is_latest_version: item.latest_version(&key.language) == Some(key.version),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
