//! Item identity types for the content repository.
//!
//! Every indexable document is addressed by an [`ItemKey`]: the item id,
//! a language code and a version number. The key also yields a
//! content-address string used for document ids and log output.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReindexError;

/// Identifier of a content item (shared by all its languages and versions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Generate a fresh random item id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The nil id, used where a parent is unknown.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for ItemId {
    type Err = ReindexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim_matches(|c| c == '{' || c == '}');
        Uuid::parse_str(trimmed)
            .map(ItemId)
            .map_err(|e| ReindexError::InvalidInput(format!("invalid item id '{}': {}", s, e)))
    }
}

impl From<Uuid> for ItemId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identity of one (item, language, version) document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item_id: ItemId,
    pub language: String,
    pub version: u32,
}

impl ItemKey {
    pub fn new(item_id: ItemId, language: impl Into<String>, version: u32) -> Self {
        Self {
            item_id,
            language: language.into(),
            version,
        }
    }

    /// Content-address key: `{item_id}/{language}/{version}`.
    pub fn content_key(&self) -> String {
        format!("{}/{}/{}", self.item_id, self.language, self.version)
    }

    /// Same item and language, different version.
    pub fn with_version(&self, version: u32) -> Self {
        Self {
            item_id: self.item_id,
            language: self.language.clone(),
            version,
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content_key())
    }
}

/// A content item as stored in the repository.
///
/// `versions` maps each language code to the item's version numbers in
/// ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ItemId,

    /// Parent item, `None` for a tree root
    #[serde(default)]
    pub parent_id: Option<ItemId>,

    pub name: String,

    #[serde(default)]
    pub versions: BTreeMap<String, Vec<u32>>,
}

impl ContentItem {
    pub fn new(id: ItemId, parent_id: Option<ItemId>, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            versions: BTreeMap::new(),
        }
    }

    /// Builder-style helper to add a language with the given versions.
    pub fn with_language(mut self, language: impl Into<String>, versions: Vec<u32>) -> Self {
        let mut versions = versions;
        versions.sort_unstable();
        versions.dedup();
        self.versions.insert(language.into(), versions);
        self
    }

    /// Whether this item has the given language and version.
    pub fn has_version(&self, language: &str, version: u32) -> bool {
        self.versions
            .get(language)
            .map(|v| v.contains(&version))
            .unwrap_or(false)
    }

    /// Latest version number for a language.
    pub fn latest_version(&self, language: &str) -> Option<u32> {
        self.versions.get(language).and_then(|v| v.last().copied())
    }

    /// All (language, version) keys of this item.
    pub fn keys(&self) -> Vec<ItemKey> {
        self.versions
            .iter()
            .flat_map(|(lang, versions)| {
                versions
                    .iter()
                    .map(move |v| ItemKey::new(self.id, lang.clone(), *v))
            })
            .collect()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_parse_braced() {
        let id: ItemId = "{110d559f-dea5-42ea-9c1c-8a5df7e70ef9}".parse().unwrap();
        assert_eq!(id.to_string(), "110d559f-dea5-42ea-9c1c-8a5df7e70ef9");
    }

    #[test]
    fn test_item_id_parse_invalid() {
        assert!("not-a-guid".parse::<ItemId>().is_err());
    }

    #[test]
    fn test_content_key() {
        let id: ItemId = "110d559f-dea5-42ea-9c1c-8a5df7e70ef9".parse().unwrap();
        let key = ItemKey::new(id, "en", 3);
        assert_eq!(
            key.content_key(),
            "110d559f-dea5-42ea-9c1c-8a5df7e70ef9/en/3"
        );
        assert_eq!(key.with_version(2).version, 2);
    }

    #[test]
    fn test_content_item_versions() {
        let item = ContentItem::new(ItemId::new(), None, "home")
            .with_language("en", vec![3, 1, 2])
            .with_language("da", vec![1]);

        assert!(item.has_version("en", 2));
        assert!(!item.has_version("de", 1));
        assert_eq!(item.latest_version("en"), Some(3));
        assert_eq!(item.keys().len(), 4);
    }
}
