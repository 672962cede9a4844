//! # reindex-types
//!
//! Shared domain types for the content-reindex system.
//!
//! - Items: identity of content items and their language versions
//! - Events: immutable records read from the repository event queue
//! - Change records: merged per-item reindex intents
//! - Documents: what the bundled index store keeps per item version
//! - Settings: layered configuration

pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod item;
pub mod record;

pub use config::{IndexSettings, IndexingSettings, SchedulerSettings, Settings, StrategyKind};
pub use document::IndexDocument;
pub use error::ReindexError;
pub use event::{ChangeEvent, EventKind, EventType};
pub use item::{ContentItem, ItemId, ItemKey};
pub use record::ChangeRecord;
