//! Storage layer for content-reindex.
//!
//! Provides RocksDB-backed storage with:
//! - Column family isolation for events, items, documents and summaries
//! - Zero-padded timestamp keys for ordered event queue scans
//! - Buffered event writes that become visible atomically on flush
//! - Per-index document sets and persisted index summaries

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;

pub use db::{Storage, StorageStats};
pub use error::StorageError;
pub use keys::{DocumentKey, EventKey, ItemRecordKey, SummaryKey};
