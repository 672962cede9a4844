//! Column family definitions for RocksDB.
//!
//! Each column family isolates data with different access patterns:
//! - event_queue: Append-only change events keyed by timestamp
//! - items: Content tree, one record per item
//! - documents: Index documents per (index, item, language, version)
//! - index_summaries: Per-index metadata including the checkpoint

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for the change event queue
pub const CF_EVENT_QUEUE: &str = "event_queue";

/// Column family name for content items
pub const CF_ITEMS: &str = "items";

/// Column family name for index documents
pub const CF_DOCUMENTS: &str = "documents";

/// Column family name for index summaries
pub const CF_INDEX_SUMMARIES: &str = "index_summaries";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[CF_EVENT_QUEUE, CF_ITEMS, CF_DOCUMENTS, CF_INDEX_SUMMARIES];

/// Create column family options for the event queue (append-only, compressed)
fn event_queue_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_EVENT_QUEUE, event_queue_options()),
        ColumnFamilyDescriptor::new(CF_ITEMS, Options::default()),
        ColumnFamilyDescriptor::new(CF_DOCUMENTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_INDEX_SUMMARIES, Options::default()),
    ]
}
