//! Full index rebuild from the content tree.
//!
//! Clears the index and walks the subtree under the index root, writing
//! one document per (item, language, version).

use std::collections::HashSet;

use tracing::{info, warn};

use reindex_types::IndexDocument;

use crate::error::StrategyError;
use crate::index::SearchIndex;
use crate::repository::Repository;

/// Progress tracking for rebuild operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildProgress {
    /// Items visited in the tree walk
    pub items_visited: u64,
    pub documents_indexed: u64,
    /// Documents removed by the initial clear
    pub documents_cleared: u64,
    pub completed: bool,
}

impl RebuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_item(&mut self, documents: u64) {
        self.items_visited += 1;
        self.documents_indexed += documents;
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Trait for receiving rebuild progress updates.
pub trait ProgressCallback: Send + Sync {
    /// Called after each item is indexed and once on completion.
    fn on_progress(&self, progress: &RebuildProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &RebuildProgress) {}
}

/// Logs progress at info level every `batch_size` items.
pub struct LoggingProgressCallback {
    batch_size: u64,
}

impl LoggingProgressCallback {
    pub fn new(batch_size: u64) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }
}

impl Default for LoggingProgressCallback {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &RebuildProgress) {
        if progress.completed || progress.items_visited.is_multiple_of(self.batch_size) {
            info!(
                items = progress.items_visited,
                documents = progress.documents_indexed,
                "Rebuild progress"
            );
        }
    }
}

/// Rebuild an index from scratch.
pub fn rebuild_index(
    repository: &dyn Repository,
    index: &dyn SearchIndex,
    progress_callback: &dyn ProgressCallback,
) -> Result<RebuildProgress, StrategyError> {
    let mut progress = RebuildProgress::new();

    info!(index = %index.name(), root = %index.root(), "Starting full rebuild");
    progress.documents_cleared = index.clear()? as u64;

    let Some(root) = repository.get_item(index.root())? else {
        warn!(index = %index.name(), root = %index.root(), "Index root not found, index left empty");
        progress.mark_completed();
        progress_callback.on_progress(&progress);
        return Ok(progress);
    };

    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(item) = stack.pop() {
        if !visited.insert(item.id) {
            continue;
        }

        let keys = item.keys();
        for key in &keys {
            index.put_document(&IndexDocument::from_item(&item, key))?;
        }
        progress.record_item(keys.len() as u64);
        progress_callback.on_progress(&progress);

        let mut children = repository.children(item.id)?;
        // Pop in name order.
        children.reverse();
        stack.extend(children);
    }

    progress.mark_completed();
    progress_callback.on_progress(&progress);

    info!(
        index = %index.name(),
        items = progress.items_visited,
        documents = progress.documents_indexed,
        cleared = progress.documents_cleared,
        "Full rebuild complete"
    );

    Ok(progress)
}
