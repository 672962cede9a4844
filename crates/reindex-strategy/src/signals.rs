//! Process-wide "indexing started / ended" notifications.
//!
//! Listeners register under an index name and only hear signals raised
//! for that index.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

/// Raised around every indexing job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingSignal {
    pub index_name: String,
    pub full_rebuild: bool,
}

impl IndexingSignal {
    pub fn new(index_name: impl Into<String>, full_rebuild: bool) -> Self {
        Self {
            index_name: index_name.into(),
            full_rebuild,
        }
    }
}

pub trait IndexingListener: Send + Sync {
    fn on_started(&self, signal: &IndexingSignal);
    fn on_ended(&self, signal: &IndexingSignal);
}

/// Handle returned by [`SignalBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Listeners = Vec<(SubscriptionId, Arc<dyn IndexingListener>)>;

#[derive(Default)]
pub struct SignalBus {
    listeners: DashMap<String, Listeners>,
    next_id: AtomicU64,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        index_name: impl Into<String>,
        listener: Arc<dyn IndexingListener>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let index_name = index_name.into();
        trace!(index = %index_name, subscription = %id, "Subscribed to indexing signals");
        self.listeners
            .entry(index_name)
            .or_default()
            .push((id, listener));
        id
    }

    /// Remove one registration. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, listeners| {
            let before = listeners.len();
            listeners.retain(|(sub, _)| *sub != id);
            removed |= listeners.len() != before;
            !listeners.is_empty()
        });
        removed
    }

    pub fn listener_count(&self, index_name: &str) -> usize {
        self.listeners
            .get(index_name)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    pub fn publish_started(&self, signal: &IndexingSignal) {
        for listener in self.listeners_for(&signal.index_name) {
            listener.on_started(signal);
        }
    }

    pub fn publish_ended(&self, signal: &IndexingSignal) {
        for listener in self.listeners_for(&signal.index_name) {
            listener.on_ended(signal);
        }
    }

    // Cloned out so listeners may subscribe or unsubscribe while handling.
    fn listeners_for(&self, index_name: &str) -> Vec<Arc<dyn IndexingListener>> {
        self.listeners
            .get(index_name)
            .map(|l| l.iter().map(|(_, listener)| listener.clone()).collect())
            .unwrap_or_default()
    }
}
