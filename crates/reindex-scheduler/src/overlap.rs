//! Overlap control for repeating jobs.
//!
//! A reconciliation run for an index must not start while the previous run
//! for the same index is still reading the queue or waiting on its job.
//! Guards are keyed, so one [`OverlapGuard`] can be shared by every job that
//! touches the same set of indexes.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// What to do when a run is due but the previous one has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the new run. The skip is recorded in the registry.
    #[default]
    Skip,

    /// Start the new run anyway.
    Concurrent,
}

/// Tracks which keys currently have a run in flight.
#[derive(Clone)]
pub struct OverlapGuard {
    running: Arc<DashMap<String, ()>>,
    policy: OverlapPolicy,
}

impl OverlapGuard {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self {
            running: Arc::new(DashMap::new()),
            policy,
        }
    }

    /// Claim `key` for one run.
    ///
    /// Under [`OverlapPolicy::Skip`] this returns `None` while another
    /// [`RunGuard`] for the same key is alive. Under
    /// [`OverlapPolicy::Concurrent`] it always succeeds and the returned
    /// guard does not mark the key.
    pub fn try_acquire(&self, key: &str) -> Option<RunGuard> {
        match self.policy {
            OverlapPolicy::Skip => {
                let entry = self.running.entry(key.to_string());
                match entry {
                    dashmap::Entry::Occupied(_) => None,
                    dashmap::Entry::Vacant(slot) => {
                        slot.insert(());
                        Some(RunGuard {
                            running: Some(self.running.clone()),
                            key: key.to_string(),
                        })
                    }
                }
            }
            OverlapPolicy::Concurrent => Some(RunGuard {
                running: None,
                key: key.to_string(),
            }),
        }
    }

    /// Whether a guarded run for `key` is in flight.
    ///
    /// Always false under [`OverlapPolicy::Concurrent`].
    pub fn is_running(&self, key: &str) -> bool {
        self.running.contains_key(key)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }
}

/// One run at a time per index name, whoever triggers it.
///
/// Scheduled reconciliation jobs and external triggers (a manual run, an
/// admin command) share one of these so they never overlap on an index.
#[derive(Clone)]
pub struct SingleFlight {
    guard: OverlapGuard,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            guard: OverlapGuard::new(OverlapPolicy::Skip),
        }
    }

    /// `None` while another run for `index_name` holds its guard.
    pub fn try_begin(&self, index_name: &str) -> Option<RunGuard> {
        self.guard.try_acquire(index_name)
    }

    pub fn is_in_flight(&self, index_name: &str) -> bool {
        self.guard.is_running(index_name)
    }
}

/// Releases its key when dropped, including on panic unwinding.
pub struct RunGuard {
    running: Option<Arc<DashMap<String, ()>>>,
    key: String,
}

impl RunGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.remove(&self.key);
        }
    }
}
