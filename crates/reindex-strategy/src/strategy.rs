//! Asynchronous reconciliation strategy.
//!
//! Each run reads the event queue from the index checkpoint, merges the
//! events into change records, and dispatches either an incremental update
//! or a full rebuild. The checkpoint itself is advanced by the completed
//! job, or, for full rebuilds, committed from the queue tail captured
//! when the rebuild started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use reindex_types::IndexingSettings;

use crate::database::{Database, DatabaseRegistry};
use crate::error::StrategyError;
use crate::index::SearchIndex;
use crate::jobs::{JobRequest, JobScheduler};
use crate::log::{read_since, EventLog};
use crate::merge::ChangeMerger;
use crate::signals::{IndexingListener, IndexingSignal, SignalBus, SubscriptionId};
use crate::threshold::{Decision, ThresholdPolicy};

/// What a single run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// A precondition failed; nothing was read or dispatched
    Aborted,
    /// The run was refused (index paused or rebuilding)
    Skipped,
    /// Nothing newer than the checkpoint
    NoChanges,
    Incremental { events: usize, records: usize },
    FullRebuild { records: usize, broadcast: bool },
}

/// Commits the queue tail captured at rebuild start once the rebuild ends.
struct RebuildWatcher {
    index: Arc<dyn SearchIndex>,
    event_log: Option<Arc<dyn EventLog>>,
    snapshots: Arc<DashMap<String, i64>>,
}

impl IndexingListener for RebuildWatcher {
    fn on_started(&self, signal: &IndexingSignal) {
        if !signal.full_rebuild {
            return;
        }
        let Some(event_log) = &self.event_log else {
            return;
        };

        match event_log.last_event() {
            Ok(last) => {
                let tail = last.map(|e| e.timestamp).unwrap_or(0);
                debug!(index = %signal.index_name, tail = tail, "Captured queue tail for rebuild");
                self.snapshots.insert(signal.index_name.clone(), tail);
            }
            Err(e) => {
                warn!(index = %signal.index_name, error = %e, "Could not read queue tail at rebuild start");
            }
        }
    }

    fn on_ended(&self, signal: &IndexingSignal) {
        if !signal.full_rebuild {
            return;
        }
        let Some((_, tail)) = self.snapshots.remove(&signal.index_name) else {
            return;
        };

        match self.index.advance_checkpoint(tail, 0) {
            Ok(_) => info!(
                index = %signal.index_name,
                checkpoint = ?self.index.checkpoint(),
                "Committed rebuild checkpoint"
            ),
            Err(e) => {
                error!(index = %signal.index_name, error = %e, "Failed to commit rebuild checkpoint")
            }
        }
    }
}

/// Keeps one index in sync with its database's event queue.
pub struct AsynchronousStrategy {
    database: Arc<Database>,
    settings: IndexingSettings,
    policy: ThresholdPolicy,
    jobs: Arc<dyn JobScheduler>,
    bus: Arc<SignalBus>,
    initialized: AtomicBool,
    index: OnceLock<Arc<dyn SearchIndex>>,
    snapshots: Arc<DashMap<String, i64>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl AsynchronousStrategy {
    /// Create a strategy for a named database.
    ///
    /// Fails with a configuration error when the database is unknown.
    pub fn new(
        database_name: &str,
        registry: &DatabaseRegistry,
        settings: IndexingSettings,
        jobs: Arc<dyn JobScheduler>,
        bus: Arc<SignalBus>,
    ) -> Result<Self, StrategyError> {
        let database = registry.require(database_name)?;
        let policy = ThresholdPolicy::from_settings(&settings);

        Ok(Self {
            database,
            settings,
            policy,
            jobs,
            bus,
            initialized: AtomicBool::new(false),
            index: OnceLock::new(),
            snapshots: Arc::new(DashMap::new()),
            subscription: Mutex::new(None),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn settings(&self) -> &IndexingSettings {
        &self.settings
    }

    pub fn index(&self) -> Option<&Arc<dyn SearchIndex>> {
        self.index.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Attach the strategy to an index. Only the first call has any effect.
    pub fn initialize(&self, index: Arc<dyn SearchIndex>) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(index = %index.name(), "Strategy already initialized");
            return;
        }

        let index = self.index.get_or_init(|| index).clone();

        if !self.settings.event_queue_enabled {
            error!(
                severity = "fatal",
                index = %index.name(),
                database = %self.database.name(),
                "Event queue is disabled; asynchronous strategy cannot work"
            );
            return;
        }

        let watcher = Arc::new(RebuildWatcher {
            index: index.clone(),
            event_log: self.database.event_log().cloned(),
            snapshots: self.snapshots.clone(),
        });
        let id = self.bus.subscribe(index.name(), watcher);
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);

        info!(index = %index.name(), database = %self.database.name(), "Strategy initialized");
    }

    /// Stop listening for rebuild signals.
    pub fn shutdown(&self) {
        let taken = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(id) = taken {
            self.bus.unsubscribe(id);
            debug!(subscription = %id, "Strategy unsubscribed");
        }
    }

    /// Queue tail captured for an in-flight full rebuild.
    pub fn rebuild_snapshot(&self, index_name: &str) -> Option<i64> {
        self.snapshots.get(index_name).map(|e| *e.value())
    }

    /// Run one reconciliation pass.
    pub async fn run(&self) -> Result<RunOutcome, StrategyError> {
        let index = self
            .index
            .get()
            .ok_or_else(|| StrategyError::Config("strategy is not initialized".to_string()))?;

        if !self.settings.event_queue_enabled {
            error!(severity = "fatal", index = %index.name(), "Event queue is disabled");
            return Ok(RunOutcome::Aborted);
        }

        let Some(event_log) = self.database.event_log() else {
            error!(
                severity = "fatal",
                index = %index.name(),
                database = %self.database.name(),
                "Event queue not available"
            );
            return Ok(RunOutcome::Aborted);
        };
        event_log.flush()?;

        let checkpoint = index.checkpoint();
        let events = read_since(event_log.as_ref(), checkpoint)?;

        if self.database.repository().is_none() {
            error!(
                severity = "fatal",
                index = %index.name(),
                database = %self.database.name(),
                "Repository not available"
            );
            return Ok(RunOutcome::Aborted);
        }

        let since = checkpoint.unwrap_or(0);
        let events: Vec<_> = events.into_iter().filter(|e| e.timestamp > since).collect();
        if events.is_empty() {
            debug!(index = %index.name(), checkpoint = since, "No changes since checkpoint");
            return Ok(RunOutcome::NoChanges);
        }

        let records = ChangeMerger::merge_all(&events);
        debug!(
            index = %index.name(),
            events = events.len(),
            records = records.len(),
            "Merged change records"
        );

        match self.policy.decide(records.len()) {
            Decision::FullRebuild { broadcast } => {
                warn!(
                    index = %index.name(),
                    records = records.len(),
                    threshold = self.policy.ceiling,
                    broadcast = broadcast,
                    "Number of changes exceeded maximum threshold, requesting full rebuild"
                );
                let handle = self.jobs.submit(JobRequest::FullRebuild { broadcast }).await?;
                handle.wait().await?;
                Ok(RunOutcome::FullRebuild {
                    records: records.len(),
                    broadcast,
                })
            }
            Decision::Incremental => {
                let outcome = RunOutcome::Incremental {
                    events: events.len(),
                    records: records.len(),
                };
                let handle = self
                    .jobs
                    .submit(JobRequest::IncrementalUpdate(records))
                    .await?;
                handle.wait().await?;
                Ok(outcome)
            }
        }
    }
}

impl Drop for AsynchronousStrategy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer-driven strategy: refuses to run while the index is paused or
/// already rebuilding.
pub struct IntervalStrategy {
    inner: AsynchronousStrategy,
    interval_secs: u64,
}

impl IntervalStrategy {
    pub fn new(inner: AsynchronousStrategy, interval_secs: u64) -> Self {
        Self {
            inner,
            interval_secs,
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Timer registration only makes sense with an event queue.
    pub fn should_schedule(&self) -> bool {
        self.inner.settings.event_queue_enabled
    }

    pub fn inner(&self) -> &AsynchronousStrategy {
        &self.inner
    }

    pub fn initialize(&self, index: Arc<dyn SearchIndex>) {
        self.inner.initialize(index)
    }

    pub fn shutdown(&self) {
        self.inner.shutdown()
    }

    pub async fn run(&self) -> Result<RunOutcome, StrategyError> {
        if let Some(index) = self.inner.index() {
            if index.is_paused() {
                warn!(index = %index.name(), "Index is paused, skipping update");
                return Ok(RunOutcome::Skipped);
            }
            if index.is_rebuilding() {
                warn!(index = %index.name(), "Index is being rebuilt, skipping update");
                return Ok(RunOutcome::Skipped);
            }
        }
        self.inner.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::StoredIndex;
    use crate::jobs::{JobHandle, JobOutcome};
    use crate::rebuild::RebuildProgress;
    use crate::updater::UpdateResult;
    use async_trait::async_trait;
    use reindex_storage::Storage;
    use reindex_types::{EventKind, ItemId, ItemKey};
    use tempfile::TempDir;

    /// Records submitted requests and completes them immediately.
    #[derive(Default)]
    struct RecordingScheduler {
        requests: Mutex<Vec<JobRequest>>,
    }

    #[async_trait]
    impl JobScheduler for RecordingScheduler {
        async fn submit(&self, request: JobRequest) -> Result<JobHandle, StrategyError> {
            let (handle, sender) = JobHandle::channel(request.kind(), None);
            let outcome = match &request {
                JobRequest::IncrementalUpdate(_) => JobOutcome::Updated(UpdateResult::new()),
                JobRequest::FullRebuild { .. } => JobOutcome::Rebuilt(RebuildProgress::new()),
            };
            self.requests.lock().unwrap().push(request);
            let _ = sender.send(Ok(outcome));
            Ok(handle)
        }
    }

    struct Fixture {
        storage: Arc<Storage>,
        registry: DatabaseRegistry,
        jobs: Arc<RecordingScheduler>,
        bus: Arc<SignalBus>,
        index: Arc<dyn SearchIndex>,
        _temp: TempDir,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp.path()).unwrap());
        let registry = DatabaseRegistry::new();
        registry.register(Database::from_storage("master", storage.clone()));
        let index: Arc<dyn SearchIndex> =
            Arc::new(StoredIndex::open(storage.clone(), "web_index", ItemId::new()).unwrap());
        Fixture {
            storage,
            registry,
            jobs: Arc::new(RecordingScheduler::default()),
            bus: Arc::new(SignalBus::new()),
            index,
            _temp: temp,
        }
    }

    fn strategy(f: &Fixture, settings: IndexingSettings) -> AsynchronousStrategy {
        AsynchronousStrategy::new("master", &f.registry, settings, f.jobs.clone(), f.bus.clone())
            .unwrap()
    }

    fn save(storage: &Storage, key: &ItemKey) {
        storage.queue_event(EventKind::ItemSaved {
            item: key.clone(),
            shared_field_changed: false,
            unversioned_field_changed: false,
        });
    }

    #[test]
    fn test_unknown_database_is_config_error() {
        let f = fixture();
        let result = AsynchronousStrategy::new(
            "web",
            &f.registry,
            IndexingSettings::default(),
            f.jobs.clone(),
            f.bus.clone(),
        );
        assert!(matches!(result, Err(StrategyError::Config(_))));
    }

    #[test]
    fn test_initialize_subscribes_once() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());
        s.initialize(f.index.clone());

        assert!(s.is_initialized());
        assert_eq!(f.bus.listener_count("web_index"), 1);

        s.shutdown();
        assert_eq!(f.bus.listener_count("web_index"), 0);
    }

    #[test]
    fn test_disabled_event_queue_does_not_subscribe() {
        let f = fixture();
        let settings = IndexingSettings {
            event_queue_enabled: false,
            ..Default::default()
        };
        let s = strategy(&f, settings);
        s.initialize(f.index.clone());

        assert!(s.is_initialized());
        assert_eq!(f.bus.listener_count("web_index"), 0);
    }

    #[tokio::test]
    async fn test_run_before_initialize_is_error() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        assert!(matches!(s.run().await, Err(StrategyError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_flushes_and_submits_incremental_update() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());

        let key = ItemKey::new(ItemId::new(), "en", 1);
        save(&f.storage, &key);
        save(&f.storage, &key);

        let outcome = s.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Incremental {
                events: 2,
                records: 1
            }
        );

        let requests = f.jobs.requests.lock().unwrap();
        let JobRequest::IncrementalUpdate(records) = &requests[0] else {
            panic!("expected incremental update");
        };
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp, 2);
    }

    #[tokio::test]
    async fn test_run_with_no_changes() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());

        assert_eq!(s.run().await.unwrap(), RunOutcome::NoChanges);
        assert!(f.jobs.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_reads_after_checkpoint() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());

        for _ in 0..3 {
            save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));
        }
        f.storage.flush_queued_events().unwrap();
        f.index.advance_checkpoint(2, 0).unwrap();

        assert_eq!(
            s.run().await.unwrap(),
            RunOutcome::Incremental {
                events: 1,
                records: 1
            }
        );
    }

    #[tokio::test]
    async fn test_run_over_threshold_requests_rebuild() {
        let f = fixture();
        let settings = IndexingSettings {
            full_rebuild_item_count_threshold: 2,
            raise_remote_events: false,
            ..Default::default()
        };
        let s = strategy(&f, settings);
        s.initialize(f.index.clone());

        for _ in 0..3 {
            save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));
        }

        assert_eq!(
            s.run().await.unwrap(),
            RunOutcome::FullRebuild {
                records: 3,
                broadcast: false
            }
        );
        assert_eq!(
            *f.jobs.requests.lock().unwrap(),
            vec![JobRequest::FullRebuild { broadcast: false }]
        );
    }

    #[tokio::test]
    async fn test_missing_event_log_aborts() {
        let f = fixture();
        f.registry.register(Database::new("master"));
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());

        assert_eq!(s.run().await.unwrap(), RunOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_missing_repository_aborts() {
        let f = fixture();
        f.registry
            .register(Database::new("master").with_event_log(f.storage.clone()));
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());
        save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));

        assert_eq!(s.run().await.unwrap(), RunOutcome::Aborted);
        assert!(f.jobs.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rebuild_signals_commit_queue_tail() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());

        for _ in 0..4 {
            save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));
        }
        f.storage.flush_queued_events().unwrap();

        let signal = IndexingSignal::new("web_index", true);
        f.bus.publish_started(&signal);
        assert_eq!(s.rebuild_snapshot("web_index"), Some(4));

        save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));
        f.storage.flush_queued_events().unwrap();

        f.bus.publish_ended(&signal);
        assert_eq!(f.index.checkpoint(), Some(4));
        assert_eq!(s.rebuild_snapshot("web_index"), None);
    }

    #[test]
    fn test_incremental_signals_leave_checkpoint() {
        let f = fixture();
        let s = strategy(&f, IndexingSettings::default());
        s.initialize(f.index.clone());
        save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));
        f.storage.flush_queued_events().unwrap();

        let signal = IndexingSignal::new("web_index", false);
        f.bus.publish_started(&signal);
        f.bus.publish_ended(&signal);

        assert_eq!(s.rebuild_snapshot("web_index"), None);
        assert_eq!(f.index.checkpoint(), None);
    }

    #[tokio::test]
    async fn test_interval_strategy_skips_paused_and_rebuilding() {
        let f = fixture();
        let interval = IntervalStrategy::new(strategy(&f, IndexingSettings::default()), 60);
        interval.initialize(f.index.clone());
        save(&f.storage, &ItemKey::new(ItemId::new(), "en", 1));

        f.index.set_paused(true);
        assert_eq!(interval.run().await.unwrap(), RunOutcome::Skipped);

        f.index.set_paused(false);
        f.index.set_rebuilding(true);
        assert_eq!(interval.run().await.unwrap(), RunOutcome::Skipped);

        f.index.set_rebuilding(false);
        assert!(matches!(
            interval.run().await.unwrap(),
            RunOutcome::Incremental { .. }
        ));
        assert!(interval.should_schedule());
        assert_eq!(interval.interval_secs(), 60);
    }
}
