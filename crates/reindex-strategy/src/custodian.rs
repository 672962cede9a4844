//! Bundled job scheduler: runs indexing jobs on the blocking pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use reindex_types::ChangeRecord;

use crate::database::Database;
use crate::error::StrategyError;
use crate::index::SearchIndex;
use crate::jobs::{JobHandle, JobOutcome, JobRequest, JobResult, JobScheduler};
use crate::rebuild::{rebuild_index, LoggingProgressCallback};
use crate::signals::{IndexingSignal, SignalBus};
use crate::updater::IndexUpdater;

/// Executes update and rebuild jobs for one index.
///
/// Raises "indexing started/ended" around every job. Incremental jobs
/// advance the index checkpoint when they complete. At most one job runs
/// at a time; a submit while one is outstanding is refused, even when the
/// previous caller stopped waiting on it.
#[derive(Clone)]
pub struct IndexCustodian {
    database: Arc<Database>,
    index: Arc<dyn SearchIndex>,
    bus: Arc<SignalBus>,
    job_timeout: Option<Duration>,
    in_flight: Arc<AtomicBool>,
}

/// Marks the custodian busy until dropped.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl IndexCustodian {
    pub fn new(database: Arc<Database>, index: Arc<dyn SearchIndex>, bus: Arc<SignalBus>) -> Self {
        Self {
            database,
            index,
            bus,
            job_timeout: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bound how long callers wait on returned handles. Zero waits indefinitely.
    pub fn with_job_timeout_secs(mut self, secs: u64) -> Self {
        self.job_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    pub fn index(&self) -> &Arc<dyn SearchIndex> {
        &self.index
    }

    /// Whether a submitted job has not finished yet.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn claim(&self) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlight(self.in_flight.clone()))
    }

    /// Run a request on the current thread.
    pub fn execute(&self, request: JobRequest) -> JobResult {
        match request {
            JobRequest::IncrementalUpdate(records) => self.update(&records),
            JobRequest::FullRebuild { broadcast } => self.rebuild(broadcast),
        }
    }

    fn update(&self, records: &[ChangeRecord]) -> JobResult {
        let repository = self.database.repository().ok_or_else(|| {
            StrategyError::Repository(format!("database '{}' has no repository", self.database.name()))
        })?;

        let signal = IndexingSignal::new(self.index.name(), false);
        self.bus.publish_started(&signal);
        let applied = IndexUpdater::new(repository.as_ref(), self.index.as_ref()).apply_records(records);
        self.bus.publish_ended(&signal);

        let result = applied?;
        if let Some(timestamp) = result.last_timestamp {
            self.index
                .advance_checkpoint(timestamp, result.applied as u64)?;
        }

        info!(
            index = %self.index.name(),
            applied = result.applied,
            skipped = result.skipped,
            checkpoint = ?self.index.checkpoint(),
            "Incremental update complete"
        );
        Ok(JobOutcome::Updated(result))
    }

    fn rebuild(&self, broadcast: bool) -> JobResult {
        let repository = self.database.repository().ok_or_else(|| {
            StrategyError::Repository(format!("database '{}' has no repository", self.database.name()))
        })?;

        if broadcast {
            // Single node: no remote transport to notify.
            info!(index = %self.index.name(), "Full rebuild announced to remote index nodes");
        }

        self.index.set_rebuilding(true);
        let signal = IndexingSignal::new(self.index.name(), true);
        self.bus.publish_started(&signal);

        let progress = rebuild_index(
            repository.as_ref(),
            self.index.as_ref(),
            &LoggingProgressCallback::default(),
        );

        let outcome = progress.and_then(|progress| {
            self.index.record_rebuild()?;
            self.bus.publish_ended(&signal);
            Ok(JobOutcome::Rebuilt(progress))
        });
        if let Err(e) = &outcome {
            error!(index = %self.index.name(), error = %e, "Full rebuild failed");
        }

        self.index.set_rebuilding(false);
        outcome
    }
}

#[async_trait]
impl JobScheduler for IndexCustodian {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle, StrategyError> {
        let Some(flight) = self.claim() else {
            warn!(index = %self.index.name(), kind = request.kind(), "Previous indexing job still running");
            return Err(StrategyError::Job(format!(
                "index '{}' already has a job in flight",
                self.index.name()
            )));
        };

        let (handle, sender) = JobHandle::channel(request.kind(), self.job_timeout);
        let custodian = self.clone();
        let job_id = handle.job_id();

        tokio::task::spawn_blocking(move || {
            let result = custodian.execute(request);
            // Free before completing so a woken waiter may submit again.
            drop(flight);
            if let Err(e) = &result {
                warn!(job_id = %job_id, error = %e, "Indexing job failed");
            }
            // The waiter may have timed out and gone away.
            let _ = sender.send(result);
        });

        Ok(handle)
    }
}
