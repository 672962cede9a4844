//! Timer-driven index reconciliation.
//!
//! One interval job per index. Each tick calls the index's
//! [`IntervalStrategy::run`], which reads the event queue from the
//! checkpoint and dispatches an incremental update or a full rebuild.
//! The run outcome is reported to the registry as job metadata.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use reindex_strategy::{IntervalStrategy, RunOutcome};

use crate::{JitterConfig, JobOutput, OverlapPolicy, SchedulerError, SchedulerService, SingleFlight};

/// Configuration for one index's reconciliation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileJobConfig {
    pub index_name: String,

    /// Seconds between runs
    pub interval_secs: u64,

    /// Max jitter in seconds (default: 0)
    #[serde(default)]
    pub jitter_secs: u64,

    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl ReconcileJobConfig {
    pub fn new(index_name: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            index_name: index_name.into(),
            interval_secs,
            jitter_secs: 0,
            overlap: OverlapPolicy::Skip,
        }
    }

    pub fn with_jitter(mut self, jitter_secs: u64) -> Self {
        self.jitter_secs = jitter_secs;
        self
    }

    pub fn with_overlap(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// Registry name of the job.
    pub fn job_name(&self) -> String {
        format!("reconcile:{}", self.index_name)
    }
}

/// Register the reconciliation job for one index.
///
/// Returns `Ok(None)` without registering anything when the strategy has
/// no event queue to poll.
///
/// # Errors
///
/// Returns error if the interval is rejected or the name is taken.
pub async fn create_reconcile_job(
    scheduler: &SchedulerService,
    strategy: Arc<IntervalStrategy>,
    config: ReconcileJobConfig,
) -> Result<Option<Uuid>, SchedulerError> {
    let job_name = config.job_name();
    if !strategy.should_schedule() {
        info!(job = %job_name, "Event queue disabled, not scheduling reconciliation");
        return Ok(None);
    }

    let flights = scheduler.single_flight();
    let index_name = config.index_name.clone();

    let uuid = scheduler
        .register_interval_job(
            &job_name,
            Duration::from_secs(config.interval_secs),
            config.overlap,
            JitterConfig::new(config.jitter_secs),
            move |token| {
                let strategy = strategy.clone();
                let flights = flights.clone();
                let index_name = index_name.clone();
                async move { run_reconcile(&strategy, &flights, &index_name, token).await }
            },
        )
        .await?;

    Ok(Some(uuid))
}

/// One reconciliation pass for `index_name`, guarded by `flights`.
pub async fn run_reconcile(
    strategy: &IntervalStrategy,
    flights: &SingleFlight,
    index_name: &str,
    token: CancellationToken,
) -> Result<JobOutput, String> {
    if token.is_cancelled() {
        return Ok(JobOutput::new().with_metadata("outcome", "cancelled"));
    }
    let Some(_flight) = flights.try_begin(index_name) else {
        debug!(index = %index_name, "Reconciliation already in flight");
        return Ok(JobOutput::new().with_metadata("outcome", "in_flight"));
    };

    let outcome = strategy.run().await.map_err(|e| e.to_string())?;
    debug!(index = %index_name, outcome = ?outcome, "Reconciliation finished");
    Ok(outcome_output(&outcome))
}

/// Registry metadata describing a run outcome.
pub fn outcome_output(outcome: &RunOutcome) -> JobOutput {
    match *outcome {
        RunOutcome::Aborted => JobOutput::new().with_metadata("outcome", "aborted"),
        RunOutcome::Skipped => JobOutput::new().with_metadata("outcome", "skipped"),
        RunOutcome::NoChanges => JobOutput::new().with_metadata("outcome", "no_changes"),
        RunOutcome::Incremental { events, records } => JobOutput::new()
            .with_metadata("outcome", "incremental")
            .with_metadata("events", events.to_string())
            .with_metadata("records", records.to_string()),
        RunOutcome::FullRebuild { records, broadcast } => JobOutput::new()
            .with_metadata("outcome", "full_rebuild")
            .with_metadata("records", records.to_string())
            .with_metadata("broadcast", broadcast.to_string()),
    }
}
