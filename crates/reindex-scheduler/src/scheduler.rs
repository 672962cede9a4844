//! Scheduler service wrapper around tokio-cron-scheduler.
//!
//! Jobs are repeating intervals. Every run goes through the same wrapper:
//! pause check, overlap guard, jitter, then the job body, with the result
//! recorded in the [`JobRegistry`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::jitter::{with_jitter, JitterConfig};
use crate::overlap::{OverlapGuard, OverlapPolicy, SingleFlight};
use crate::registry::{JobOutput, JobRegistry, JobResult};
use crate::{SchedulerConfig, SchedulerError};

/// Service wrapper around JobScheduler for lifecycle management.
///
/// Provides start/stop functionality with graceful shutdown support
/// via CancellationToken propagation to jobs.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    job_ids: DashMap<String, Uuid>,
    flights: SingleFlight,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a new scheduler service with the given configuration.
    ///
    /// The scheduler is created but not started. Call `start()` to begin
    /// executing scheduled jobs.
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            registry: Arc::new(JobRegistry::new()),
            job_ids: DashMap::new(),
            flights: SingleFlight::new(),
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
        })
    }

    /// Start the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::AlreadyRunning` if the scheduler is already started.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");

        Ok(())
    }

    /// Shutdown the scheduler gracefully.
    ///
    /// Cancels the shutdown token, waits up to the configured timeout for
    /// in-flight runs to finish, then stops the scheduler.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NotRunning` if the scheduler is not started.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        while self.running_jobs() > 0 {
            if Instant::now() >= deadline {
                warn!(
                    running = self.running_jobs(),
                    "Shutdown timeout reached with jobs still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");

        Ok(())
    }

    fn running_jobs(&self) -> usize {
        self.registry
            .get_all_status()
            .iter()
            .filter(|s| s.is_running)
            .count()
    }

    /// Token cancelled when shutdown begins. Jobs should stop early on it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    /// Per-index guard shared by scheduled jobs and external triggers.
    pub fn single_flight(&self) -> SingleFlight {
        self.flights.clone()
    }

    pub fn job_id(&self, name: &str) -> Option<Uuid> {
        self.job_ids.get(name).map(|id| *id)
    }

    /// Register a job that runs every `interval`.
    ///
    /// The first run happens one interval after the scheduler starts. The
    /// job body receives the shutdown token and reports its stats through
    /// [`JobOutput`]; an `Err` is recorded as [`JobResult::Failed`].
    ///
    /// # Errors
    ///
    /// `InvalidInterval` when `interval` is below the configured minimum,
    /// `DuplicateJob` when `name` is already registered.
    pub async fn register_interval_job<F, Fut>(
        &self,
        name: &str,
        interval: Duration,
        overlap: OverlapPolicy,
        jitter: JitterConfig,
        job_fn: F,
    ) -> Result<Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        validate_interval(interval, self.config.min_interval_secs)?;
        if self.job_ids.contains_key(name) {
            return Err(SchedulerError::DuplicateJob(name.to_string()));
        }

        let job_name = name.to_string();
        let registry = self.registry.clone();
        let guard = OverlapGuard::new(overlap);
        let shutdown_token = self.shutdown_token.clone();

        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let name = job_name.clone();
            let registry = registry.clone();
            let guard = guard.clone();
            let token = shutdown_token.clone();
            let job_fn = job_fn.clone();

            Box::pin(async move {
                run_once(&name, &registry, &guard, jitter, token, job_fn).await;
            })
        })
        .map_err(|e| SchedulerError::InvalidInterval(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        self.registry.register(name, interval.as_secs());
        self.job_ids.insert(name.to_string(), uuid);
        info!(
            job = %name,
            uuid = %uuid,
            interval_secs = interval.as_secs(),
            overlap = ?overlap,
            jitter_secs = jitter.max_jitter_secs,
            "Job registered"
        );

        Ok(uuid)
    }

    /// Remove a job from the schedule and the registry.
    pub async fn remove_job(&self, name: &str) -> Result<(), SchedulerError> {
        let (_, uuid) = self
            .job_ids
            .remove(name)
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;
        self.scheduler.remove(&uuid).await?;
        self.registry.unregister(name);
        info!(job = %name, "Job removed");
        Ok(())
    }

    /// Stop scheduling runs of `name` without removing it.
    pub fn pause_job(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_paused(name, true)
    }

    pub fn resume_job(&self, name: &str) -> Result<(), SchedulerError> {
        self.set_paused(name, false)
    }

    fn set_paused(&self, name: &str, paused: bool) -> Result<(), SchedulerError> {
        if !self.registry.is_registered(name) {
            return Err(SchedulerError::JobNotFound(name.to_string()));
        }
        self.registry.set_paused(name, paused);
        info!(job = %name, paused, "Job pause state changed");
        Ok(())
    }
}

/// Reject intervals shorter than `min_secs` (and always zero).
pub fn validate_interval(interval: Duration, min_secs: u64) -> Result<(), SchedulerError> {
    if interval.is_zero() || interval < Duration::from_secs(min_secs) {
        return Err(SchedulerError::InvalidInterval(format!(
            "{:?} is below the minimum of {}s",
            interval, min_secs
        )));
    }
    Ok(())
}

async fn run_once<F, Fut>(
    name: &str,
    registry: &JobRegistry,
    guard: &OverlapGuard,
    jitter: JitterConfig,
    token: CancellationToken,
    job_fn: F,
) where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<JobOutput, String>>,
{
    if token.is_cancelled() {
        debug!(job = %name, "Shutdown in progress, not starting run");
        return;
    }
    if registry.is_paused(name) {
        debug!(job = %name, "Job paused");
        registry.record_complete(name, JobResult::Skipped("paused".into()), 0);
        return;
    }
    let Some(_run) = guard.try_acquire(name) else {
        info!(job = %name, "Previous run still in flight, skipping");
        registry.record_complete(name, JobResult::Skipped("overlap".into()), 0);
        return;
    };

    registry.record_start(name);
    let start = Instant::now();
    let result = with_jitter(jitter, job_fn(token)).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(output) => {
            info!(job = %name, duration_ms, "Job completed");
            registry.record_complete_with_metadata(
                name,
                JobResult::Success,
                duration_ms,
                output.metadata,
            );
        }
        Err(e) => {
            warn!(job = %name, duration_ms, error = %e, "Job failed");
            registry.record_complete(name, JobResult::Failed(e), duration_ms);
        }
    }
}
