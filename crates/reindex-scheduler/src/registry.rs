//! Execution status of registered jobs.
//!
//! The scheduler updates the registry around every run; the daemon reads it
//! to report what each reconciliation job last did.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// The run did not start, e.g. the previous one was still in flight.
    Skipped(String),
}

/// Key-value stats a job reports back with its result.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    /// Seconds between scheduled runs
    pub interval_secs: u64,
    /// When the job last finished (if ever)
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// Runs that finished, skips included
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    pub is_paused: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_name: String, interval_secs: u64) -> Self {
        Self {
            job_name,
            interval_secs,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            is_paused: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Thread-safe map of job name to [`JobStatus`].
///
/// Updates for unknown job names are ignored.
///
/// ```
/// use reindex_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("reconcile:web_index", 60);
///
/// registry.record_start("reconcile:web_index");
/// assert!(registry.is_running("reconcile:web_index"));
///
/// registry.record_complete("reconcile:web_index", JobResult::Success, 120);
/// assert!(!registry.is_running("reconcile:web_index"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic inside a status update leaves the map usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a job, replacing any previous status under the same name.
    pub fn register(&self, job_name: &str, interval_secs: u64) {
        self.write().insert(
            job_name.to_string(),
            JobStatus::new(job_name.to_string(), interval_secs),
        );
    }

    pub fn unregister(&self, job_name: &str) -> bool {
        self.write().remove(job_name).is_some()
    }

    pub fn record_start(&self, job_name: &str) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_running = true;
        }
    }

    pub fn record_complete(&self, job_name: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_name, result, duration_ms, HashMap::new());
    }

    pub fn record_complete_with_metadata(
        &self,
        job_name: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        let mut jobs = self.write();
        let Some(status) = jobs.get_mut(job_name) else {
            return;
        };

        match &result {
            // A skipped run never cleared the flag of the run it collided with.
            JobResult::Skipped(_) => status.skip_count += 1,
            JobResult::Failed(_) => {
                status.is_running = false;
                status.error_count += 1;
            }
            JobResult::Success => status.is_running = false,
        }
        status.last_run = Some(Utc::now());
        status.last_duration_ms = Some(duration_ms);
        status.run_count += 1;
        status.last_result = Some(result);
        status.last_run_metadata = metadata;
    }

    pub fn set_paused(&self, job_name: &str, paused: bool) {
        if let Some(status) = self.write().get_mut(job_name) {
            status.is_paused = paused;
        }
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// All statuses, sorted by job name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_running)
            .unwrap_or(false)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn is_paused(&self, job_name: &str) -> bool {
        self.read()
            .get(job_name)
            .map(|s| s.is_paused)
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);

        let status = registry.get_status("reconcile:web").unwrap();
        assert_eq!(status.job_name, "reconcile:web");
        assert_eq!(status.interval_secs, 60);
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running);
        assert!(!status.is_paused);
    }

    #[test]
    fn test_registry_success_clears_running() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);
        registry.record_start("reconcile:web");
        assert!(registry.is_running("reconcile:web"));

        let metadata = HashMap::from([("outcome".to_string(), "no_changes".to_string())]);
        registry.record_complete_with_metadata("reconcile:web", JobResult::Success, 15, metadata);

        let status = registry.get_status("reconcile:web").unwrap();
        assert!(!status.is_running);
        assert!(status.last_run.is_some());
        assert_eq!(status.last_duration_ms, Some(15));
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_run_metadata["outcome"], "no_changes");
    }

    #[test]
    fn test_registry_failure_counts_error() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);
        registry.record_start("reconcile:web");

        registry.record_complete("reconcile:web", JobResult::Failed("timeout".into()), 5000);

        let status = registry.get_status("reconcile:web").unwrap();
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Failed("timeout".into())));
    }

    #[test]
    fn test_registry_skip_keeps_running_flag() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);
        registry.record_start("reconcile:web");

        registry.record_complete("reconcile:web", JobResult::Skipped("overlap".into()), 0);

        let status = registry.get_status("reconcile:web").unwrap();
        assert!(status.is_running);
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.error_count, 0);
    }

    #[test]
    fn test_registry_pause_and_unregister() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);

        registry.set_paused("reconcile:web", true);
        assert!(registry.is_paused("reconcile:web"));

        assert!(registry.unregister("reconcile:web"));
        assert!(!registry.is_registered("reconcile:web"));
        assert!(!registry.unregister("reconcile:web"));
    }

    #[test]
    fn test_registry_all_status_sorted() {
        let registry = JobRegistry::new();
        registry.register("reconcile:web", 60);
        registry.register("reconcile:master", 30);

        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["reconcile:master", "reconcile:web"]);
        assert_eq!(registry.job_count(), 2);
    }

    #[test]
    fn test_registry_unknown_job_is_ignored() {
        let registry = JobRegistry::new();

        registry.record_start("unknown");
        registry.record_complete("unknown", JobResult::Success, 100);
        registry.set_paused("unknown", true);

        assert!(registry.get_status("unknown").is_none());
        assert!(!registry.is_running("unknown"));
        assert!(!registry.is_paused("unknown"));
    }

    #[test]
    fn test_registry_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let name = format!("reconcile:{}", i);
                    registry.register(&name, 60);
                    registry.record_start(&name);
                    registry.record_complete(&name, JobResult::Success, 1);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.job_count(), 10);
    }
}
