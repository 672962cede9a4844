//! Interval scheduling for index reconciliation.
//!
//! Wraps `tokio-cron-scheduler` with the pieces every reconciliation job
//! needs:
//!
//! - repeating interval jobs with graceful shutdown via `CancellationToken`
//! - overlap control per job, plus [`SingleFlight`] per index name
//! - random start jitter
//! - run status in a [`JobRegistry`]
//!
//! # Example
//!
//! ```ignore
//! use reindex_scheduler::{create_reconcile_job, ReconcileJobConfig, SchedulerConfig, SchedulerService};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! create_reconcile_job(&scheduler, strategy, ReconcileJobConfig::new("web_index", 300)).await?;
//! scheduler.start().await?;
//!
//! let status = scheduler.registry().get_status("reconcile:web_index");
//! ```

mod config;
mod error;
mod jitter;
pub mod jobs;
mod overlap;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use jitter::{with_jitter, JitterConfig};
pub use jobs::{create_reconcile_job, outcome_output, run_reconcile, ReconcileJobConfig};
pub use overlap::{OverlapGuard, OverlapPolicy, RunGuard, SingleFlight};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{validate_interval, SchedulerService};
