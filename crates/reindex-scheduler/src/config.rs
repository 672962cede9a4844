//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use reindex_types::SchedulerSettings;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds a shutdown waits for in-flight runs before giving up on them.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Smallest interval a repeating job may be registered with.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_min_interval() -> u64 {
    1
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
            min_interval_secs: default_min_interval(),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
            min_interval_secs: settings.min_interval_secs,
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
