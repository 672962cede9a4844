//! Configuration loading for content-reindex.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/content-reindex/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::ReindexError;
use crate::item::ItemId;

/// Settings consumed by the reconciliation strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingSettings {
    /// Strategies refuse to initialize when the event queue is off.
    #[serde(default = "default_true")]
    pub event_queue_enabled: bool,

    /// Merged change count above which a full rebuild replaces the
    /// incremental update.
    #[serde(default = "default_threshold")]
    pub full_rebuild_item_count_threshold: usize,

    /// Compare the merged change count against the threshold at all.
    #[serde(default = "default_true")]
    pub check_for_threshold: bool,

    /// Full rebuilds are announced to other index nodes.
    #[serde(default = "default_true")]
    pub raise_remote_events: bool,

    /// Interval between timer-driven runs, in seconds.
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// How long a run waits for a dispatched job. 0 waits indefinitely.
    #[serde(default)]
    pub job_timeout_secs: u64,

    /// Max random delay added before each timer-driven run.
    #[serde(default)]
    pub jitter_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> usize {
    100_000
}

fn default_update_interval() -> u64 {
    300
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            event_queue_enabled: true,
            full_rebuild_item_count_threshold: default_threshold(),
            check_for_threshold: true,
            raise_remote_events: true,
            update_interval_secs: default_update_interval(),
            job_timeout_secs: 0,
            jitter_secs: 0,
        }
    }
}

/// Timer service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Seconds shutdown waits for in-flight runs
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Smallest accepted update interval
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_min_interval() -> u64 {
    1
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout(),
            min_interval_secs: default_min_interval(),
        }
    }
}

/// How an index is kept up to date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Timer-driven incremental updates (default)
    #[default]
    Interval,
    /// Updates only when triggered explicitly
    Manual,
}

/// One configured search index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    pub name: String,

    /// Database the index reads from; falls back to [`Settings::database`]
    #[serde(default)]
    pub database: Option<String>,

    /// Root item of the indexed subtree
    pub root: ItemId,

    #[serde(default)]
    pub strategy: StrategyKind,

    /// Overrides [`IndexingSettings::update_interval_secs`]
    #[serde(default)]
    pub update_interval_secs: Option<u64>,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Name of the content database served by the storage directory
    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default)]
    pub indexing: IndexingSettings,

    #[serde(default)]
    pub indexes: Vec<IndexSettings>,

    #[serde(default)]
    pub scheduler: SchedulerSettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "content-reindex")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database() -> String {
    "master".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            database: default_database(),
            indexing: IndexingSettings::default(),
            indexes: Vec::new(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/content-reindex/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REINDEX_*, nested keys separated by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ReindexError> {
        let config_dir = ProjectDirs::from("", "", "content-reindex")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .set_default("database", default_database())
            .map_err(|e| ReindexError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REINDEX_LOG_LEVEL, REINDEX_INDEXING__FULL_REBUILD_ITEM_COUNT_THRESHOLD, ...
        builder = builder.add_source(
            Environment::with_prefix("REINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| ReindexError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ReindexError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ReindexError> {
        if self.indexing.update_interval_secs == 0 {
            return Err(ReindexError::Config(
                "indexing.update_interval_secs must be > 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.name.trim().is_empty() {
                return Err(ReindexError::Config("index name must not be empty".to_string()));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(ReindexError::Config(format!(
                    "duplicate index name '{}'",
                    index.name
                )));
            }
            if self.update_interval_for(index) < self.scheduler.min_interval_secs {
                return Err(ReindexError::Config(format!(
                    "index '{}': update interval is below scheduler.min_interval_secs",
                    index.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a configured index by name.
    pub fn index(&self, name: &str) -> Result<&IndexSettings, ReindexError> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ReindexError::NotFound(format!("index '{}'", name)))
    }

    /// Database an index reads from.
    pub fn database_for<'a>(&'a self, index: &'a IndexSettings) -> &'a str {
        index.database.as_deref().unwrap_or(&self.database)
    }

    /// Effective update interval for an index.
    pub fn update_interval_for(&self, index: &IndexSettings) -> u64 {
        index
            .update_interval_secs
            .unwrap_or(self.indexing.update_interval_secs)
    }

    /// Expand ~ in db_path to actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new() {
                return home.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}
