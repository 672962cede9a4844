//! Command implementations for the reindex daemon.
//!
//! Handles:
//! - start: load config, wire every index to a strategy, schedule runs
//! - run: one reconciliation pass for a single index
//! - replay: merge an event file offline
//! - admin: inspect and feed the storage directory

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use tokio::signal;
use tracing::{info, warn};

use reindex_scheduler::{
    create_reconcile_job, ReconcileJobConfig, SchedulerConfig, SchedulerService,
};
use reindex_storage::Storage;
use reindex_strategy::{
    AsynchronousStrategy, ChangeMerger, Database, DatabaseRegistry, IndexCustodian, IndexSummary,
    IntervalStrategy, RunOutcome, SearchIndex, SignalBus, StoredIndex,
};
use reindex_types::{
    ChangeEvent, ChangeRecord, ContentItem, EventKind, EventType, IndexSettings, Settings,
    StrategyKind,
};

use crate::cli::AdminCommands;

/// Load configuration and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(db_path) = db_path_override {
        settings.db_path = db_path.to_string();
    }
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Open the storage directory, creating parents as needed.
pub fn open_storage(settings: &Settings) -> Result<Arc<Storage>> {
    let db_path = settings.expanded_db_path();
    info!("Opening storage at {:?}", db_path);

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let storage = Storage::open(&db_path).context("Failed to open storage")?;
    Ok(Arc::new(storage))
}

/// A configured index wired to its strategy.
pub struct IndexRuntime {
    pub settings: IndexSettings,
    pub index: Arc<dyn SearchIndex>,
    pub strategy: Arc<IntervalStrategy>,
}

/// Wire configured indexes to strategies over `storage`.
///
/// The storage directory serves the database named by
/// [`Settings::database`]; an index pointing at any other database is a
/// configuration error. `only` restricts the result to one index.
pub fn build_indexes(
    settings: &Settings,
    storage: Arc<Storage>,
    only: Option<&str>,
) -> Result<Vec<IndexRuntime>> {
    let registry = DatabaseRegistry::new();
    registry.register(Database::from_storage(
        settings.database.clone(),
        storage.clone(),
    ));
    let bus = Arc::new(SignalBus::new());

    let mut runtimes = Vec::new();
    for index_settings in &settings.indexes {
        if only.is_some_and(|name| name != index_settings.name) {
            continue;
        }

        let database_name = settings.database_for(index_settings);
        let database = registry
            .require(database_name)
            .with_context(|| format!("index '{}'", index_settings.name))?;

        let index: Arc<dyn SearchIndex> = Arc::new(
            StoredIndex::open(storage.clone(), &index_settings.name, index_settings.root)
                .with_context(|| format!("Failed to open index '{}'", index_settings.name))?,
        );
        let custodian = IndexCustodian::new(database, index.clone(), bus.clone())
            .with_job_timeout_secs(settings.indexing.job_timeout_secs);

        let inner = AsynchronousStrategy::new(
            database_name,
            &registry,
            settings.indexing.clone(),
            Arc::new(custodian),
            bus.clone(),
        )?;
        let strategy = Arc::new(IntervalStrategy::new(
            inner,
            settings.update_interval_for(index_settings),
        ));
        strategy.initialize(index.clone());

        runtimes.push(IndexRuntime {
            settings: index_settings.clone(),
            index,
            strategy,
        });
    }

    Ok(runtimes)
}

/// Start the reindex daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open RocksDB storage and wire every configured index
/// 3. Schedule interval reconciliation for `interval` indexes
/// 4. Shut down gracefully on SIGINT/SIGTERM
pub async fn start_daemon(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let settings = load_settings(config_path, db_path_override, log_level_override)?;
    init_logging(&settings.log_level)?;

    info!("Reindex daemon starting...");
    info!("Configuration:");
    info!("  Database path: {}", settings.db_path);
    info!("  Database: {}", settings.database);
    info!("  Indexes: {}", settings.indexes.len());
    info!("  Log level: {}", settings.log_level);

    let storage = open_storage(&settings)?;
    let runtimes = build_indexes(&settings, storage.clone(), None)?;
    if runtimes.is_empty() {
        warn!("No indexes configured; nothing will be scheduled");
    }

    let mut scheduler = SchedulerService::new(SchedulerConfig::from(&settings.scheduler))
        .await
        .context("Failed to create scheduler")?;

    for runtime in &runtimes {
        let name = &runtime.settings.name;
        match runtime.settings.strategy {
            StrategyKind::Interval => {
                let config = ReconcileJobConfig::new(name.clone(), runtime.strategy.interval_secs())
                    .with_jitter(settings.indexing.jitter_secs);
                create_reconcile_job(&scheduler, runtime.strategy.clone(), config)
                    .await
                    .with_context(|| format!("Failed to schedule index '{}'", name))?;
            }
            StrategyKind::Manual => {
                info!(index = %name, "Manual strategy; runs only on request");
            }
        }
    }

    scheduler.start().await.context("Failed to start scheduler")?;

    shutdown_signal().await;

    scheduler
        .shutdown()
        .await
        .context("Failed to stop scheduler")?;
    for runtime in &runtimes {
        runtime.strategy.shutdown();
    }
    storage.flush().context("Failed to flush storage")?;

    info!("Reindex daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// One base-strategy run for a configured index.
pub async fn run_index(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    log_level_override: Option<&str>,
    index_name: &str,
) -> Result<RunOutcome> {
    let settings = load_settings(config_path, db_path_override, log_level_override)?;
    init_logging(&settings.log_level)?;

    let storage = open_storage(&settings)?;
    let outcome = run_index_with(&settings, storage.clone(), index_name).await?;
    storage.flush().context("Failed to flush storage")?;

    println!("{}: {:?}", index_name, outcome);
    Ok(outcome)
}

/// [`run_index`] over already-loaded settings and storage.
pub async fn run_index_with(
    settings: &Settings,
    storage: Arc<Storage>,
    index_name: &str,
) -> Result<RunOutcome> {
    settings.index(index_name)?;
    let runtime = build_indexes(settings, storage, Some(index_name))?
        .into_iter()
        .next()
        .with_context(|| format!("index '{}' is not configured", index_name))?;

    // Manual triggers bypass the interval strategy's pause checks.
    let outcome = runtime.strategy.inner().run().await?;
    runtime.strategy.shutdown();
    Ok(outcome)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Merge the events in `path` and print one JSON record per line.
pub fn handle_replay(path: &Path) -> Result<Vec<ChangeRecord>> {
    let events: Vec<ChangeEvent> = read_json(path)?;
    let records = ChangeMerger::merge_all(&events);

    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    eprintln!(
        "{} events merged into {} change records",
        events.len(),
        records.len()
    );
    Ok(records)
}

/// Handle admin commands against the configured storage directory.
pub fn handle_admin(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    command: AdminCommands,
) -> Result<()> {
    let settings = load_settings(config_path, db_path_override, None)?;
    let storage = open_storage(&settings)?;
    run_admin(&storage, command)?;
    storage.flush().context("Failed to flush storage")?;
    Ok(())
}

/// Execute one admin command against `storage`.
pub fn run_admin(storage: &Storage, command: AdminCommands) -> Result<()> {
    match command {
        AdminCommands::Stats => {
            let stats = storage.get_stats()?;
            println!("Database Statistics:");
            println!("  Queued events:   {}", stats.event_count);
            println!("  Pending events:  {}", stats.pending_event_count);
            println!("  Content items:   {}", stats.item_count);
            println!("  Index documents: {}", stats.document_count);
            println!("  Index summaries: {}", stats.summary_count);
            println!("  Disk usage:      {} bytes", stats.disk_usage_bytes);
        }
        AdminCommands::Checkpoint { index } => match storage.get_summary(&index)? {
            Some(bytes) => {
                let summary = IndexSummary::from_bytes(&bytes)?;
                println!("Index: {}", summary.index_name);
                match summary.last_updated_timestamp {
                    Some(ts) => println!("  Checkpoint:    {}", ts),
                    None => println!("  Checkpoint:    (none)"),
                }
                println!("  Last updated:  {}", summary.last_updated.to_rfc3339());
                println!("  Applied:       {}", summary.applied_count);
                println!("  Full rebuilds: {}", summary.rebuild_count);
            }
            None => println!("Index '{}' has no summary yet", index),
        },
        AdminCommands::Events { since, limit } => {
            let events = storage.get_events_since(since.unwrap_or(0), &EventType::ALL)?;
            for event in events.iter().take(limit) {
                println!("{}", serde_json::to_string(event)?);
            }
            if events.len() > limit {
                println!("... {} more", events.len() - limit);
            }
        }
        AdminCommands::Append { file } => {
            let kinds: Vec<EventKind> = read_json(&file)?;
            for kind in kinds {
                let event = storage.append_event(kind)?;
                println!(
                    "{} {} {}",
                    event.timestamp,
                    event.event_type(),
                    event.kind.item()
                );
            }
        }
        AdminCommands::PutItems { file } => {
            let items: Vec<ContentItem> = read_json(&file)?;
            for item in &items {
                storage.put_item(item)?;
            }
            println!("Stored {} items", items.len());
        }
    }
    Ok(())
}
