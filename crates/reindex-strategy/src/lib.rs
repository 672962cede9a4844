//! Incremental search index reconciliation.
//!
//! This crate keeps a search index consistent with a mutating content tree
//! by replaying the repository's change event queue from a checkpoint.
//!
//! ## Key Components
//!
//! - [`ChangeMerger`]: Collapses raw events into a minimal set of [`ChangeRecord`]s
//! - [`ThresholdPolicy`]: Chooses between an incremental update and a full rebuild
//! - [`UpdateResolver`]: Turns each record into concrete [`IndexAction`]s
//! - [`AsynchronousStrategy`]: Orchestrates a run and owns checkpoint coordination
//! - [`IntervalStrategy`]: Timer-driven wrapper that respects paused/rebuilding indexes
//! - [`IndexCustodian`]: Bundled [`JobScheduler`] running jobs on the blocking pool
//! - [`SignalBus`]: Per-index "indexing started/ended" notifications
//!
//! ## Run
//!
//! 1. Flush buffered queue writes
//! 2. Read events newer than the index checkpoint
//! 3. Merge them into change records ordered by timestamp
//! 4. Above the threshold, request a full rebuild; otherwise submit the records
//! 5. Wait for the job; completed jobs advance the checkpoint
//!
//! ## Example
//!
//! ```ignore
//! use reindex_strategy::{AsynchronousStrategy, Database, DatabaseRegistry, IndexCustodian};
//!
//! let registry = DatabaseRegistry::new();
//! let database = registry.register(Database::from_storage("master", storage.clone()));
//! let custodian = Arc::new(IndexCustodian::new(database, index.clone(), bus.clone()));
//!
//! let strategy = AsynchronousStrategy::new("master", &registry, settings, custodian, bus)?;
//! strategy.initialize(index);
//! let outcome = strategy.run().await?;
//! ```
//!
//! [`ChangeRecord`]: reindex_types::ChangeRecord

pub mod bucket;
pub mod custodian;
pub mod database;
pub mod error;
pub mod extract;
pub mod index;
pub mod jobs;
pub mod log;
pub mod merge;
pub mod rebuild;
pub mod repository;
pub mod resolve;
pub mod signals;
pub mod strategy;
pub mod summary;
pub mod threshold;
pub mod updater;

pub use bucket::BucketMap;
pub use custodian::IndexCustodian;
pub use database::{Database, DatabaseRegistry};
pub use error::StrategyError;
pub use extract::{extract, Extracted};
pub use index::{SearchIndex, StoredIndex};
pub use jobs::{JobHandle, JobOutcome, JobRequest, JobResult, JobScheduler};
pub use log::{read_since, EventLog};
pub use merge::ChangeMerger;
pub use rebuild::{
    rebuild_index, LoggingProgressCallback, NoOpProgressCallback, ProgressCallback,
    RebuildProgress,
};
pub use repository::Repository;
pub use resolve::{IndexAction, UpdateResolver, UpdateScope};
pub use signals::{IndexingListener, IndexingSignal, SignalBus, SubscriptionId};
pub use strategy::{AsynchronousStrategy, IntervalStrategy, RunOutcome};
pub use summary::IndexSummary;
pub use threshold::{Decision, ThresholdPolicy};
pub use updater::{ActionEffect, IndexUpdater, UpdateResult};
