//! Named content databases and their registry.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use reindex_storage::Storage;

use crate::error::StrategyError;
use crate::log::EventLog;
use crate::repository::Repository;

/// A content database: its event queue and its item tree.
///
/// Either part may be absent. Strategies treat a missing part as a fatal
/// precondition for the run that needs it.
#[derive(Clone)]
pub struct Database {
    name: String,
    event_log: Option<Arc<dyn EventLog>>,
    repository: Option<Arc<dyn Repository>>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            event_log: None,
            repository: None,
        }
    }

    /// Database whose queue and tree are both served by `storage`.
    pub fn from_storage(name: impl Into<String>, storage: Arc<Storage>) -> Self {
        Self::new(name)
            .with_event_log(storage.clone())
            .with_repository(storage)
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn event_log(&self) -> Option<&Arc<dyn EventLog>> {
        self.event_log.as_ref()
    }

    pub fn repository(&self) -> Option<&Arc<dyn Repository>> {
        self.repository.as_ref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("event_log", &self.event_log.is_some())
            .field("repository", &self.repository.is_some())
            .finish()
    }
}

/// Databases known to the process, by name.
#[derive(Default)]
pub struct DatabaseRegistry {
    databases: DashMap<String, Arc<Database>>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a database, replacing any previous one of the same name.
    pub fn register(&self, database: Database) -> Arc<Database> {
        let database = Arc::new(database);
        debug!(database = %database.name(), "Registered database");
        self.databases
            .insert(database.name().to_string(), database.clone());
        database
    }

    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.get(name).map(|entry| entry.value().clone())
    }

    /// Look a database up, failing with a configuration error when unknown.
    pub fn require(&self, name: &str) -> Result<Arc<Database>, StrategyError> {
        self.get(name)
            .ok_or_else(|| StrategyError::Config(format!("database '{}' not found", name)))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
