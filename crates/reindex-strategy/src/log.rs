//! Event log reader.

use reindex_storage::Storage;
use reindex_types::{ChangeEvent, EventType};

use crate::error::StrategyError;

/// The repository's change event queue.
pub trait EventLog: Send + Sync {
    /// Events whose timestamp is strictly greater than `since` and whose
    /// type is listed, in log order.
    fn query(&self, since: i64, types: &[EventType]) -> Result<Vec<ChangeEvent>, StrategyError>;

    /// Make buffered events visible to [`EventLog::query`].
    fn flush(&self) -> Result<(), StrategyError>;

    fn last_event(&self) -> Result<Option<ChangeEvent>, StrategyError>;
}

/// Every recognised event after `since` (0 when unset).
pub fn read_since(log: &dyn EventLog, since: Option<i64>) -> Result<Vec<ChangeEvent>, StrategyError> {
    log.query(since.unwrap_or(0), &EventType::ALL)
}

impl EventLog for Storage {
    fn query(&self, since: i64, types: &[EventType]) -> Result<Vec<ChangeEvent>, StrategyError> {
        Ok(self.get_events_since(since, types)?)
    }

    fn flush(&self) -> Result<(), StrategyError> {
        self.flush_queued_events()?;
        Ok(())
    }

    fn last_event(&self) -> Result<Option<ChangeEvent>, StrategyError> {
        Ok(Storage::last_event(self)?)
    }
}
