//! Persisted per-index metadata.
//!
//! The summary holds the index checkpoint: the queue timestamp up to which
//! changes have been applied. It is written next to the index documents so
//! that a restart resumes from where the last completed job stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

/// Metadata kept for one index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSummary {
    pub index_name: String,

    /// Last applied queue timestamp; `None` until the first update
    #[serde(default)]
    pub last_updated_timestamp: Option<i64>,

    /// Wall-clock time of the last update (milliseconds since epoch for JSON compatibility)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,

    /// Total change records applied since creation
    #[serde(default)]
    pub applied_count: u64,

    /// Number of completed full rebuilds
    #[serde(default)]
    pub rebuild_count: u64,

    /// When this summary was first created (milliseconds since epoch)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl IndexSummary {
    pub fn new(index_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            index_name: index_name.into(),
            last_updated_timestamp: None,
            last_updated: now,
            applied_count: 0,
            rebuild_count: 0,
            created_at: now,
        }
    }

    /// Move the checkpoint forward. A timestamp at or behind the current
    /// checkpoint leaves it unchanged. Returns whether it moved.
    pub fn advance(&mut self, timestamp: i64, applied: u64) -> bool {
        self.applied_count += applied;
        self.last_updated = Utc::now();

        match self.last_updated_timestamp {
            Some(current) if current >= timestamp => false,
            _ => {
                self.last_updated_timestamp = Some(timestamp);
                true
            }
        }
    }

    pub fn record_rebuild(&mut self) {
        self.rebuild_count += 1;
        self.last_updated = Utc::now();
    }

    /// Serialize to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, StrategyError> {
        serde_json::to_vec(self).map_err(StrategyError::from)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StrategyError> {
        serde_json::from_slice(bytes).map_err(StrategyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_new() {
        let summary = IndexSummary::new("web_index");
        assert_eq!(summary.index_name, "web_index");
        assert_eq!(summary.last_updated_timestamp, None);
        assert_eq!(summary.applied_count, 0);
    }

    #[test]
    fn test_advance_never_regresses() {
        let mut summary = IndexSummary::new("web_index");
        assert!(summary.advance(50, 10));
        assert!(!summary.advance(40, 5));
        assert!(!summary.advance(50, 0));
        assert_eq!(summary.last_updated_timestamp, Some(50));
        assert_eq!(summary.applied_count, 15);

        assert!(summary.advance(51, 1));
        assert_eq!(summary.last_updated_timestamp, Some(51));
    }

    #[test]
    fn test_summary_serialization_roundtrip() {
        let mut summary = IndexSummary::new("web_index");
        summary.advance(42, 3);
        summary.record_rebuild();

        let decoded = IndexSummary::from_bytes(&summary.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.index_name, "web_index");
        assert_eq!(decoded.last_updated_timestamp, Some(42));
        assert_eq!(decoded.applied_count, 3);
        assert_eq!(decoded.rebuild_count, 1);
        // JSON keeps millisecond precision
        assert_eq!(
            summary.created_at.timestamp_millis(),
            decoded.created_at.timestamp_millis()
        );
    }

    #[test]
    fn test_summary_json_format() {
        let summary = IndexSummary::new("web_index");
        let json_str = String::from_utf8(summary.to_bytes().unwrap()).unwrap();

        assert!(json_str.contains("\"index_name\":\"web_index\""));
        assert!(json_str.contains("\"last_updated_timestamp\":null"));
        assert!(json_str.contains("\"created_at\":"));
    }
}
