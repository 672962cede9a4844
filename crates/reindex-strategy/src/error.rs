//! Error types for the reconciliation strategies.

use reindex_storage::StorageError;
use reindex_types::ReindexError;
use thiserror::Error;

/// Errors that can occur while reconciling an index
#[derive(Error, Debug)]
pub enum StrategyError {
    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Invalid settings or unknown database/index
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared type error (settings, identifiers)
    #[error(transparent)]
    Types(#[from] ReindexError),

    /// Repository lookup failed
    #[error("Repository error: {0}")]
    Repository(String),

    /// Index write failed
    #[error("Index error: {0}")]
    Index(String),

    /// Dispatched job failed, was dropped, or timed out
    #[error("Job error: {0}")]
    Job(String),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StrategyError {
    fn from(err: serde_json::Error) -> Self {
        StrategyError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StrategyError::Config("database 'web' not found".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: database 'web' not found"
        );

        let err = StrategyError::Job("timed out after 5s".to_string());
        assert_eq!(err.to_string(), "Job error: timed out after 5s");
    }

    #[test]
    fn test_from_serde_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: StrategyError = json_err.into();
        assert!(matches!(err, StrategyError::Serialization(_)));
    }

    #[test]
    fn test_from_storage_error() {
        let err: StrategyError = StorageError::NotFound("summary".to_string()).into();
        assert!(matches!(err, StrategyError::Storage(_)));
    }
}
