//! Error types shared across content-reindex crates.

use thiserror::Error;

/// Unified error type for domain and configuration failures.
#[derive(Debug, Error)]
pub enum ReindexError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReindexError::Config("database 'web' was not found".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: database 'web' was not found"
        );

        let err = ReindexError::NotFound("index 'sitecore_web_index'".to_string());
        assert_eq!(err.to_string(), "Not found: index 'sitecore_web_index'");
    }
}
