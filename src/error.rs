//! Error types for Hearsay.

use thiserror::Error;

/// Library-level error type for Hearsay operations.
#[derive(Error, Debug)]
pub enum HearsayError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Document not found: {0}. Submit it for processing first.")]
    NotFound(String),

    #[error("Insufficient context: {0}")]
    InsufficientContext(String),

    #[error("Upstream provider failed: {0}")]
    Upstream(String),

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("No usable text after normalization: {0}")]
    EmptyInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Chunk store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),
}

impl HearsayError {
    /// Build a timeout error for a named provider call.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        HearsayError::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Whether a caller with a fallback path may recover from this error.
    ///
    /// Timeouts are an upstream failure like any other.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HearsayError::Upstream(_)
                | HearsayError::Timeout { .. }
                | HearsayError::OpenAI(_)
                | HearsayError::Http(_)
                | HearsayError::Embedding(_)
        )
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HearsayError::Validation(_) | HearsayError::EmptyInput(_) => ErrorKind::Validation,
            HearsayError::NotFound(_) => ErrorKind::NotFound,
            HearsayError::InsufficientContext(_) => ErrorKind::InsufficientContext,
            HearsayError::Timeout { .. } => ErrorKind::Timeout,
            HearsayError::Upstream(_)
            | HearsayError::OpenAI(_)
            | HearsayError::Http(_)
            | HearsayError::Embedding(_) => ErrorKind::Upstream,
            _ => ErrorKind::Internal,
        }
    }
}

/// Error classes as reported to callers of the question pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientContext,
    Upstream,
    Timeout,
    Internal,
}

/// Result type alias for Hearsay operations.
pub type Result<T> = std::result::Result<T, HearsayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_is_recoverable_upstream() {
        let err = HearsayError::timeout("lexical search", Duration::from_millis(1500));
        assert!(err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.to_string(), "lexical search timed out after 1500ms");
    }

    #[test]
    fn test_validation_is_not_recoverable() {
        let err = HearsayError::Validation("question is empty".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
