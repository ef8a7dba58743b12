//! Error types for the response cache engine
//!
//! Only validation errors ever reach a caller of `lookup`/`store`. Storage
//! errors are produced by [`crate::cache::CacheStore`] implementations and the
//! degradation guard, then swallowed by the engine after being logged.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Query was empty (or whitespace/punctuation only)
    #[error("Validation error: query is empty")]
    EmptyQuery,

    /// Language code outside the supported set
    #[error("Validation error: unsupported language '{0}'")]
    UnsupportedLanguage(String),

    /// Confidence score outside [0.0, 1.0] or NaN
    #[error("Validation error: confidence score {0} is outside [0.0, 1.0]")]
    InvalidConfidence(f64),

    /// Storage backend failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Storage operation exceeded its time budget
    #[error("Storage operation timed out after {timeout_ms}ms: {context}")]
    TimeoutError { timeout_ms: u64, context: String },

    /// Degradation guard is open and bypassing storage
    #[error("Circuit open: storage bypassed")]
    CircuitOpen,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl CacheError {
    /// Errors the caller caused and must fix before retrying
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CacheError::EmptyQuery
                | CacheError::UnsupportedLanguage(_)
                | CacheError::InvalidConfidence(_)
        )
    }

    /// Errors that count against the degradation guard
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            CacheError::StorageUnavailable(_) | CacheError::TimeoutError { .. }
        )
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
