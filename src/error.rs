//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its storage backends.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key absent or expired at the point of a mutating operation
    #[error("Item {0} not found")]
    NotFound(String),

    /// `add` on a key that still holds a live entry
    #[error("Item {0} already exists")]
    AlreadyExists(String),

    /// Arithmetic on a non-numeric or wrong-width value
    #[error("The value for {key} is not {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    /// Configuration named a storage backend that does not exist
    #[error("Unknown storage type: {0}")]
    UnknownStorage(String),

    /// Configuration value that cannot be used
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Remote store failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Entry could not be encoded for, or decoded from, the remote store
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Background tasks were requested without a tokio runtime
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl CacheError {
    pub(crate) fn type_mismatch(key: &str, expected: &'static str) -> Self {
        CacheError::TypeMismatch {
            key: key.to_string(),
            expected,
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
