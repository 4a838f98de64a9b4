//! Error types for graphcache operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Corrupted record {key}: {reason}")]
    CorruptedRecord { key: String, reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors raised while parsing a key removal pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("Invalid escape sequence '\\{escaped}' at position {position} in pattern {pattern:?}")]
    InvalidEscape {
        pattern: String,
        position: usize,
        escaped: char,
    },

    #[error("Dangling escape at end of pattern {pattern:?}")]
    DanglingEscape { pattern: String },

    #[error("Pattern {pattern:?} could not be compiled: {reason}")]
    Compile { pattern: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all graphcache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for graphcache operations.
pub type CacheResult<T> = Result<T, CacheError>;

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationFailed {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Storage(e.into())
    }
}

// =============================================================================
// TESTS
// =============================================================================
