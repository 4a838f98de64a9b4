//! Persistent tier backed by SQLite.
//!
//! One row per record, see [`schema`] for the layout. Multi-row writes and
//! cascading deletes run inside a transaction; statements binding more than
//! the configured parameter limit are split into chunks.

mod cache;
mod database;
pub mod schema;

pub use cache::{SqlNormalizedCache, SQL_TIER};

use graphcache_core::{CacheError, StorageError};

/// Error type for SQLite cache operations.
#[derive(Debug, thiserror::Error)]
pub enum SqlCacheError {
    /// Any SQLite failure.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored blob could not be decoded.
    #[error("Corrupted record {key}: {reason}")]
    Corrupted { key: String, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SqlCacheError> for StorageError {
    fn from(e: SqlCacheError) -> Self {
        match e {
            SqlCacheError::Sqlite(e) => StorageError::QueryFailed {
                reason: e.to_string(),
            },
            SqlCacheError::Corrupted { key, reason } => {
                StorageError::CorruptedRecord { key, reason }
            }
            SqlCacheError::Serialization(e) => StorageError::SerializationFailed {
                reason: e.to_string(),
            },
            SqlCacheError::Io(e) => StorageError::TransactionFailed {
                reason: e.to_string(),
            },
        }
    }
}

/// Convert SqlCacheError to CacheError.
impl From<SqlCacheError> for CacheError {
    fn from(e: SqlCacheError) -> Self {
        CacheError::Storage(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_maps_to_storage_error() {
        let err: CacheError = SqlCacheError::Corrupted {
            key: "user:1".to_string(),
            reason: "EOF".to_string(),
        }
        .into();
        assert_eq!(
            err,
            CacheError::Storage(StorageError::CorruptedRecord {
                key: "user:1".to_string(),
                reason: "EOF".to_string(),
            })
        );
    }

    #[test]
    fn test_sqlite_errors_map_to_query_failed() {
        let err: StorageError = SqlCacheError::Sqlite(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(err, StorageError::QueryFailed { .. }));
    }
}
