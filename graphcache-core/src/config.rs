//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default memory budget for the in-memory tier (10 MiB).
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 10 * 1024 * 1024;

/// Default bound-parameter limit, the lowest common SQLite build limit.
pub const DEFAULT_MAX_PARAMETERS: usize = 999;

/// Configuration for the bounded in-memory tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Maximum total record weight before LRU eviction.
    pub max_size_bytes: usize,
    /// Records older than this (since their last write) are treated as absent.
    pub expire_after: Option<Duration>,
    /// Stamp RECEIVED_DATE / EXPIRATION_DATE headers into field metadata.
    pub track_dates: bool,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
            expire_after: None,
            track_dates: false,
        }
    }
}

impl MemoryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size_bytes(mut self, max_size_bytes: usize) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    pub fn with_expire_after(mut self, expire_after: Duration) -> Self {
        self.expire_after = Some(expire_after);
        self
    }

    pub fn with_date_tracking(mut self, enabled: bool) -> Self {
        self.track_dates = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size_bytes".to_string(),
                value: "0".to_string(),
                reason: "memory budget must be positive".to_string(),
            });
        }
        if self.expire_after == Some(Duration::ZERO) {
            return Err(ConfigError::InvalidValue {
                field: "expire_after".to_string(),
                value: "0s".to_string(),
                reason: "use None to disable age-based expiry".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the persistent SQLite tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlCacheConfig {
    /// Database file. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Maximum bound parameters per statement; larger batches are chunked.
    pub max_parameters: usize,
    /// Keep `received_date` / `expiration_date` columns.
    pub track_dates: bool,
}

impl Default for SqlCacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_parameters: DEFAULT_MAX_PARAMETERS,
            track_dates: false,
        }
    }
}

impl SqlCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_max_parameters(mut self, max_parameters: usize) -> Self {
        self.max_parameters = max_parameters;
        self
    }

    pub fn with_date_tracking(mut self, enabled: bool) -> Self {
        self.track_dates = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parameters == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_parameters".to_string(),
                value: "0".to_string(),
                reason: "at least one bound parameter is required".to_string(),
            });
        }
        Ok(())
    }
}

/// One tier of a cache chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TierConfig {
    Memory(MemoryCacheConfig),
    Sql(SqlCacheConfig),
}

/// Tiers from fastest to slowest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub tiers: Vec<TierConfig>,
}

impl ChainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory(mut self, config: MemoryCacheConfig) -> Self {
        self.tiers.push(TierConfig::Memory(config));
        self
    }

    pub fn with_sql(mut self, config: SqlCacheConfig) -> Self {
        self.tiers.push(TierConfig::Sql(config));
        self
    }

    /// Check every tier plus the chain shape: at least one tier, and a
    /// persistent tier only in last position since it never delegates.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "tiers".to_string(),
            });
        }
        let last = self.tiers.len() - 1;
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier {
                TierConfig::Memory(config) => config.validate()?,
                TierConfig::Sql(config) => {
                    config.validate()?;
                    if index != last {
                        return Err(ConfigError::InvalidValue {
                            field: format!("tiers[{index}]"),
                            value: "sql".to_string(),
                            reason: "the persistent tier must be last in the chain".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(MemoryCacheConfig::default().validate().is_ok());
        assert!(SqlCacheConfig::default().validate().is_ok());
        assert_eq!(SqlCacheConfig::default().max_parameters, 999);
    }

    #[test]
    fn test_builder_methods() {
        let memory = MemoryCacheConfig::new()
            .with_max_size_bytes(1024)
            .with_expire_after(Duration::from_secs(5))
            .with_date_tracking(true);
        assert_eq!(memory.max_size_bytes, 1024);
        assert_eq!(memory.expire_after, Some(Duration::from_secs(5)));
        assert!(memory.track_dates);

        let sql = SqlCacheConfig::new()
            .with_path("/tmp/cache.db")
            .with_max_parameters(100);
        assert_eq!(sql.path, Some(PathBuf::from("/tmp/cache.db")));
        assert_eq!(sql.max_parameters, 100);
    }

    #[test]
    fn test_zero_values_are_rejected() {
        assert!(MemoryCacheConfig::new().with_max_size_bytes(0).validate().is_err());
        assert!(MemoryCacheConfig::new()
            .with_expire_after(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SqlCacheConfig::new().with_max_parameters(0).validate().is_err());
    }

    #[test]
    fn test_chain_shape_validation() {
        assert!(matches!(
            ChainConfig::new().validate(),
            Err(ConfigError::MissingRequired { .. })
        ));

        let ok = ChainConfig::new()
            .with_memory(MemoryCacheConfig::default())
            .with_sql(SqlCacheConfig::default());
        assert!(ok.validate().is_ok());

        let bad = ChainConfig::new()
            .with_sql(SqlCacheConfig::default())
            .with_memory(MemoryCacheConfig::default());
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_chain_config_from_json() {
        let json = r#"{
            "tiers": [
                {"kind": "memory", "max_size_bytes": 2048},
                {"kind": "sql", "max_parameters": 250, "track_dates": true}
            ]
        }"#;
        let config: ChainConfig = serde_json::from_str(json).expect("parse config");
        assert_eq!(config.tiers.len(), 2);
        match &config.tiers[1] {
            TierConfig::Sql(sql) => {
                assert_eq!(sql.max_parameters, 250);
                assert!(sql.track_dates);
                assert!(sql.path.is_none());
            }
            other => panic!("expected sql tier, got {other:?}"),
        }
        assert!(config.validate().is_ok());
    }
}
