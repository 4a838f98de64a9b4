//! graphcache Core - Record Model and Merge Strategies
//!
//! Data types shared by every cache tier: cache keys, records and their
//! values, cache headers, key patterns, merge strategies and the freshness
//! resolver. This crate holds no storage; tiers live in `graphcache-storage`.

pub mod config;
pub mod error;
pub mod freshness;
pub mod headers;
pub mod key;
pub mod merge;
pub mod pagination;
pub mod pattern;
pub mod record;
pub mod weigher;

pub use config::{ChainConfig, MemoryCacheConfig, SqlCacheConfig, TierConfig};
pub use error::{CacheError, CacheResult, ConfigError, PatternError, StorageError};
pub use freshness::{ExpirationResolver, FieldRead};
pub use headers::{CacheHeaders, CacheHeadersBuilder};
pub use key::{field_key, CacheKey};
pub use merge::{
    DefaultRecordMerger, FieldInfo, FieldMerger, FieldRecordMerger, MergeContext, RecordMerger,
};
pub use pagination::{ConnectionFieldMerger, OffsetWindowFieldMerger};
pub use pattern::KeyPattern;
pub use record::{FieldError, FieldMetadata, Record, RecordValue};
pub use weigher::RecordWeigher;
