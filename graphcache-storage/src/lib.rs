//! graphcache Storage - Cache Tiers
//!
//! The [`NormalizedCache`] contract and its two tiers: a bounded in-memory
//! LRU ([`MemoryCache`]) and a persistent SQLite store
//! ([`SqlNormalizedCache`]). A memory tier can own a next tier, forming a
//! read-through / write-through chain; [`build_chain`] assembles one from a
//! [`graphcache_core::ChainConfig`].

pub mod factory;
pub mod hook;
pub mod lock;
pub mod lru;
pub mod memory;
pub mod sql;
pub mod traits;

pub use factory::build_chain;
pub use hook::{report, reset_error_hook, set_error_hook, ErrorHook};
pub use lock::{NoopLock, RwScopedLock, ScopedLock, TierLock};
pub use lru::{LruCache, Weigher};
pub use memory::{record_weigher, MemoryCache, MEMORY_TIER};
pub use sql::{SqlCacheError, SqlNormalizedCache, SQL_TIER};
pub use traits::{CacheDump, CacheStats, NormalizedCache};
