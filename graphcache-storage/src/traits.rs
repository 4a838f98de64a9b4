//! The store contract shared by every cache tier.

use std::collections::{BTreeMap, BTreeSet};

use graphcache_core::{CacheHeaders, CacheKey, CacheResult, Record, RecordMerger};

/// Snapshot of a store's contents, keyed by tier name.
pub type CacheDump = BTreeMap<&'static str, BTreeMap<CacheKey, Record>>;

/// A normalized record store.
///
/// Every operation is synchronous and runs on the caller's thread. Tiers can be
/// chained: a tier that owns a successor forwards writes to it and falls back
/// to it on read misses.
///
/// # Failure semantics
///
/// Storage failures never escape the tier boundary. They are reported to the
/// process-wide hook (see [`crate::hook`]) and the call degrades to an empty
/// result. The only error surfaced to callers is a malformed removal pattern.
pub trait NormalizedCache: Send + Sync {
    /// Name of this tier in [`NormalizedCache::dump`] output.
    fn name(&self) -> &'static str;

    /// Load one record.
    fn load_record(&self, key: &CacheKey, headers: &CacheHeaders) -> Option<Record>;

    /// Load several records. Missing keys are simply absent from the result.
    fn load_records(&self, keys: &[CacheKey], headers: &CacheHeaders) -> Vec<Record>;

    /// Merge one record and return the changed field keys.
    fn merge(
        &self,
        record: Record,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        self.merge_records(vec![record], headers, merger)
    }

    /// Merge several records and return the changed field keys.
    fn merge_records(
        &self,
        records: Vec<Record>,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String>;

    /// Remove one record, optionally cascading through its references.
    fn remove(&self, key: &CacheKey, cascade: bool) -> bool {
        self.remove_keys(std::slice::from_ref(key), cascade) > 0
    }

    /// Remove several records, optionally cascading. Returns how many were removed.
    fn remove_keys(&self, keys: &[CacheKey], cascade: bool) -> usize;

    /// Remove every record whose key matches `pattern`.
    fn remove_matching(&self, pattern: &str) -> CacheResult<usize>;

    /// Remove every record whose type is one of `types`.
    fn remove_by_types(&self, types: &[&str]) -> usize;

    /// Drop everything.
    fn clear_all(&self);

    /// Diagnostic snapshot of this tier and its successors.
    fn dump(&self) -> CacheDump;

    /// Shrink persistent storage once it reaches `max_size_bytes`. Returns the
    /// resulting size, or `None` when no tier has a size to trim.
    fn trim(&self, max_size_bytes: u64, trim_factor: f32) -> Option<u64>;
}

impl<T: NormalizedCache + ?Sized> NormalizedCache for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn load_record(&self, key: &CacheKey, headers: &CacheHeaders) -> Option<Record> {
        (**self).load_record(key, headers)
    }

    fn load_records(&self, keys: &[CacheKey], headers: &CacheHeaders) -> Vec<Record> {
        (**self).load_records(keys, headers)
    }

    fn merge(
        &self,
        record: Record,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        (**self).merge(record, headers, merger)
    }

    fn merge_records(
        &self,
        records: Vec<Record>,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        (**self).merge_records(records, headers, merger)
    }

    fn remove(&self, key: &CacheKey, cascade: bool) -> bool {
        (**self).remove(key, cascade)
    }

    fn remove_keys(&self, keys: &[CacheKey], cascade: bool) -> usize {
        (**self).remove_keys(keys, cascade)
    }

    fn remove_matching(&self, pattern: &str) -> CacheResult<usize> {
        (**self).remove_matching(pattern)
    }

    fn remove_by_types(&self, types: &[&str]) -> usize {
        (**self).remove_by_types(types)
    }

    fn clear_all(&self) {
        (**self).clear_all();
    }

    fn dump(&self) -> CacheDump {
        (**self).dump()
    }

    fn trim(&self, max_size_bytes: u64, trim_factor: f32) -> Option<u64> {
        (**self).trim(max_size_bytes, trim_factor)
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate memory usage in bytes.
    pub memory_bytes: u64,
    /// Number of automatic evictions (size pressure or age).
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }
}
