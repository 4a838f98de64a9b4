//! Bounded in-memory tier.
//!
//! Records live in a weight-bounded LRU. When a next tier is attached the
//! memory tier becomes the front of a chain:
//!
//! - reads that miss here fall through to the next tier and the hit is
//!   written back
//! - merges are applied here and the original incoming records are forwarded
//! - removals run in both tiers independently
//!
//! Combined operations run under a reader/writer guard that only exists once a
//! next tier is attached.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use graphcache_core::headers::{
    DO_NOT_STORE, EVICT_AFTER_READ, EXPIRATION_DATE, RECEIVED_DATE,
};
use graphcache_core::{
    CacheHeaders, CacheKey, CacheResult, KeyPattern, MemoryCacheConfig, MergeContext, Record,
    RecordMerger, RecordWeigher,
};
use tracing::{debug, trace};

use crate::lock::{ScopedLock, TierLock};
use crate::lru::{LruCache, Weigher};
use crate::traits::{CacheDump, CacheStats, NormalizedCache};

/// Tier name reported in dumps.
pub const MEMORY_TIER: &str = "memory";

/// The default weigher, [`RecordWeigher::weigh`].
pub fn record_weigher() -> Weigher<CacheKey, Record> {
    Arc::new(|_key: &CacheKey, record: &Record| RecordWeigher::weigh(record))
}

/// In-memory record store with optional next tier.
pub struct MemoryCache {
    lru: LruCache<CacheKey, Record>,
    next: Option<Box<dyn NormalizedCache>>,
    lock: TierLock,
    config: MemoryCacheConfig,
}

impl MemoryCache {
    /// Standalone tier.
    pub fn new(config: MemoryCacheConfig) -> CacheResult<Self> {
        Self::build(config, None)
    }

    /// Tier that forwards to `next`.
    pub fn with_next(config: MemoryCacheConfig, next: Box<dyn NormalizedCache>) -> CacheResult<Self> {
        Self::build(config, Some(next))
    }

    fn build(config: MemoryCacheConfig, next: Option<Box<dyn NormalizedCache>>) -> CacheResult<Self> {
        config.validate()?;
        let lru = LruCache::new(config.max_size_bytes, record_weigher())
            .with_expire_after(config.expire_after);
        Ok(Self {
            lru,
            lock: TierLock::for_chain(next.is_some()),
            next,
            config,
        })
    }

    /// Replace the weigher. Only meaningful before the first write, since the
    /// eviction engine is rebuilt empty.
    pub fn with_weigher(mut self, weigher: Weigher<CacheKey, Record>) -> Self {
        self.lru = LruCache::new(self.config.max_size_bytes, weigher)
            .with_expire_after(self.config.expire_after);
        self
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// The next tier, if chained.
    pub fn next(&self) -> Option<&dyn NormalizedCache> {
        self.next.as_deref()
    }

    /// Usage statistics of this tier only.
    pub fn stats(&self) -> CacheStats {
        self.lru.stats()
    }

    fn stamp(&self, record: &Record, headers: &CacheHeaders) -> Record {
        if !self.config.track_dates {
            return record.clone();
        }
        record.clone().with_dates(
            headers.header_i64(RECEIVED_DATE),
            headers.header_i64(EXPIRATION_DATE),
        )
    }

    fn merge_local(
        &self,
        incoming: Record,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        let (stored, changed) = match self.lru.peek(&incoming.key) {
            None => {
                let changed = incoming.field_keys();
                (incoming, changed)
            }
            Some(existing) => merger.merge(MergeContext::new(&existing, &incoming, headers)),
        };
        self.lru.insert(stored.key.clone(), stored);
        changed
    }

    fn load_local(&self, key: &CacheKey, evict: bool) -> Option<Record> {
        let record = self.lru.get(key)?;
        if evict {
            self.lru.remove(key);
        }
        Some(record)
    }

    /// Breadth-first removal through this tier's own records.
    fn remove_local(&self, keys: &[CacheKey], cascade: bool) -> usize {
        let mut visited = BTreeSet::new();
        let mut frontier: VecDeque<CacheKey> = keys.iter().cloned().collect();
        let mut removed = 0;
        while let Some(key) = frontier.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let Some(record) = self.lru.remove(&key) else {
                continue;
            };
            removed += 1;
            if cascade {
                frontier.extend(
                    record
                        .referenced_keys()
                        .into_iter()
                        .filter(|reference| !visited.contains(reference)),
                );
            }
        }
        removed
    }
}

impl NormalizedCache for MemoryCache {
    fn name(&self) -> &'static str {
        MEMORY_TIER
    }

    fn load_record(&self, key: &CacheKey, headers: &CacheHeaders) -> Option<Record> {
        let evict = headers.has_header(EVICT_AFTER_READ);
        self.lock.read(|| {
            if let Some(record) = self.load_local(key, evict) {
                return Some(record);
            }
            let record = self.next.as_ref()?.load_record(key, headers)?;
            if !evict {
                trace!(key = %key, "repopulating memory tier");
                self.lru.insert(key.clone(), record.clone());
            }
            Some(record)
        })
    }

    fn load_records(&self, keys: &[CacheKey], headers: &CacheHeaders) -> Vec<Record> {
        let evict = headers.has_header(EVICT_AFTER_READ);
        self.lock.read(|| {
            let mut found: BTreeMap<CacheKey, Record> = BTreeMap::new();
            let mut missing = Vec::new();
            for key in keys {
                match self.load_local(key, evict) {
                    Some(record) => {
                        found.insert(key.clone(), record);
                    }
                    None => missing.push(key.clone()),
                }
            }

            let next = self.next.as_ref().filter(|_| !missing.is_empty());
            if let Some(next) = next {
                for record in next.load_records(&missing, headers) {
                    if !evict {
                        self.lru.insert(record.key.clone(), record.clone());
                    }
                    found.insert(record.key.clone(), record);
                }
            }

            keys.iter().filter_map(|key| found.remove(key)).collect()
        })
    }

    fn merge_records(
        &self,
        records: Vec<Record>,
        headers: &CacheHeaders,
        merger: &dyn RecordMerger,
    ) -> BTreeSet<String> {
        if headers.has_header(DO_NOT_STORE) {
            return BTreeSet::new();
        }
        self.lock.write(|| {
            let mut changed = BTreeSet::new();
            for record in &records {
                changed.extend(self.merge_local(self.stamp(record, headers), headers, merger));
            }
            debug!(
                tier = MEMORY_TIER,
                records = records.len(),
                changed = changed.len(),
                "merged records"
            );
            if let Some(next) = &self.next {
                changed.extend(next.merge_records(records, headers, merger));
            }
            changed
        })
    }

    fn remove_keys(&self, keys: &[CacheKey], cascade: bool) -> usize {
        self.lock.write(|| {
            let local = self.remove_local(keys, cascade);
            let forwarded = self
                .next
                .as_ref()
                .map_or(0, |next| next.remove_keys(keys, cascade));
            debug!(tier = MEMORY_TIER, local, forwarded, cascade, "removed records");
            local.max(forwarded)
        })
    }

    fn remove_matching(&self, pattern: &str) -> CacheResult<usize> {
        let compiled = KeyPattern::parse(pattern)?;
        self.lock.write(|| -> CacheResult<usize> {
            let local = self
                .lru
                .remove_where(|key, _| compiled.matches(key.as_str()))
                .len();
            let forwarded = match &self.next {
                Some(next) => next.remove_matching(pattern)?,
                None => 0,
            };
            Ok(local.max(forwarded))
        })
    }

    fn remove_by_types(&self, types: &[&str]) -> usize {
        self.lock.write(|| {
            let local = self
                .lru
                .remove_where(|_, record| types.contains(&record.type_name.as_str()))
                .len();
            let forwarded = self
                .next
                .as_ref()
                .map_or(0, |next| next.remove_by_types(types));
            local.max(forwarded)
        })
    }

    fn clear_all(&self) {
        self.lock.write(|| {
            self.lru.clear();
            if let Some(next) = &self.next {
                next.clear_all();
            }
        });
    }

    fn dump(&self) -> CacheDump {
        self.lock.read(|| {
            let mut dump = self.next.as_ref().map(|next| next.dump()).unwrap_or_default();
            dump.insert(MEMORY_TIER, self.lru.snapshot().into_iter().collect());
            dump
        })
    }

    fn trim(&self, max_size_bytes: u64, trim_factor: f32) -> Option<u64> {
        let next = self.next.as_ref()?;
        self.lock.write(|| next.trim(max_size_bytes, trim_factor))
    }
}
