//! Weight-bounded LRU cache with lazy age expiry.
//!
//! # Entry lifecycle
//!
//! ```text
//! absent ── insert ──→ present ── get ──→ promoted (most recent)
//!                         │
//!                         ├── remove / replace ──→ gone (not an eviction)
//!                         └── age or size pressure ──→ evicted
//! ```
//!
//! Only automatic eviction counts towards [`CacheStats::evictions`]. Expired
//! entries are discovered when touched; there is no background sweep.
//!
//! Recency is tracked with a monotonically increasing tick per entry and an
//! ordered tick index, so the least recently used entry is always the first
//! key of the index.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::traits::CacheStats;

/// Computes the weight of an entry.
pub type Weigher<K, V> = Arc<dyn Fn(&K, &V) -> usize + Send + Sync>;

struct Entry<V> {
    value: V,
    weight: usize,
    tick: u64,
    written_at: Instant,
}

struct LruState<K, V> {
    entries: HashMap<K, Entry<V>>,
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    total_weight: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Eq + Hash + Clone, V> LruState<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            next_tick: 0,
            total_weight: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn detach(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        self.total_weight -= entry.weight;
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.total_weight -= entry.weight;
            self.evictions += 1;
        }
        true
    }
}

/// Thread-safe weighted LRU cache.
pub struct LruCache<K, V> {
    state: Mutex<LruState<K, V>>,
    weigher: Weigher<K, V>,
    max_weight: usize,
    expire_after: Option<Duration>,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache holding at most `max_weight` total weight.
    pub fn new(max_weight: usize, weigher: Weigher<K, V>) -> Self {
        Self {
            state: Mutex::new(LruState::new()),
            weigher,
            max_weight,
            expire_after: None,
        }
    }

    /// Entries older than `expire_after` since their last write are treated as
    /// absent.
    pub fn with_expire_after(mut self, expire_after: Option<Duration>) -> Self {
        self.expire_after = expire_after;
        self
    }

    fn state(&self) -> MutexGuard<'_, LruState<K, V>> {
        // Every mutation leaves the state consistent before it can panic.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        self.expire_after
            .is_some_and(|limit| now.duration_since(entry.written_at) >= limit)
    }

    /// Look up `key`, promoting it to most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state();
        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            state.detach(key);
            state.evictions += 1;
            state.misses += 1;
            return None;
        }

        let tick = state.tick();
        let state = &mut *state;
        let entry = state.entries.get_mut(key)?;
        state.recency.remove(&entry.tick);
        entry.tick = tick;
        state.recency.insert(tick, key.clone());
        state.hits += 1;
        Some(entry.value.clone())
    }

    /// Look up `key` without promoting it or touching hit/miss counters.
    /// Expired entries read as absent.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let state = self.state();
        state
            .entries
            .get(key)
            .filter(|entry| !self.is_expired(entry, now))
            .map(|entry| entry.value.clone())
    }

    /// Insert or replace `key`, then evict least recently used entries until
    /// the total weight fits. Returns the replaced value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let weight = (self.weigher)(&key, &value);
        let now = Instant::now();
        let mut state = self.state();

        let replaced = match state.detach(&key) {
            Some(old) if self.is_expired(&old, now) => {
                state.evictions += 1;
                None
            }
            old => old.map(|old| old.value),
        };

        let tick = state.tick();
        state.recency.insert(tick, key.clone());
        state.entries.insert(
            key,
            Entry {
                value,
                weight,
                tick,
                written_at: now,
            },
        );
        state.total_weight += weight;

        while state.total_weight > self.max_weight {
            if !state.evict_lru() {
                break;
            }
        }
        replaced
    }

    /// Remove `key` explicitly. Expired entries are dropped but not returned.
    pub fn remove(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut state = self.state();
        let entry = state.detach(key)?;
        if self.is_expired(&entry, now) {
            state.evictions += 1;
            return None;
        }
        Some(entry.value)
    }

    /// Remove every live entry matching `predicate`. Expired entries met
    /// during the scan are evicted.
    pub fn remove_where(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let now = Instant::now();
        let mut state = self.state();

        let mut expired = Vec::new();
        let mut matched = Vec::new();
        for (key, entry) in &state.entries {
            if self.is_expired(entry, now) {
                expired.push(key.clone());
            } else if predicate(key, &entry.value) {
                matched.push(key.clone());
            }
        }

        for key in expired {
            state.detach(&key);
            state.evictions += 1;
        }
        matched
            .into_iter()
            .filter_map(|key| state.detach(&key).map(|entry| (key, entry.value)))
            .collect()
    }

    /// Drop every entry without counting evictions.
    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.recency.clear();
        state.total_weight = 0;
    }

    /// Live entries from least to most recently used, without promoting them.
    pub fn snapshot(&self) -> Vec<(K, V)> {
        let now = Instant::now();
        let state = self.state();
        state
            .recency
            .values()
            .filter_map(|key| {
                let entry = state.entries.get(key)?;
                (!self.is_expired(entry, now)).then(|| (key.clone(), entry.value.clone()))
            })
            .collect()
    }

    /// Number of stored entries (expired ones included until touched).
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current total weight.
    pub fn weight(&self) -> usize {
        self.state().total_weight
    }

    pub fn max_weight(&self) -> usize {
        self.max_weight
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entry_count: state.entries.len() as u64,
            memory_bytes: state.total_weight as u64,
            evictions: state.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn by_len() -> Weigher<String, String> {
        Arc::new(|_key: &String, value: &String| value.len())
    }

    fn cache(max_weight: usize) -> LruCache<String, String> {
        LruCache::new(max_weight, by_len())
    }

    fn keys(cache: &LruCache<String, String>) -> Vec<String> {
        cache.snapshot().into_iter().map(|(k, _)| k).collect()
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = cache(100);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());
        assert_eq!(keys(&cache), vec!["a", "b"]);

        assert_eq!(cache.get(&"a".to_string()), Some("1".to_string()));
        assert_eq!(keys(&cache), vec!["b", "a"]);
    }

    #[test]
    fn test_peek_neither_promotes_nor_counts() {
        let cache = cache(100);
        cache.insert("a".into(), "1".into());
        cache.insert("b".into(), "2".into());

        assert_eq!(cache.peek(&"a".to_string()), Some("1".to_string()));
        assert_eq!(cache.peek(&"zzz".to_string()), None);
        assert_eq!(keys(&cache), vec!["a", "b"]);
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_size_pressure_evicts_least_recent() {
        let cache = cache(10);
        cache.insert("a".into(), "aaaa".into());
        cache.insert("b".into(), "bbbb".into());
        cache.get(&"a".to_string());
        cache.insert("c".into(), "cccc".into());

        assert_eq!(keys(&cache), vec!["a", "c"]);
        assert_eq!(cache.weight(), 8);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_replacement_recomputes_weight_without_eviction() {
        let cache = cache(10);
        cache.insert("a".into(), "aaaa".into());
        let old = cache.insert("a".into(), "aaaaaaa".into());
        assert_eq!(old.as_deref(), Some("aaaa"));
        assert_eq!(cache.weight(), 7);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_oversized_entry_is_evicted() {
        let cache = cache(3);
        cache.insert("a".into(), "aaaaa".into());
        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_explicit_remove_is_not_an_eviction() {
        let cache = cache(10);
        cache.insert("a".into(), "a".into());
        assert_eq!(cache.remove(&"a".to_string()).as_deref(), Some("a"));
        assert_eq!(cache.remove(&"a".to_string()), None);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.weight(), 0);
    }

    #[test]
    fn test_expired_entry_evicted_lazily() {
        let cache = cache(100).with_expire_after(Some(Duration::from_millis(20)));
        cache.insert("a".into(), "1".into());
        thread::sleep(Duration::from_millis(60));

        // Still stored until touched.
        assert_eq!(cache.len(), 1);
        assert!(keys(&cache).is_empty());

        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_remove_where_returns_matches() {
        let cache = cache(100);
        cache.insert("user:1".into(), "a".into());
        cache.insert("user:2".into(), "b".into());
        cache.insert("post:1".into(), "c".into());

        let mut removed: Vec<String> = cache
            .remove_where(|k, _| k.starts_with("user:"))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        removed.sort();
        assert_eq!(removed, vec!["user:1", "user:2"]);
        assert_eq!(keys(&cache), vec!["post:1"]);
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = cache(100);
        cache.insert("a".into(), "1".into());
        cache.get(&"a".to_string());
        cache.get(&"zzz".to_string());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.memory_bytes, 1);
    }

    #[test]
    fn test_clear_resets_weight() {
        let cache = cache(100);
        cache.insert("a".into(), "12345".into());
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
    }
}
