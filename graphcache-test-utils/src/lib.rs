//! graphcache Test Utilities
//!
//! Shared test infrastructure for the graphcache workspace:
//! - Proptest generators for keys, values and records
//! - Test fixtures for common record graphs and tier chains
//! - Custom assertions for cache results

pub use graphcache_core::{
    CacheError, CacheHeaders, CacheKey, CacheResult, DefaultRecordMerger, MemoryCacheConfig,
    Record, RecordValue, SqlCacheConfig,
};
pub use graphcache_storage::{MemoryCache, NormalizedCache, SqlNormalizedCache};

use std::collections::BTreeSet;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating cache data.

    use super::*;
    use graphcache_core::field_key;
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a type name such as `User`.
    pub fn arb_type_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,8}"
    }

    /// Generate a `Type:v1+v2` key. Values may contain the escaped characters.
    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (
            arb_type_name(),
            prop::collection::vec("[a-z0-9+\\\\]{1,6}", 1..3),
        )
            .prop_map(|(type_name, values)| CacheKey::from_type_and_values(&type_name, values))
    }

    /// Generate a bare field name or one with an `id` argument.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-z][a-zA-Z]{0,8}",
            ("[a-z]{1,6}", "[a-z0-9]{1,4}").prop_map(|(name, id)| {
                let id = JsonValue::from(id);
                field_key(&name, [("id", &id)])
            }),
        ]
    }

    /// Generate a non-nested value.
    pub fn arb_scalar_value() -> impl Strategy<Value = RecordValue> {
        prop_oneof![
            Just(RecordValue::Null),
            any::<bool>().prop_map(RecordValue::Boolean),
            any::<i64>().prop_map(RecordValue::Int),
            // Quarter steps survive a JSON round trip exactly.
            (-4000i32..4000).prop_map(|n| RecordValue::Float(f64::from(n) / 4.0)),
            "[a-zA-Z0-9 ]{0,16}".prop_map(RecordValue::String),
            arb_cache_key().prop_map(RecordValue::Reference),
        ]
    }

    /// Generate a value, possibly nested in lists and objects.
    pub fn arb_record_value() -> impl Strategy<Value = RecordValue> {
        arb_scalar_value().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(RecordValue::List),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(RecordValue::Object),
            ]
        })
    }

    /// Generate a record with one to five fields.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        (
            arb_cache_key(),
            arb_type_name(),
            prop::collection::btree_map(arb_field_name(), arb_record_value(), 1..6),
        )
            .prop_map(|(key, type_name, fields)| {
                let mut record = Record::new(key, type_name);
                record.fields = fields;
                record
            })
    }

    /// Generate records with distinct keys.
    pub fn arb_records(max: usize) -> impl Strategy<Value = Vec<Record>> {
        prop::collection::vec(arb_record(), 1..max.max(2)).prop_map(|records| {
            let mut unique: BTreeMap<CacheKey, Record> = BTreeMap::new();
            for record in records {
                unique.insert(record.key.clone(), record);
            }
            unique.into_values().collect()
        })
    }

    /// Generate an update for `key`: same key, fresh fields.
    pub fn arb_update(key: CacheKey) -> impl Strategy<Value = Record> {
        prop::collection::btree_map(arb_field_name(), arb_scalar_value(), 1..4).prop_map(
            move |fields| {
                let mut record = Record::new(key.clone(), "Update");
                record.fields = fields;
                record
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records and tiers for common testing scenarios.

    use super::*;
    use tempfile::TempDir;

    /// `user:<id>` with a single `name` field.
    pub fn user(id: &str, name: &str) -> Record {
        Record::new(format!("user:{id}"), "User").with_field("name", name)
    }

    /// Two records referencing each other.
    pub fn cycle(a: &str, b: &str) -> Vec<Record> {
        vec![
            Record::new(a, "Node").with_field("next", CacheKey::new(b)),
            Record::new(b, "Node").with_field("next", CacheKey::new(a)),
        ]
    }

    /// `node:0 -> node:1 -> ... -> node:<len-1>`.
    pub fn linked_list(len: usize) -> Vec<Record> {
        (0..len)
            .map(|i| {
                let record = Record::new(format!("node:{i}"), "Node").with_field("index", i as i64);
                if i + 1 < len {
                    record.with_field("next", CacheKey::new(format!("node:{}", i + 1)))
                } else {
                    record
                }
            })
            .collect()
    }

    /// A query root pointing at `user:1` through an argument-keyed field.
    pub fn query_with_user() -> Vec<Record> {
        let id = serde_json::Value::from("1");
        vec![
            Record::new(CacheKey::root_query(), "Query").with_field(
                graphcache_core::field_key("user", [("id", &id)]),
                CacheKey::new("user:1"),
            ),
            user("1", "Ada"),
        ]
    }

    /// SQLite tier in a fresh temporary directory. Keep the `TempDir` alive.
    pub fn temp_sql_cache(config: SqlCacheConfig) -> (SqlNormalizedCache, TempDir) {
        let dir = TempDir::new().expect("temporary directory");
        let cache = SqlNormalizedCache::open(dir.path().join("records.db"), config)
            .expect("open sqlite tier");
        (cache, dir)
    }

    /// Memory tier with `max_size_bytes` in front of an on-disk SQLite tier.
    pub fn memory_over_sql(max_size_bytes: usize) -> (MemoryCache, TempDir) {
        let (sql, dir) = temp_sql_cache(SqlCacheConfig::default());
        let memory = MemoryCache::with_next(
            MemoryCacheConfig::new().with_max_size_bytes(max_size_bytes),
            Box::new(sql),
        )
        .expect("valid memory config");
        (memory, dir)
    }

    /// Merge `records` with the default merger and no headers.
    pub fn seed(cache: &dyn NormalizedCache, records: Vec<Record>) -> BTreeSet<String> {
        cache.merge_records(records, &CacheHeaders::none(), &DefaultRecordMerger)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for cache results.

    use super::*;

    /// Assert that a CacheResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CacheResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a CacheResult is a Pattern error.
    #[track_caller]
    pub fn assert_pattern_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Pattern(_)) => {}
            other => panic!("Expected Pattern error, got: {:?}", other),
        }
    }

    /// Assert that a CacheResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &CacheResult<T>) {
        match result {
            Err(CacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert the exact set of changed field keys.
    #[track_caller]
    pub fn assert_changed(changed: &BTreeSet<String>, expected: &[&str]) {
        let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
        assert_eq!(changed, &expected, "unexpected changed keys");
    }

    /// Assert that `record.field` holds `expected`.
    #[track_caller]
    pub fn assert_field(record: &Record, field: &str, expected: impl Into<RecordValue>) {
        let expected = expected.into();
        assert_eq!(
            record.get(field),
            Some(&expected),
            "field {field} of {}",
            record.key
        );
    }

    /// Assert that `key` is present in `cache`.
    #[track_caller]
    pub fn assert_cached(cache: &dyn NormalizedCache, key: &str) -> Record {
        match cache.load_record(&CacheKey::new(key), &CacheHeaders::none()) {
            Some(record) => record,
            None => panic!("Expected {key} to be cached"),
        }
    }

    /// Assert that `key` is absent from `cache`.
    #[track_caller]
    pub fn assert_not_cached(cache: &dyn NormalizedCache, key: &str) {
        let loaded = cache.load_record(&CacheKey::new(key), &CacheHeaders::none());
        assert!(loaded.is_none(), "Expected {key} to be absent, got {loaded:?}");
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_user_fixture() {
        let record = fixtures::user("1", "Ada");
        assert_eq!(record.key.as_str(), "user:1");
        assertions::assert_field(&record, "name", "Ada");
    }

    #[test]
    fn test_linked_list_fixture() {
        let list = fixtures::linked_list(3);
        assert_eq!(list.len(), 3);
        assert_eq!(
            list[0].referenced_keys().into_iter().next(),
            Some(CacheKey::new("node:1"))
        );
        assert!(list[2].referenced_keys().is_empty());
    }

    #[test]
    fn test_query_with_user_fixture() {
        let records = fixtures::query_with_user();
        assert!(records[0].key.is_root());
        assert!(records[0].get(r#"user({"id":"1"})"#).is_some());
    }

    #[test]
    fn test_memory_over_sql_fixture() {
        let (cache, _dir) = fixtures::memory_over_sql(1024);
        let changed = fixtures::seed(&cache, fixtures::cycle("A", "B"));
        assertions::assert_changed(&changed, &["A.next", "B.next"]);
        assertions::assert_cached(&cache, "A");
        assertions::assert_not_cached(&cache, "C");
    }

    #[test]
    fn test_assert_config_error_accepts_invalid_tiers() {
        let zero_budget = MemoryCacheConfig::new().with_max_size_bytes(0);
        assertions::assert_config_error(&MemoryCache::new(zero_budget).map(|_| ()));
        let zero_parameters = SqlCacheConfig::new().with_max_parameters(0);
        assertions::assert_config_error(&SqlNormalizedCache::in_memory(zero_parameters).map(|_| ()));
    }

    #[test]
    fn test_assert_pattern_error_accepts_pattern_errors() {
        let cache = MemoryCache::new(MemoryCacheConfig::default()).unwrap();
        assertions::assert_pattern_error(&cache.remove_matching("oops\\"));
        assertions::assert_ok(&cache.remove_matching("%"));
    }

    proptest! {
        #[test]
        fn prop_generated_records_are_non_empty(record in generators::arb_record()) {
            prop_assert!(!record.is_empty());
            prop_assert!(record.key.as_str().contains(':'));
        }

        #[test]
        fn prop_generated_record_sets_have_unique_keys(records in generators::arb_records(8)) {
            let keys: BTreeSet<_> = records.iter().map(|r| r.key.clone()).collect();
            prop_assert_eq!(keys.len(), records.len());
        }
    }
}
