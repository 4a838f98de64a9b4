//! Fuzz test for composite cache keys
//!
//! Builds keys from arbitrary type names and values, separators included, and
//! checks that the escaping keeps them reversible.
//!
//! Run with: cargo +nightly fuzz run cache_key_fuzz -- -max_total_time=60

#![no_main]

use graphcache_core::CacheKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (String, Vec<String>)| {
    let (type_name, values) = input;
    // An empty value list has no distinct encoding from a single empty value.
    if values.is_empty() {
        return;
    }

    let key = CacheKey::from_type_and_values(&type_name, &values);
    let (parsed_type, parsed_values) = key
        .type_and_values()
        .expect("built keys always carry a type separator");
    assert_eq!(parsed_type, type_name);
    assert_eq!(parsed_values, values);
});
