//! Fuzz test for key pattern parsing
//!
//! Feeds arbitrary strings to the pattern parser looking for:
//! - Panics on malformed escapes
//! - Literal patterns that fail to match their own text
//! - Wildcard-only patterns that miss some key
//!
//! Run with: cargo +nightly fuzz run pattern_fuzz -- -max_total_time=60

#![no_main]

use graphcache_core::KeyPattern;
use libfuzzer_sys::fuzz_target;

fn escape_all(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() * 2);
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // Parsing may fail but must never panic.
        if let Ok(pattern) = KeyPattern::parse(input) {
            let _ = pattern.to_sql_glob();
            let _ = pattern.matches(input);
            if pattern.matches_everything() {
                assert!(pattern.matches(""));
                assert!(pattern.matches(input));
            }
        }

        // A fully escaped string is a literal that matches exactly itself.
        let literal = KeyPattern::parse(&escape_all(input))
            .expect("escaped input is always a valid pattern");
        assert!(literal.matches(input), "literal pattern must match its text");
        let longer = format!("{input}x");
        assert!(!literal.matches(&longer), "patterns match whole keys only");
    }
});
