//! Cache headers attached to every store call.
//!
//! Headers are a string-keyed bag. Flag headers only need to be present;
//! date headers carry epoch seconds.

use std::collections::BTreeMap;

/// Remove the record from the tier that served it once it has been read.
pub const EVICT_AFTER_READ: &str = "evict-after-read";

/// Skip storing entirely.
pub const DO_NOT_STORE: &str = "do-not-store";

/// Only the memory tier may read or write.
pub const MEMORY_CACHE_ONLY: &str = "memory-cache-only";

/// When the data was received (epoch seconds).
pub const RECEIVED_DATE: &str = "received-date";

/// When the data expires (epoch seconds).
pub const EXPIRATION_DATE: &str = "expiration-date";

/// Cached field errors overwrite existing values.
pub const ERRORS_REPLACE_CACHED_VALUES: &str = "errors-replace-cached-values";

/// How long past expiration data is still served as stale (seconds).
pub const MAX_STALE: &str = "max-stale";

/// Reference "now" for freshness checks (epoch seconds).
pub const DATE: &str = "date";

/// String-keyed header bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHeaders {
    headers: BTreeMap<String, String>,
}

impl CacheHeaders {
    /// Headers with no entries.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn builder() -> CacheHeadersBuilder {
        CacheHeadersBuilder::default()
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Parse a header value as an integer, ignoring malformed values.
    pub fn header_i64(&self, name: &str) -> Option<i64> {
        self.header_value(name)?.trim().parse().ok()
    }

    /// A copy of these headers with `other` layered on top.
    pub fn merged_with(&self, other: &CacheHeaders) -> CacheHeaders {
        let mut headers = self.headers.clone();
        headers.extend(other.headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        CacheHeaders { headers }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Builder for [`CacheHeaders`].
#[derive(Debug, Default)]
pub struct CacheHeadersBuilder {
    headers: BTreeMap<String, String>,
}

impl CacheHeadersBuilder {
    pub fn add_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a flag header (value `"true"`).
    pub fn flag(self, name: &str) -> Self {
        self.add_header(name, "true")
    }

    pub fn received_date(self, epoch_seconds: i64) -> Self {
        self.add_header(RECEIVED_DATE, epoch_seconds.to_string())
    }

    pub fn expiration_date(self, epoch_seconds: i64) -> Self {
        self.add_header(EXPIRATION_DATE, epoch_seconds.to_string())
    }

    pub fn max_stale(self, seconds: i64) -> Self {
        self.add_header(MAX_STALE, seconds.to_string())
    }

    pub fn date(self, epoch_seconds: i64) -> Self {
        self.add_header(DATE, epoch_seconds.to_string())
    }

    pub fn build(self) -> CacheHeaders {
        CacheHeaders {
            headers: self.headers,
        }
    }
}
