//! Freshness contracts for field reads.
//!
//! The store itself never hides expired data: records keep their
//! `received_date` / `expiration_date` metadata and the resolver here turns
//! that into an explicit [`FieldRead`]. Callers opt into tolerating stale data
//! through the `MAX_STALE` header, so a stale read is always a deliberate
//! choice and never confused with a plain miss.

use std::time::Duration;

use chrono::Utc;

use crate::headers::{CacheHeaders, DATE, MAX_STALE};
use crate::record::{Record, RecordValue, EXPIRATION_DATE_METADATA, RECEIVED_DATE_METADATA};

/// Outcome of reading one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRead {
    /// The value is within its lifetime (or carries no dates at all).
    Fresh(RecordValue),

    /// The value is past expiration but within the caller's `MAX_STALE`.
    Stale {
        value: RecordValue,
        stale_for: Duration,
    },

    /// The value is past expiration beyond the tolerated window. Treated as a
    /// miss, but distinguishable from a field that was never cached.
    Expired { stale_for: Duration },

    /// The record has no such field.
    Missing,
}

impl FieldRead {
    /// The usable value, if any.
    pub fn value(&self) -> Option<&RecordValue> {
        match self {
            Self::Fresh(value) | Self::Stale { value, .. } => Some(value),
            Self::Expired { .. } | Self::Missing => None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. } | Self::Expired { .. })
    }

    /// True when the caller has no usable value.
    pub fn is_miss(&self) -> bool {
        self.value().is_none()
    }

    /// How long past expiration the value is (zero when fresh or missing).
    pub fn staleness(&self) -> Duration {
        match self {
            Self::Stale { stale_for, .. } | Self::Expired { stale_for } => *stale_for,
            Self::Fresh(_) | Self::Missing => Duration::ZERO,
        }
    }
}

/// Resolves field freshness from date metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirationResolver {
    /// Lifetime applied to fields that carry a `received_date` but no
    /// `expiration_date`.
    max_age: Option<Duration>,
}

impl ExpirationResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire fields `max_age` after they were received.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Read `field` from `record`.
    ///
    /// "Now" is the `DATE` header when present, otherwise the wall clock.
    pub fn resolve_field(&self, record: &Record, field: &str, headers: &CacheHeaders) -> FieldRead {
        let Some(value) = record.get(field) else {
            return FieldRead::Missing;
        };
        let Some(expiration) = self.expiration_of(record, field) else {
            return FieldRead::Fresh(value.clone());
        };

        let now = headers
            .header_i64(DATE)
            .unwrap_or_else(|| Utc::now().timestamp());
        let stale_seconds = now.saturating_sub(expiration);
        if stale_seconds < 0 {
            return FieldRead::Fresh(value.clone());
        }

        let stale_for = Duration::from_secs(stale_seconds.unsigned_abs());
        let max_stale = headers.header_i64(MAX_STALE).unwrap_or(0);
        if stale_seconds >= max_stale {
            FieldRead::Expired { stale_for }
        } else {
            FieldRead::Stale {
                value: value.clone(),
                stale_for,
            }
        }
    }

    /// Expiration (epoch seconds) of `field`, if any applies.
    fn expiration_of(&self, record: &Record, field: &str) -> Option<i64> {
        let metadata = record.field_metadata(field)?;
        if let Some(expiration) = metadata
            .get(EXPIRATION_DATE_METADATA)
            .and_then(serde_json::Value::as_i64)
        {
            return Some(expiration);
        }
        let max_age = i64::try_from(self.max_age?.as_secs()).ok()?;
        metadata
            .get(RECEIVED_DATE_METADATA)
            .and_then(serde_json::Value::as_i64)
            .map(|received| received.saturating_add(max_age))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(received: Option<i64>, expiration: Option<i64>) -> Record {
        Record::new("user:1", "User")
            .with_field("name", "A")
            .with_dates(received, expiration)
    }

    fn at(now: i64) -> CacheHeaders {
        CacheHeaders::builder().date(now).build()
    }

    #[test]
    fn test_field_without_dates_is_fresh() {
        let resolver = ExpirationResolver::new();
        let read = resolver.resolve_field(&record(None, None), "name", &at(i64::MAX));
        assert!(read.is_fresh());
        assert_eq!(read.value(), Some(&RecordValue::from("A")));
    }

    #[test]
    fn test_missing_field_is_miss_not_stale() {
        let read = ExpirationResolver::new().resolve_field(&record(None, None), "email", &at(0));
        assert_eq!(read, FieldRead::Missing);
        assert!(read.is_miss());
        assert!(!read.is_stale());
    }

    #[test]
    fn test_expired_field_without_tolerance() {
        let read = ExpirationResolver::new().resolve_field(&record(Some(0), Some(100)), "name", &at(130));
        assert_eq!(
            read,
            FieldRead::Expired {
                stale_for: Duration::from_secs(30)
            }
        );
        assert!(read.is_miss());
        assert!(read.is_stale());
    }

    #[test]
    fn test_max_stale_serves_stale_value() {
        let headers = CacheHeaders::builder().date(130).max_stale(60).build();
        let read = ExpirationResolver::new().resolve_field(&record(Some(0), Some(100)), "name", &headers);
        assert_eq!(read.value(), Some(&RecordValue::from("A")));
        assert_eq!(read.staleness(), Duration::from_secs(30));
        assert!(read.is_stale());

        let beyond = CacheHeaders::builder().date(200).max_stale(60).build();
        let read = ExpirationResolver::new().resolve_field(&record(Some(0), Some(100)), "name", &beyond);
        assert!(matches!(read, FieldRead::Expired { .. }));
    }

    #[test]
    fn test_before_expiration_is_fresh() {
        let read = ExpirationResolver::new().resolve_field(&record(Some(0), Some(100)), "name", &at(99));
        assert!(read.is_fresh());
    }

    #[test]
    fn test_extreme_dates_do_not_overflow() {
        let resolver = ExpirationResolver::new();
        let far_past = resolver.resolve_field(&record(None, Some(i64::MIN)), "name", &at(i64::MAX));
        assert!(matches!(far_past, FieldRead::Expired { .. }));
        let far_future = resolver.resolve_field(&record(None, Some(i64::MAX)), "name", &at(i64::MIN));
        assert!(far_future.is_fresh());
    }

    #[test]
    fn test_max_age_applies_to_received_date() {
        let resolver = ExpirationResolver::new().with_max_age(Duration::from_secs(10));
        let fresh = resolver.resolve_field(&record(Some(100), None), "name", &at(105));
        assert!(fresh.is_fresh());
        let expired = resolver.resolve_field(&record(Some(100), None), "name", &at(111));
        assert_eq!(expired.staleness(), Duration::from_secs(1));
    }
}
