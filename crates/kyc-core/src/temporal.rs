//! # Temporal Types: UTC-Only Timestamps
//!
//! `Timestamp` is a UTC timestamp truncated to seconds. Session audit
//! entries, snapshot digests and credential claims all carry it, so the
//! canonical bytes of the same instant never differ.
//!
//! ## Security Invariant
//!
//! Only `Z`-suffixed inputs are accepted by [`Timestamp::parse`]. Offsets,
//! even `+00:00`, are rejected rather than silently converted.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KycError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with a `Z` suffix.
    pub fn parse(s: &str) -> Result<Self, KycError> {
        if !s.ends_with('Z') {
            return Err(KycError::InvalidTimestamp(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            KycError::InvalidTimestamp(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// This instant shifted forward by whole days.
    pub fn plus_days(&self, days: i64) -> Self {
        Self(self.0 + Duration::days(days))
    }

    /// Whole seconds elapsed from `earlier` to `self` (negative if `earlier`
    /// is in the future).
    pub fn seconds_since(&self, earlier: &Timestamp) -> i64 {
        (self.0 - earlier.0).num_seconds()
    }

    /// Whether both instants fall on the same UTC calendar day.
    pub fn same_utc_day(&self, other: &Timestamp) -> bool {
        self.0.date_naive() == other.0.date_naive()
    }

    /// Render as ISO8601 with Z suffix (e.g., `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn from_utc_truncates() {
        let dt = Utc
            .with_ymd_and_hms(2026, 3, 9, 8, 15, 2)
            .unwrap()
            .with_nanosecond(999_000_000)
            .unwrap();
        assert_eq!(Timestamp::from_utc(dt).to_iso8601(), "2026-03-09T08:15:02Z");
    }

    #[test]
    fn parse_rejects_offsets() {
        assert!(Timestamp::parse("2026-03-09T08:15:02Z").is_ok());
        assert!(Timestamp::parse("2026-03-09T08:15:02+00:00").is_err());
        assert!(Timestamp::parse("2026-03-09").is_err());
    }

    #[test]
    fn plus_days_crosses_year_boundary() {
        let ts = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        assert_eq!(ts.plus_days(365).to_iso8601(), "2027-01-15T12:00:00Z");
    }

    #[test]
    fn seconds_since_is_signed() {
        let a = Timestamp::parse("2026-01-15T12:00:00Z").unwrap();
        let b = Timestamp::parse("2026-01-15T12:01:30Z").unwrap();
        assert_eq!(b.seconds_since(&a), 90);
        assert_eq!(a.seconds_since(&b), -90);
    }

    #[test]
    fn same_utc_day_ignores_time_of_day() {
        let a = Timestamp::parse("2026-01-15T00:00:00Z").unwrap();
        let b = Timestamp::parse("2026-01-15T23:59:59Z").unwrap();
        let c = Timestamp::parse("2026-01-16T00:00:00Z").unwrap();
        assert!(a.same_utc_day(&b));
        assert!(!b.same_utc_day(&c));
    }
}
