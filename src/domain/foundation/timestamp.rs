//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the signed duration from `other` to this timestamp.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Returns a new timestamp shifted forward by `duration`.
    pub fn plus(&self, duration: Duration) -> Self {
        Self(self.0 + duration)
    }

    /// Returns a new timestamp shifted backward by `duration`.
    pub fn minus(&self, duration: Duration) -> Self {
        Self(self.0 - duration)
    }

    /// Creates a new timestamp by adding whole seconds.
    pub fn plus_secs(&self, secs: u64) -> Self {
        self.plus(Duration::seconds(secs as i64))
    }

    /// Creates a new timestamp by subtracting whole days.
    pub fn minus_days(&self, days: i64) -> Self {
        self.minus(Duration::days(days))
    }

    /// Calendar date (UTC) of this timestamp; drives daily quota resets.
    pub fn date(&self) -> NaiveDate {
        self.0.date_naive()
    }

    /// Creates a timestamp from Unix seconds, clamping out-of-range input to the epoch.
    pub fn from_unix_secs(secs: i64) -> Self {
        Self(Utc.timestamp_opt(secs, 0).single().unwrap_or_default())
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn now_lies_between_surrounding_reads() {
        let before = Utc::now();
        let ts = Timestamp::now();
        let after = Utc::now();

        assert!(ts.as_datetime() >= &before);
        assert!(ts.as_datetime() <= &after);
    }

    #[test]
    fn ordering_helpers_agree_with_ord() {
        let early = Timestamp::from_unix_secs(1_000);
        let late = Timestamp::from_unix_secs(2_000);

        assert!(early.is_before(&late));
        assert!(late.is_after(&early));
        assert!(early < late);
        assert!(!early.is_after(&early));
    }

    #[test]
    fn plus_and_minus_shift_by_duration() {
        let ts = Timestamp::from_unix_secs(10_000);
        assert_eq!(ts.plus(Duration::minutes(1)).as_unix_secs(), 10_060);
        assert_eq!(ts.minus(Duration::seconds(10)).as_unix_secs(), 9_990);
        assert_eq!(ts.plus_secs(5).as_unix_secs(), 10_005);
    }

    #[test]
    fn duration_since_is_signed() {
        let a = Timestamp::from_unix_secs(100);
        let b = Timestamp::from_unix_secs(160);
        assert_eq!(b.duration_since(&a), Duration::seconds(60));
        assert_eq!(a.duration_since(&b), Duration::seconds(-60));
    }

    #[test]
    fn date_uses_utc_calendar_day() {
        // 2024-01-15T23:59:59Z
        let ts = Timestamp::from_unix_secs(1_705_363_199);
        assert_eq!(ts.date().day(), 15);
        assert_eq!(ts.plus_secs(1).date().day(), 16);
    }

    #[test]
    fn serializes_as_rfc3339_string() {
        let ts = Timestamp::from_unix_secs(1_705_276_800);
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("2024-01-15"));

        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
