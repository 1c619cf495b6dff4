//! # Timestamps
//!
//! Envelope timestamps and lock expirations are UTC instants truncated to
//! whole seconds. Sub-second precision would leak into the canonical bytes
//! and make signatures depend on clock resolution.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp parse failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("timestamp must use Z suffix (UTC only), got: {0:?}")]
    NotUtc(String),
    #[error("invalid RFC 3339 timestamp {value:?}: {reason}")]
    Invalid { value: String, reason: String },
    #[error("unix timestamp out of range: {0}")]
    OutOfRange(i64),
}

/// A UTC instant with second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted; explicit
    /// offsets, even `+00:00`, are rejected.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        if !s.ends_with('Z') {
            return Err(TimestampError::NotUtc(s.to_string()));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| TimestampError::Invalid {
            value: s.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    pub fn from_epoch_secs(secs: i64) -> Result<Self, TimestampError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or(TimestampError::OutOfRange(secs))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// The instant `secs` seconds later, saturating at the representable
    /// maximum.
    pub fn plus_secs(&self, secs: i64) -> Self {
        self.0
            .checked_add_signed(Duration::seconds(secs))
            .map(Self)
            .unwrap_or(*self)
    }

    /// True when this instant is strictly before `other`.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

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
        let dt = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 15).unwrap()
            + Duration::milliseconds(750);
        assert_eq!(Timestamp::from_utc(dt).to_iso8601(), "2026-03-01T09:30:15Z");
    }

    #[test]
    fn parse_accepts_z_only() {
        assert!(Timestamp::parse("2026-03-01T09:30:15Z").is_ok());
        assert!(matches!(
            Timestamp::parse("2026-03-01T09:30:15+00:00"),
            Err(TimestampError::NotUtc(_))
        ));
        assert!(matches!(
            Timestamp::parse("yesterday Z"),
            Err(TimestampError::Invalid { .. })
        ));
    }

    #[test]
    fn parse_truncates_fraction() {
        let ts = Timestamp::parse("2026-03-01T09:30:15.999Z").unwrap();
        assert_eq!(ts.to_string(), "2026-03-01T09:30:15Z");
    }

    #[test]
    fn epoch_roundtrip() {
        let ts = Timestamp::from_epoch_secs(1_767_225_600).unwrap();
        assert_eq!(ts.epoch_secs(), 1_767_225_600);
        assert!(Timestamp::from_epoch_secs(i64::MAX).is_err());
    }

    #[test]
    fn plus_secs_and_ordering() {
        let t0 = Timestamp::from_epoch_secs(1_000).unwrap();
        let t1 = t0.plus_secs(60);
        assert_eq!(t1.epoch_secs(), 1_060);
        assert!(t0.is_before(&t1));
        assert!(!t1.is_before(&t0));
        assert!(t0 < t1);
    }

    #[test]
    fn serde_uses_rfc3339() {
        let ts = Timestamp::parse("2026-03-01T09:30:15Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-03-01T09:30:15Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
