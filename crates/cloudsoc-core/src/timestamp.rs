//! Upstream timestamp parsing and formatting.
//!
//! The log API reports event times as `2024-03-01T12:00:05` (UTC, second
//! granularity). Some deployments append a `Z` or fractional seconds, so
//! parsing is lenient while formatting always emits the canonical form.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// Canonical wire format for lower bounds and resumption state.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const LENIENT_FORMATS: &[&str] = &[
    TIMESTAMP_FORMAT,
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%d %H:%M:%S",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unparseable timestamp: {0:?}")]
pub struct TimestampError(pub String);

/// Parse an upstream timestamp into a UTC instant.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = s.trim();
    for fmt in LENIENT_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimestampError(s.to_string()))
}

/// Format an instant in the canonical upstream format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn canonical_format() {
        let ts = parse_timestamp("2024-03-01T12:00:05").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 5).unwrap());
        assert_eq!(format_timestamp(ts), "2024-03-01T12:00:05");
    }

    #[test]
    fn trailing_z_and_fraction_accepted() {
        let plain = parse_timestamp("2024-03-01T12:00:05").unwrap();
        assert_eq!(parse_timestamp("2024-03-01T12:00:05Z").unwrap(), plain);
        assert_eq!(
            parse_timestamp("2024-03-01T12:00:05.000").unwrap(),
            plain
        );
    }

    #[test]
    fn rfc3339_offset_normalised_to_utc() {
        let ts = parse_timestamp("2024-03-01T14:00:05+02:00").unwrap();
        assert_eq!(format_timestamp(ts), "2024-03-01T12:00:05");
    }

    #[test]
    fn garbage_rejected() {
        let err = parse_timestamp("yesterday-ish").unwrap_err();
        assert_eq!(err, TimestampError("yesterday-ish".into()));
    }

    #[test]
    fn ordering_is_by_instant() {
        let a = parse_timestamp("2024-03-01T12:00:05").unwrap();
        let b = parse_timestamp("2024-03-01T12:00:06Z").unwrap();
        assert!(a < b);
    }
}
