//! Canonical text encoding for stored instants.
//!
//! Instants are persisted as fixed-width RFC 3339 UTC strings with
//! microsecond precision (`2026-10-18T12:00:00.000000Z`). Fixed width keeps
//! lexicographic order identical to chronological order, so `>=` predicates
//! on the text column are correct and indexable.

use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Encode an instant for storage. Sub-microsecond precision is truncated.
pub fn format(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a range bound, rounding up to the next whole microsecond.
///
/// Stored instants are whole microseconds, so `ts >= format_bound(b)` holds
/// exactly when `ts >= b`, and `ts < format_bound(b)` exactly when `ts < b`.
pub fn format_bound(bound: DateTime<Utc>) -> String {
    let rem = i64::from(bound.timestamp_subsec_nanos() % 1_000);
    if rem == 0 {
        format(bound)
    } else {
        format(bound + Duration::nanoseconds(1_000 - rem))
    }
}

/// Decode a stored instant. Accepts any RFC 3339 offset and normalizes to UTC.
pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn format_is_fixed_width_utc() {
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 9, 5, 0).unwrap();
        assert_eq!(format(t), "2026-10-18T09:05:00.000000Z");
        let later = t + Duration::microseconds(1);
        assert_eq!(format(later), "2026-10-18T09:05:00.000001Z");
        assert_eq!(format(t).len(), format(later).len());
    }

    #[test]
    fn lexicographic_order_matches_time_order() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let a = format(t + Duration::milliseconds(999));
        let b = format(t + Duration::seconds(1));
        let c = format(t + Duration::hours(10));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn bound_rounds_up_partial_microseconds() {
        let t = Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap();
        assert_eq!(format_bound(t), "2026-10-18T12:00:00.000000Z");
        let partial = t + Duration::nanoseconds(500);
        assert_eq!(format(partial), "2026-10-18T12:00:00.000000Z");
        assert_eq!(format_bound(partial), "2026-10-18T12:00:00.000001Z");
        let just_under = t + Duration::nanoseconds(999_999_999);
        assert_eq!(format_bound(just_under), "2026-10-18T12:00:01.000000Z");
    }

    #[test]
    fn parse_normalizes_offsets() {
        let parsed = parse("2026-10-18T14:00:00+02:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("yesterday").is_err());
    }
}
