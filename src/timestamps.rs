//! Conversion between epoch milliseconds and the datetime text kept in the
//! `stock_accounts` table.
//!
//! The store holds UTC wall-clock time as `YYYY-MM-DD HH:MM:SS`. Everything
//! above the storage layer works in epoch milliseconds, so the heartbeat
//! arithmetic never has to care about formats or time zones.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::{HeartbeatError, HeartbeatResult};

/// Storage format for every datetime column.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Some drivers hand back fractional seconds; accept them on read.
const DATETIME_FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Format an epoch-millisecond instant as stored datetime text (UTC).
///
/// Sub-second precision is dropped.
pub fn to_datetime_string(epoch_ms: i64) -> HeartbeatResult<String> {
    let datetime = DateTime::<Utc>::from_timestamp_millis(epoch_ms).ok_or_else(|| {
        HeartbeatError::InvalidTimestamp(format!("{epoch_ms} ms is out of range"))
    })?;

    Ok(datetime.format(DATETIME_FORMAT).to_string())
}

/// Parse stored datetime text (UTC) into epoch milliseconds.
pub fn from_datetime_string(value: &str) -> HeartbeatResult<i64> {
    let value = value.trim();

    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, DATETIME_FORMAT_FRACTIONAL))
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|e| HeartbeatError::InvalidTimestamp(format!("{value:?}: {e}")))
}

/// Parse a nullable datetime column.
pub fn from_optional_datetime(value: Option<&str>) -> HeartbeatResult<Option<i64>> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(from_datetime_string)
        .transpose()
}

/// Human readable rendering used in client-facing messages.
pub fn display_utc(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("{epoch_ms} ms"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_epoch_millis_in_utc() {
        // 2024-03-01 12:34:56.789 UTC
        let ms = 1_709_296_496_789;
        assert_eq!(to_datetime_string(ms).unwrap(), "2024-03-01 12:34:56");
    }

    #[test]
    fn round_trip_truncates_to_whole_seconds() {
        let ms = 1_709_296_496_789;
        let stored = to_datetime_string(ms).unwrap();
        let back = from_datetime_string(&stored).unwrap();
        assert_eq!(back, ms - ms % 1000);
    }

    #[test]
    fn round_trip_is_exact_on_second_boundaries() {
        let ms = 1_700_000_000_000;
        let stored = to_datetime_string(ms).unwrap();
        assert_eq!(from_datetime_string(&stored).unwrap(), ms);
    }

    #[test]
    fn accepts_fractional_seconds_on_read() {
        let ms = from_datetime_string("2024-03-01 12:34:56.250").unwrap();
        assert_eq!(ms, 1_709_296_496_250);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            from_datetime_string("yesterday"),
            Err(HeartbeatError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn optional_column_treats_null_and_blank_as_absent() {
        assert_eq!(from_optional_datetime(None).unwrap(), None);
        assert_eq!(from_optional_datetime(Some("  ")).unwrap(), None);
        assert_eq!(
            from_optional_datetime(Some("1970-01-01 00:00:01")).unwrap(),
            Some(1000)
        );
    }

    #[test]
    fn display_mentions_utc() {
        assert_eq!(display_utc(0), "1970-01-01 00:00:00 UTC");
    }
}
