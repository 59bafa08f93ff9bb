use chrono::{DateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds.
pub fn now_millis() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

/// Whole minutes in a millisecond duration, rounded down.
pub fn whole_minutes(ms: i64) -> i64 {
  ms.max(0) / 60_000
}

/// Human readable UTC timestamp for a unix millisecond value.
pub fn format_timestamp(ms: i64) -> String {
  DateTime::<Utc>::from_timestamp_millis(ms)
    .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
    .unwrap_or_else(|| "Unknown".to_string())
}
