//! Timestamp helpers.
//!
//! Every timestamp column holds UTC text in one fixed-width format, so
//! string comparison in SQL orders rows chronologically.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn now() -> String {
    format(Utc::now())
}

pub fn parse(text: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// The `YYYY-MM-DD` prefix of a stored timestamp.
pub fn date_part(text: &str) -> &str {
    text.get(..10).unwrap_or(text)
}

/// Returns `now`, or one microsecond past `previous` when the clock has not
/// moved beyond it.
pub fn strictly_after(previous: Option<&str>, now: DateTime<Utc>) -> String {
    match previous.and_then(parse) {
        Some(prev) if prev >= now => format(prev + Duration::microseconds(1)),
        _ => format(now),
    }
}
