//! Shared utility helpers for trash metadata and human-facing output.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use std::time::SystemTime;

/// File extension used by trash info files.
pub const TRASHINFO_EXTENSION: &str = ".trashinfo";

/// Second-resolution deletion date format found in older trash info files.
pub const TRASHINFO_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Parses a deletion date into a UTC datetime. Accepts RFC 3339 as written
/// by this crate and the legacy second-resolution format.
pub fn parse_trash_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, TRASHINFO_TIME_FORMAT)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Serializes a UTC datetime into the repository-standard trash format.
pub fn serialize_trash_datetime(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch; times before the epoch clamp to 0.
pub fn epoch_millis(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis().max(0)
}

/// Inverse of [`epoch_millis`]; out-of-range values fall back to the epoch.
pub fn datetime_from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Human readable size rendering shared across commands.
pub fn print_size(bytes: u64) -> String {
    const SUFFIXES: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut idx = 0usize;

    while value >= 1024.0 && idx < SUFFIXES.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }

    if idx == 0 {
        format!("{:.0} {}", value, SUFFIXES[idx])
    } else {
        format!("{:.1} {}", value, SUFFIXES[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_date_formats() {
        let legacy = parse_trash_datetime("2024-03-01T10:20:30").unwrap();
        assert_eq!(legacy.timestamp(), 1709288430);

        let current = parse_trash_datetime("2024-03-01T10:20:30.250Z").unwrap();
        assert_eq!(current.timestamp_millis(), 1709288430250);

        assert!(parse_trash_datetime("yesterday").is_none());
    }

    #[test]
    fn serialized_dates_round_trip_with_millis() {
        let dt = datetime_from_millis(1709288430250);
        let text = serialize_trash_datetime(dt);
        assert_eq!(text, "2024-03-01T10:20:30.250Z");
        assert_eq!(parse_trash_datetime(&text), Some(dt));
    }

    #[test]
    fn sizes_render_with_suffix() {
        assert_eq!(print_size(512), "512 B");
        assert_eq!(print_size(2048), "2.0 K");
        assert_eq!(print_size(5 * 1024 * 1024), "5.0 M");
    }
}
