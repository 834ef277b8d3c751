//! Duration parsing and time formatting helpers.

use chrono::{DateTime, Local, TimeZone};

/// Parse a duration string into seconds.
///
/// Supported formats: `25` (minutes), `25m`, `90s`, `10m30s`.
/// Returns `None` on anything else.
pub fn parse_duration(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw.parse::<i64>().ok()?.checked_mul(60);
    }

    let (minutes, rest) = match raw.split_once('m') {
        Some((m, rest)) => (Some(parse_digits(m)?), rest),
        None => (None, raw),
    };
    let seconds = if rest.is_empty() {
        None
    } else {
        Some(parse_digits(rest.strip_suffix('s')?)?)
    };
    if minutes.is_none() && seconds.is_none() {
        return None;
    }

    minutes
        .unwrap_or(0)
        .checked_mul(60)?
        .checked_add(seconds.unwrap_or(0))
}

fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Format seconds as `MM:SS`.
pub fn format_mmss(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Format a unix timestamp as `YYYY-MM-DD HH:MM` in local time.
pub fn format_datetime(unix: i64) -> String {
    DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Unix timestamp of local midnight on the day containing `unix`.
pub fn start_of_day(unix: i64) -> i64 {
    let Some(local) = Local.timestamp_opt(unix, 0).earliest() else {
        return unix;
    };
    local
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map_or(unix, |dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_supported_formats() {
        assert_eq!(parse_duration("25"), Some(1_500));
        assert_eq!(parse_duration("25m"), Some(1_500));
        assert_eq!(parse_duration("90s"), Some(90));
        assert_eq!(parse_duration("10m30s"), Some(630));
        assert_eq!(parse_duration(" 5m "), Some(300));
    }

    #[test]
    fn rejects_garbage() {
        for raw in ["", "m", "s", "ms", "1h", "-5", "5x", "m30s", "10m30", "1.5m", "25 m"] {
            assert_eq!(parse_duration(raw), None, "{raw}");
        }
    }

    #[test]
    fn formats_mmss() {
        assert_eq!(format_mmss(0), "00:00");
        assert_eq!(format_mmss(1_500), "25:00");
        assert_eq!(format_mmss(61), "01:01");
        assert_eq!(format_mmss(6_000), "100:00");
        assert_eq!(format_mmss(-3), "00:00");
    }

    #[test]
    fn start_of_day_is_not_after_instant() {
        let now = chrono::Utc::now().timestamp();
        let midnight = start_of_day(now);
        assert!(midnight <= now);
        assert!(now - midnight < 25 * 3600);
    }

    proptest! {
        #[test]
        fn minutes_and_seconds_roundtrip(m in 0i64..10_000, s in 0i64..10_000) {
            prop_assert_eq!(parse_duration(&format!("{m}m{s}s")), Some(m * 60 + s));
        }
    }
}
