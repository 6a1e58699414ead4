//! Human-visible timestamp and duration formatting.
//!
//! All times shown to clients use `yyyy-MM-dd HH:mm:ss UTC`; durations use
//! one decimal place of seconds.

use chrono::{DateTime, Utc};

/// Format a UTC instant as `"yyyy-MM-dd HH:mm:ss UTC"`.
pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Format a duration between two instants as `"S.S seconds"`.
pub fn format_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let millis = (end - start).num_milliseconds().max(0);
    format!("{:.1} seconds", millis as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_format_matches_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        assert_eq!(format_utc(ts), "2025-03-14 09:26:53 UTC");
    }

    #[test]
    fn duration_has_one_decimal() {
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(2_340);
        assert_eq!(format_duration(start, end), "2.3 seconds");
    }

    #[test]
    fn duration_clamps_negative_to_zero() {
        let start = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 1).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap();
        assert_eq!(format_duration(start, end), "0.0 seconds");
    }
}
