//! Time bound parsing for `--since` / `--until`
//!
//! Callers hand over whatever the user typed; a bound that cannot be parsed
//! widens the query instead of failing it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Parse one time bound into epoch seconds.
///
/// Accepted forms, first success wins:
/// 1. a numeric literal, taken directly as epoch seconds
/// 2. an exact ten-character `YYYY-MM-DD`, taken as midnight UTC
/// 3. a full ISO-8601 timestamp; UTC is assumed when no offset is given
///
/// Anything else yields `None`, an unbounded side.
pub fn parse_time_bound(input: &str) -> Option<f64> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(epoch) = input.parse::<f64>() {
        if epoch.is_finite() {
            return Some(epoch);
        }
        return None;
    }

    if input.len() == 10 {
        if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(midnight.and_utc().timestamp() as f64);
        }
    }

    if let Ok(stamped) = DateTime::parse_from_rfc3339(input) {
        return Some(stamped.timestamp_micros() as f64 / 1e6);
    }

    // ISO-8601 without an offset, with either separator.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive.and_utc().timestamp_micros() as f64 / 1e6);
        }
    }

    None
}
