//! Utility functions for the ranking engine

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;

/// Parse a compact `YYYYMMDD` date string
pub fn parse_compact_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(anyhow!("invalid date '{}': expected YYYYMMDD", value));
    }

    let year: i32 = trimmed[0..4]
        .parse()
        .map_err(|_| anyhow!("invalid year in date '{}'", value))?;
    let month: u32 = trimmed[4..6]
        .parse()
        .map_err(|_| anyhow!("invalid month in date '{}'", value))?;
    let day: u32 = trimmed[6..8]
        .parse()
        .map_err(|_| anyhow!("invalid day in date '{}'", value))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| anyhow!("invalid calendar date '{}'", value))
}

/// Format a date back to the compact `YYYYMMDD` form used by game files
pub fn format_compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Number of whole months between a game date and the period end, where a
/// month is 1/12 of a 365-day year. Dates on or after the end count as zero.
pub fn whole_months_before(date: NaiveDate, end: NaiveDate) -> i64 {
    let days = (end - date).num_days();
    if days <= 0 {
        0
    } else {
        12 * days / 365
    }
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Calculate the absolute difference between two powers
pub fn power_difference(power1: f64, power2: f64) -> f64 {
    (power1 - power2).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_compact_date() {
        assert_eq!(parse_compact_date("20180307").unwrap(), date(2018, 3, 7));
        assert_eq!(parse_compact_date(" 20180307 ").unwrap(), date(2018, 3, 7));
    }

    #[test]
    fn test_parse_compact_date_rejects_garbage() {
        assert!(parse_compact_date("2018-03-07").is_err());
        assert!(parse_compact_date("201803").is_err());
        assert!(parse_compact_date("2018030a").is_err());
        assert!(parse_compact_date("20180231").is_err());
        assert!(parse_compact_date("").is_err());
    }

    #[test]
    fn test_format_round_trip() {
        let d = date(2017, 11, 2);
        assert_eq!(parse_compact_date(&format_compact_date(d)).unwrap(), d);
    }

    #[test]
    fn test_whole_months_before() {
        let end = date(2018, 3, 7);
        assert_eq!(whole_months_before(end, end), 0);
        assert_eq!(whole_months_before(date(2018, 3, 1), end), 0);
        // 182 days is just under six 1/12-year months, 183 crosses it
        assert_eq!(whole_months_before(date(2017, 9, 6), end), 5);
        assert_eq!(whole_months_before(date(2017, 9, 5), end), 6);
        // a full year back is twelve months
        assert_eq!(whole_months_before(date(2017, 3, 7), end), 12);
        // future dates clamp to zero
        assert_eq!(whole_months_before(date(2018, 4, 1), end), 0);
    }

    #[test]
    fn test_power_difference() {
        assert_eq!(power_difference(1000.0, 900.0), 100.0);
        assert_eq!(power_difference(900.0, 1000.0), 100.0);
        assert_eq!(power_difference(700.0, 700.0), 0.0);
    }
}
