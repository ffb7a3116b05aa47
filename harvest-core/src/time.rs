//! Timestamp conversions shared by the CLI, the store and the marker files.

use crate::CoreError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Fixed-width, lexicographically sortable format of the `date`/`postDate`
/// columns.
pub const STORE_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn format_store_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(STORE_DATE_FORMAT).to_string()
}

/// Accepts `yymmddHHMMSS`, `YYYYMMDDHHMMSS`, `YYYY-MM-DDTHH:MM:SS` and
/// `YYYY-MM-DD`; all values are UTC.
pub fn parse_cli_date(value: &str) -> Result<DateTime<Utc>, CoreError> {
    let value = value.trim();
    let all_digits = value.chars().all(|c| c.is_ascii_digit());

    let parsed = match value.len() {
        12 if all_digits => NaiveDateTime::parse_from_str(value, "%y%m%d%H%M%S").ok(),
        14 if all_digits => NaiveDateTime::parse_from_str(value, STORE_DATE_FORMAT).ok(),
        10 => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0)),
        _ => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok(),
    };

    parsed
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            CoreError::invalid_input(format!(
                "Unrecognised date '{}', expected yymmddHHMMSS or YYYY-MM-DDTHH:MM:SS",
                value
            ))
        })
}

/// Converts the API's float `created_utc` into a timestamp, dropping the
/// fractional part.
pub fn from_unix_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    Utc.timestamp_opt(seconds.trunc() as i64, 0).single()
}

pub fn format_marker(timestamp: &DateTime<Utc>) -> String {
    timestamp.timestamp().to_string()
}

/// Reads a marker value. Older marker files hold the float form
/// (`1418000000.0`), which is accepted too.
pub fn parse_marker(value: &str) -> Result<DateTime<Utc>, CoreError> {
    let value = value.trim();
    let parsed = match value.parse::<i64>() {
        Ok(seconds) => Utc.timestamp_opt(seconds, 0).single(),
        Err(_) => value.parse::<f64>().ok().and_then(from_unix_seconds),
    };
    parsed.ok_or_else(|| CoreError::invalid_input(format!("Malformed marker value '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_date_format() {
        let ts = Utc.with_ymd_and_hms(2014, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_store_date(&ts), "20140102030405");
    }

    #[test]
    fn test_cli_date_formats() {
        let expected = Utc.with_ymd_and_hms(2014, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_cli_date("140101000000").unwrap(), expected);
        assert_eq!(parse_cli_date("20140101000000").unwrap(), expected);
        assert_eq!(parse_cli_date("2014-01-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_cli_date("2014-01-01").unwrap(), expected);
    }

    #[test]
    fn test_cli_date_rejects_garbage() {
        let err = parse_cli_date("yesterday").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput { .. }));
        assert!(parse_cli_date("141301000000").is_err());
    }

    #[test]
    fn test_marker_accepts_integer_and_float() {
        let ts = Utc.timestamp_opt(1418000000, 0).unwrap();
        assert_eq!(parse_marker("1418000000").unwrap(), ts);
        assert_eq!(parse_marker("1418000000.0\n").unwrap(), ts);
        assert_eq!(format_marker(&ts), "1418000000");
        assert!(parse_marker("").is_err());
    }

    #[test]
    fn test_from_unix_seconds_truncates() {
        let ts = from_unix_seconds(1388534400.9).unwrap();
        assert_eq!(ts.timestamp(), 1388534400);
        assert!(from_unix_seconds(f64::NAN).is_none());
    }
}
