//! Cell formatting rules

use std::fmt::Display;

use analyzer_core::{Metric, NOT_AVAILABLE};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Shown for timestamps that do not parse
pub const INVALID_DATE: &str = "Invalid Date";

/// Timestamps without an offset are read as local wall-clock time
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Price with exactly four decimals; text values pass through unchanged
#[must_use]
pub fn format_price(price: &Metric) -> String {
    match price {
        Metric::Number(n) => format!("{n:.4}"),
        Metric::Text(s) => s.clone(),
    }
}

/// `$`, grouped thousands, exactly two decimals; text values pass through
#[must_use]
pub fn format_market_cap(market_cap: &Metric) -> String {
    match market_cap {
        Metric::Number(n) => format!("${}", group_thousands(*n, 2)),
        Metric::Text(s) => s.clone(),
    }
}

/// Timestamp in the local time zone, `"N/A"` when absent
#[must_use]
pub fn format_datetime(value: Option<&str>) -> String {
    format_datetime_in(value, &Local)
}

/// Timestamp rendered in `tz` as `M/D/YYYY, h:mm:ss AM`
#[must_use]
pub fn format_datetime_in<Tz>(value: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return NOT_AVAILABLE.to_string();
    };

    parse_timestamp(raw, tz).map_or_else(
        || INVALID_DATE.to_string(),
        |dt| dt.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
    )
}

fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(tz));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }
    // A bare date means midnight UTC
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).with_timezone(tz))
}

/// Fixed decimals with `,` between thousands groups
#[must_use]
pub fn group_thousands(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut grouped = String::with_capacity(fixed.len() + int_part.len() / 3 + 1);
    if value.is_sign_negative() && fixed.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn price_formatting() {
        assert_eq!(format_price(&Metric::from("N/A")), "N/A");
        assert_eq!(format_price(&Metric::Number(1.0)), "1.0000");
        assert_eq!(format_price(&Metric::Number(0.01234)), "0.0123");
    }

    #[test]
    fn market_cap_formatting() {
        assert_eq!(format_market_cap(&Metric::Number(1234.5)), "$1,234.50");
        assert_eq!(format_market_cap(&Metric::Number(12345.678)), "$12,345.68");
        assert_eq!(format_market_cap(&Metric::Number(999.0)), "$999.00");
        assert_eq!(format_market_cap(&Metric::Number(1_234_567_890.0)), "$1,234,567,890.00");
        assert_eq!(format_market_cap(&Metric::from("N/A")), "N/A");
    }

    #[test]
    fn negative_values_keep_sign() {
        assert_eq!(group_thousands(-1234.5, 2), "-1,234.50");
        assert_eq!(group_thousands(-0.001, 2), "0.00");
    }

    #[test]
    fn datetime_in_utc() {
        assert_eq!(
            format_datetime_in(Some("2024-01-01T00:00:00Z"), &Utc),
            "1/1/2024, 12:00:00 AM"
        );
        assert_eq!(
            format_datetime_in(Some("2025-05-17T22:39:40.000Z"), &Utc),
            "5/17/2025, 10:39:40 PM"
        );
    }

    #[test]
    fn datetime_converts_to_zone() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        assert_eq!(
            format_datetime_in(Some("2024-01-01T00:00:00Z"), &tokyo),
            "1/1/2024, 9:00:00 AM"
        );
    }

    #[test]
    fn naive_timestamps_are_local() {
        assert_eq!(
            format_datetime_in(Some("2024-03-05 14:07:09"), &Utc),
            "3/5/2024, 2:07:09 PM"
        );
        assert_eq!(format_datetime_in(Some("2024-03-05"), &Utc), "3/5/2024, 12:00:00 AM");
    }

    #[test]
    fn missing_and_garbage_timestamps() {
        assert_eq!(format_datetime_in(None, &Utc), "N/A");
        assert_eq!(format_datetime_in(Some(""), &Utc), "N/A");
        assert_eq!(format_datetime_in(Some("yesterday"), &Utc), INVALID_DATE);
    }
}
