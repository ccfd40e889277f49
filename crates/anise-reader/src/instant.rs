use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ReaderError;

static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d\d\d\d)(?:-(\d\d)(?:-(\d\d)(?:[T](\d\d)(?::(\d\d)(?::(\d\d)(?:\.(\d+))?)?)?)?)?)?(?:Z|([-+])(\d\d):(\d\d))?$",
    )
    .unwrap()
});

/// Parse an RFC-3339-like timestamp. Omitted fields default to
/// 1970-01-01T00:00:00.000Z semantics; the zone offset is applied to yield a
/// UTC instant.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ReaderError> {
    let caps = TIMESTAMP.captures(text).ok_or_else(|| {
        ReaderError::semantic(format!("Unrecognized date/time syntax: {}", text))
    })?;

    let field = |idx: usize, default: u32| -> Result<u32, ReaderError> {
        match caps.get(idx) {
            Some(m) => m
                .as_str()
                .parse::<u32>()
                .map_err(|_| ReaderError::semantic(format!("Unrecognized date/time syntax: {}", text))),
            None => Ok(default),
        }
    };

    let year = field(1, 1970)? as i32;
    let month = field(2, 1)?;
    let day = field(3, 1)?;
    let hour = field(4, 0)?;
    let minute = field(5, 0)?;
    let second = field(6, 0)?;
    let millis = caps
        .get(7)
        .map(|m| fraction_to_millis(m.as_str()))
        .unwrap_or(0);
    let offset_minutes = match (caps.get(8), caps.get(9), caps.get(10)) {
        (Some(sign), Some(oh), Some(om)) => {
            let magnitude = field_str_to_minutes(oh.as_str(), om.as_str(), text)?;
            if sign.as_str() == "-" {
                -magnitude
            } else {
                magnitude
            }
        }
        _ => 0,
    };

    check_range(text, "month", month as i64, 1, 12)?;
    check_range(text, "day", day as i64, 1, last_day_of_month(year, month) as i64)?;
    check_range(text, "hour", hour as i64, 0, 23)?;
    check_range(text, "minute", minute as i64, 0, 59)?;
    let max_second = if minute == 59 { 60 } else { 59 };
    check_range(text, "second", second as i64, 0, max_second)?;
    check_range(text, "millisecond", millis as i64, 0, 999)?;

    // A leap second rolls into the next minute once the instant is built.
    let (clock_second, leap_carry) = if second == 60 { (59, 1) } else { (second, 0) };
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| out_of_range(text, "day", day as i64))?;
    let naive = date
        .and_hms_milli_opt(hour, minute, clock_second, millis)
        .ok_or_else(|| out_of_range(text, "second", second as i64))?;
    let utc = Utc.from_utc_datetime(&naive) + Duration::seconds(leap_carry)
        - Duration::minutes(offset_minutes);
    Ok(utc)
}

fn fraction_to_millis(fraction: &str) -> u32 {
    let mut millis = 0;
    for idx in 0..3 {
        let digit = fraction
            .as_bytes()
            .get(idx)
            .map(|b| (b - b'0') as u32)
            .unwrap_or(0);
        millis = millis * 10 + digit;
    }
    millis
}

fn field_str_to_minutes(hours: &str, minutes: &str, text: &str) -> Result<i64, ReaderError> {
    let oh: i64 = hours
        .parse()
        .map_err(|_| ReaderError::semantic(format!("Unrecognized date/time syntax: {}", text)))?;
    let om: i64 = minutes
        .parse()
        .map_err(|_| ReaderError::semantic(format!("Unrecognized date/time syntax: {}", text)))?;
    Ok(oh * 60 + om)
}

fn check_range(text: &str, name: &str, value: i64, lo: i64, hi: i64) -> Result<(), ReaderError> {
    if value < lo || value > hi {
        return Err(out_of_range(text, name, value));
    }
    Ok(())
}

fn out_of_range(text: &str, name: &str, value: i64) -> ReaderError {
    ReaderError::semantic(format!(
        "Timestamp {} field out of range in {}: {}",
        name, text, value
    ))
}

fn leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap() + Duration::milliseconds(ms as i64)
    }

    #[test]
    fn full_timestamp_with_millis() {
        let parsed = parse_timestamp("1985-04-12T23:20:50.520Z").unwrap();
        assert_eq!(parsed, utc(1985, 4, 12, 23, 20, 50, 520));
    }

    #[test]
    fn omitted_fields_default_to_epoch_semantics() {
        assert_eq!(parse_timestamp("1970").unwrap(), utc(1970, 1, 1, 0, 0, 0, 0));
        assert_eq!(
            parse_timestamp("2024-03").unwrap(),
            utc(2024, 3, 1, 0, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp("2024-03-05T08").unwrap(),
            utc(2024, 3, 5, 8, 0, 0, 0)
        );
    }

    #[test]
    fn offset_is_applied_to_reach_utc() {
        let parsed = parse_timestamp("2010-11-12T13:14:15.666-06:00").unwrap();
        assert_eq!(parsed, utc(2010, 11, 12, 19, 14, 15, 666));
        let parsed = parse_timestamp("2010-11-12T13:14:15+02:30").unwrap();
        assert_eq!(parsed, utc(2010, 11, 12, 10, 44, 15, 0));
    }

    #[test]
    fn fraction_digits_normalize_to_millis() {
        assert_eq!(
            parse_timestamp("2000-01-01T00:00:00.5Z").unwrap(),
            utc(2000, 1, 1, 0, 0, 0, 500)
        );
        assert_eq!(
            parse_timestamp("2000-01-01T00:00:00.123456Z").unwrap(),
            utc(2000, 1, 1, 0, 0, 0, 123)
        );
    }

    #[test]
    fn leap_year_rule() {
        assert!(parse_timestamp("2000-02-29").is_ok());
        assert!(parse_timestamp("2024-02-29").is_ok());
        assert!(parse_timestamp("1900-02-29").is_err());
        assert!(parse_timestamp("2023-02-29").is_err());
    }

    #[test]
    fn leap_second_only_at_minute_59() {
        let parsed = parse_timestamp("2016-12-31T23:59:60Z").unwrap();
        assert_eq!(parsed, utc(2017, 1, 1, 0, 0, 0, 0));
        assert!(parse_timestamp("2016-12-31T23:58:60Z").is_err());
    }

    #[test]
    fn out_of_range_fields_are_rejected() {
        assert!(parse_timestamp("1985-13-01").is_err());
        assert!(parse_timestamp("1985-00-01").is_err());
        assert!(parse_timestamp("1985-04-31").is_err());
        assert!(parse_timestamp("1985-04-12T24").is_err());
        assert!(parse_timestamp("1985-04-12T12:60").is_err());
    }

    #[test]
    fn malformed_syntax_is_rejected() {
        assert!(parse_timestamp("85-04-12").is_err());
        assert!(parse_timestamp("1985-4-12").is_err());
        assert!(parse_timestamp("not-a-date").is_err());
    }
}
