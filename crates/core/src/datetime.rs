//! Timestamp and duration support.
//!
//! Timestamps are UTC instants restricted to years 0001-9999; durations are
//! signed nanosecond spans that must fit an `i64`. Calendar accessors accept
//! an optional time-zone name, either an IANA name or a fixed
//! `(+|-)hh:mm` offset.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike, Utc};

use crate::error::{ErrorKind, ErrorValue};
use crate::value::Value;

/// 0001-01-01T00:00:00Z.
pub const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;
/// 9999-12-31T23:59:59Z.
pub const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Range-checks a timestamp; arithmetic escaping the representable years is
/// an overflow.
pub fn checked_timestamp(ts: DateTime<Utc>) -> Result<DateTime<Utc>, ErrorValue> {
    let secs = ts.timestamp();
    if (MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&secs) {
        Ok(ts)
    } else {
        Err(ErrorValue::new(
            ErrorKind::Overflow,
            "timestamp out of range",
        ))
    }
}

/// Nanosecond count of a duration, or an overflow error when it exceeds the
/// representable span.
pub fn duration_nanos(d: &chrono::Duration) -> Result<i64, ErrorValue> {
    d.num_nanoseconds()
        .ok_or_else(|| ErrorValue::new(ErrorKind::Overflow, "duration out of range"))
}

pub fn duration_from_nanos(nanos: i64) -> chrono::Duration {
    chrono::Duration::nanoseconds(nanos)
}

/// Parses a duration literal: an optional sign followed by one or more
/// `<decimal><unit>` segments, units `h`, `m`, `s`, `ms`, `us`, `ns`.
pub fn parse_duration(text: &str) -> Result<chrono::Duration, ErrorValue> {
    let invalid = || {
        ErrorValue::new(
            ErrorKind::TypeConversion,
            format!("invalid duration: {text:?}"),
        )
    };
    let (negative, mut rest) = match text.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }
    // "0" alone is the zero duration, matching the common textual form.
    if rest == "0" {
        return Ok(chrono::Duration::zero());
    }
    let mut total: i64 = 0;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        if digits == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(digits);
        let value: f64 = number.parse().map_err(|_| invalid())?;
        let (unit_nanos, tail) = if let Some(t) = tail.strip_prefix("ns") {
            (1, t)
        } else if let Some(t) = tail.strip_prefix("us") {
            (1_000, t)
        } else if let Some(t) = tail.strip_prefix("ms") {
            (1_000_000, t)
        } else if let Some(t) = tail.strip_prefix('s') {
            (NANOS_PER_SECOND, t)
        } else if let Some(t) = tail.strip_prefix('m') {
            (60 * NANOS_PER_SECOND, t)
        } else if let Some(t) = tail.strip_prefix('h') {
            (3_600 * NANOS_PER_SECOND, t)
        } else {
            return Err(invalid());
        };
        let segment = value * unit_nanos as f64;
        if !segment.is_finite() || segment >= i64::MAX as f64 {
            return Err(ErrorValue::new(ErrorKind::Overflow, "duration out of range"));
        }
        total = total
            .checked_add(segment as i64)
            .ok_or_else(|| ErrorValue::new(ErrorKind::Overflow, "duration out of range"))?;
        rest = tail;
    }
    if negative {
        total = -total;
    }
    Ok(duration_from_nanos(total))
}

/// Renders a duration as decimal seconds with an `s` suffix: `3600s`,
/// `1.5s`, `-0.000000001s`.
pub fn format_duration(d: &chrono::Duration) -> String {
    let nanos = match d.num_nanoseconds() {
        Some(n) => n,
        None => return format!("{}s", d.num_seconds()),
    };
    let secs = nanos / NANOS_PER_SECOND;
    let frac = (nanos % NANOS_PER_SECOND).unsigned_abs();
    if frac == 0 {
        return format!("{secs}s");
    }
    let sign = if nanos < 0 && secs == 0 { "-" } else { "" };
    let mut frac_text = format!("{frac:09}");
    while frac_text.ends_with('0') {
        frac_text.pop();
    }
    format!("{sign}{secs}.{frac_text}s")
}

/// Parses an RFC 3339 timestamp, normalizing to UTC.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, ErrorValue> {
    let parsed = DateTime::parse_from_rfc3339(text).map_err(|e| {
        ErrorValue::new(
            ErrorKind::TypeConversion,
            format!("invalid timestamp {text:?}: {e}"),
        )
    })?;
    checked_timestamp(parsed.with_timezone(&Utc))
}

/// Renders RFC 3339 with nanosecond precision and a trailing `Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}

enum ResolvedTz {
    Named(chrono_tz::Tz),
    Fixed(FixedOffset),
}

/// Resolves a tz argument: an IANA name (`America/New_York`, `UTC`) or a
/// fixed offset `(+|-)hh:mm`.
fn resolve_tz(name: &str) -> Result<ResolvedTz, ErrorValue> {
    if let Some(rest) = name.strip_prefix('+').or_else(|| name.strip_prefix('-')) {
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() == 2 {
            let hours: i32 = parts[0].parse().map_err(|_| unknown_tz(name))?;
            let minutes: i32 = parts[1].parse().map_err(|_| unknown_tz(name))?;
            let mut secs = hours * 3600 + minutes * 60;
            if name.starts_with('-') {
                secs = -secs;
            }
            return FixedOffset::east_opt(secs)
                .map(ResolvedTz::Fixed)
                .ok_or_else(|| unknown_tz(name));
        }
        return Err(unknown_tz(name));
    }
    name.parse::<chrono_tz::Tz>()
        .map(ResolvedTz::Named)
        .map_err(|_| unknown_tz(name))
}

fn unknown_tz(name: &str) -> ErrorValue {
    ErrorValue::new(
        ErrorKind::TypeConversion,
        format!("unknown time zone: {name:?}"),
    )
}

fn local_time(ts: &DateTime<Utc>, tz: Option<&str>) -> Result<NaiveDateTime, ErrorValue> {
    match tz {
        None => Ok(ts.naive_utc()),
        Some(name) => match resolve_tz(name)? {
            ResolvedTz::Named(tz) => Ok(ts.with_timezone(&tz).naive_local()),
            ResolvedTz::Fixed(offset) => Ok(ts.with_timezone(&offset).naive_local()),
        },
    }
}

/// Calendar accessors on timestamps. `getMonth` and `getDayOfYear` are
/// 0-based, `getDate` is 1-based, `getDayOfWeek` counts from Sunday.
pub fn timestamp_accessor(ts: &DateTime<Utc>, method: &str, tz: Option<&str>) -> Value {
    let local = match local_time(ts, tz) {
        Ok(l) => l,
        Err(e) => return Value::from_error(e),
    };
    let result = match method {
        "getFullYear" => i64::from(local.year()),
        "getMonth" => i64::from(local.month0()),
        "getDayOfYear" => i64::from(local.ordinal0()),
        "getDate" => i64::from(local.day()),
        "getDayOfMonth" => i64::from(local.day0()),
        "getDayOfWeek" => i64::from(local.weekday().num_days_from_sunday()),
        "getHours" => i64::from(local.hour()),
        "getMinutes" => i64::from(local.minute()),
        "getSeconds" => i64::from(local.second()),
        "getMilliseconds" => i64::from(local.nanosecond() % 1_000_000_000) / 1_000_000,
        other => {
            return Value::error(
                ErrorKind::NoSuchOverload,
                format!("no such overload: google.protobuf.Timestamp.{other}"),
            );
        }
    };
    Value::Int(result)
}

/// Accessors on durations: totals, not components (`getMinutes` of 1h30m is
/// 90).
pub fn duration_accessor(d: &chrono::Duration, method: &str) -> Value {
    let result = match method {
        "getHours" => d.num_hours(),
        "getMinutes" => d.num_minutes(),
        "getSeconds" => d.num_seconds(),
        "getMilliseconds" => d.num_milliseconds(),
        other => {
            return Value::error(
                ErrorKind::NoSuchOverload,
                format!("no such overload: google.protobuf.Duration.{other}"),
            );
        }
    };
    Value::Int(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(text: &str) -> DateTime<Utc> {
        parse_timestamp(text).unwrap()
    }

    #[test]
    fn test_parse_and_format_round_trip() {
        let t = ts("2023-06-15T12:30:45.5Z");
        assert_eq!(format_timestamp(&t), "2023-06-15T12:30:45.500Z");
        let plain = ts("2023-06-15T12:30:45Z");
        assert_eq!(format_timestamp(&plain), "2023-06-15T12:30:45Z");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(parse_timestamp("10000-01-01T00:00:00Z").is_err());
    }

    #[test]
    fn test_duration_parse_segments() {
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            chrono::Duration::minutes(90)
        );
        assert_eq!(
            parse_duration("1.5s").unwrap(),
            chrono::Duration::milliseconds(1500)
        );
        assert_eq!(
            parse_duration("-300ms").unwrap(),
            chrono::Duration::milliseconds(-300)
        );
        assert!(parse_duration("5 parsecs").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_duration_format_decimal_seconds() {
        assert_eq!(format_duration(&chrono::Duration::hours(1)), "3600s");
        assert_eq!(
            format_duration(&chrono::Duration::milliseconds(1500)),
            "1.5s"
        );
        assert_eq!(
            format_duration(&chrono::Duration::nanoseconds(-1)),
            "-0.000000001s"
        );
    }

    #[test]
    fn test_calendar_accessors_utc() {
        // 2023-01-02 was a Monday.
        let t = ts("2023-01-02T03:04:05.006Z");
        assert_eq!(timestamp_accessor(&t, "getFullYear", None), Value::Int(2023));
        assert_eq!(timestamp_accessor(&t, "getMonth", None), Value::Int(0));
        assert_eq!(timestamp_accessor(&t, "getDate", None), Value::Int(2));
        assert_eq!(timestamp_accessor(&t, "getDayOfMonth", None), Value::Int(1));
        assert_eq!(timestamp_accessor(&t, "getDayOfWeek", None), Value::Int(1));
        assert_eq!(timestamp_accessor(&t, "getDayOfYear", None), Value::Int(1));
        assert_eq!(timestamp_accessor(&t, "getHours", None), Value::Int(3));
        assert_eq!(timestamp_accessor(&t, "getMilliseconds", None), Value::Int(6));
    }

    #[test]
    fn test_calendar_accessors_with_tz() {
        let t = ts("2023-01-01T00:30:00Z");
        // Half past midnight UTC is the previous evening in New York.
        assert_eq!(
            timestamp_accessor(&t, "getFullYear", Some("America/New_York")),
            Value::Int(2022)
        );
        assert_eq!(
            timestamp_accessor(&t, "getHours", Some("+01:00")),
            Value::Int(1)
        );
        assert!(timestamp_accessor(&t, "getHours", Some("Mars/Olympus")).is_error());
    }

    #[test]
    fn test_duration_accessors_are_totals() {
        let d = chrono::Duration::minutes(90) + chrono::Duration::milliseconds(250);
        assert_eq!(duration_accessor(&d, "getHours"), Value::Int(1));
        assert_eq!(duration_accessor(&d, "getMinutes"), Value::Int(90));
        assert_eq!(duration_accessor(&d, "getSeconds"), Value::Int(5400));
        assert_eq!(duration_accessor(&d, "getMilliseconds"), Value::Int(5_400_250));
    }
}
