//! Normalization of duck-typed timestamp values at the store/gateway
//! boundary. Persisted records and provider payloads carry dates in
//! several shapes (RFC 3339 strings, epoch seconds or milliseconds,
//! `{seconds, nanos}` objects); everything past this module only ever
//! sees `DateTime<Utc>`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

// Epoch values this large cannot be seconds for any plausible date, so
// they are read as milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parses a raw stored timestamp into a normalized UTC datetime.
/// Returns `None` for shapes that cannot be interpreted.
pub fn parse_stored_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::String(s) => parse_string(s),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                parse_epoch(i)
            } else {
                n.as_f64()
                    .and_then(|f| DateTime::from_timestamp(f.trunc() as i64, nanos_of(f)))
            }
        }
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanos")
                .or_else(|| map.get("nanoseconds"))
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos as u32)
        }
        _ => None,
    }
}

fn parse_string(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Bare datetimes without an offset are taken as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn parse_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

fn nanos_of(f: f64) -> u32 {
    ((f.fract() * 1_000_000_000.0).round() as i64).clamp(0, 999_999_999) as u32
}
