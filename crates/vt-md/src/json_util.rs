//! JSON parsing helpers for recorded tick files.
//!
//! Recorders disagree on how numbers are written: some emit native JSON
//! numbers (`10.5`), others quote them (`"10.5"`). Every numeric field goes
//! through [`parse_str_f64`] / [`parse_str_u64`], which accept both.

use serde_json::Value;
use vt_core::{PriceBar, PricePoint};

/// Parse a JSON value (string or number) as `f64`.
#[inline]
pub fn parse_str_f64(v: Option<&Value>) -> Option<f64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        fast_float2::parse(s).ok()
    } else {
        v.as_f64()
    }
}

/// Parse a JSON value (string or number) as `u64`.
#[inline]
pub fn parse_str_u64(v: Option<&Value>) -> Option<u64> {
    let v = v?;
    if let Some(s) = v.as_str() {
        s.parse().ok()
    } else {
        v.as_u64()
    }
}

/// Parse a named field on a JSON object as `f64` (string or number).
#[inline]
pub fn parse_f64_field(v: &Value, key: &str) -> Option<f64> {
    parse_str_f64(v.get(key))
}

/// Build a [`PricePoint`] from one JSON tick object.
///
/// Recognized fields: `bid`, `ask`, `last`, `bid_size`, `ask_size`, `volume`,
/// `timestamp_us` (or `timestamp_ms`) and an optional `bar` object with
/// `open`/`high`/`low`/`close`. `instrument` is used unless the object names
/// its own. Returns `None` when the object has no timestamp or the timestamp
/// does not fit in microseconds.
pub fn parse_tick(v: &Value, instrument: &str) -> Option<PricePoint> {
    let timestamp_us = parse_str_u64(v.get("timestamp_us")).or_else(|| {
        parse_str_u64(v.get("timestamp_ms")).and_then(|ms| ms.checked_mul(vt_core::time_util::US_PER_MS))
    })?;

    let bar = v.get("bar").and_then(|b| {
        Some(PriceBar {
            open: parse_f64_field(b, "open")?,
            high: parse_f64_field(b, "high")?,
            low: parse_f64_field(b, "low")?,
            close: parse_f64_field(b, "close")?,
        })
    });

    Some(PricePoint {
        instrument: v.get("instrument").and_then(Value::as_str).unwrap_or(instrument).to_string(),
        bid: parse_f64_field(v, "bid"),
        ask: parse_f64_field(v, "ask"),
        last: parse_f64_field(v, "last"),
        bid_size: parse_f64_field(v, "bid_size"),
        ask_size: parse_f64_field(v, "ask_size"),
        volume: parse_f64_field(v, "volume"),
        timestamp_us,
        bar,
    })
}

/// Parse one line of a `.jsonl` tick file. Malformed lines yield `None`.
pub fn parse_tick_line(line: &str, instrument: &str) -> Option<PricePoint> {
    let v: Value = serde_json::from_str(line).ok()?;
    parse_tick(&v, instrument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_and_strings_both_parse() {
        assert_eq!(parse_str_f64(Some(&json!("30000.5"))), Some(30000.5));
        assert_eq!(parse_str_f64(Some(&json!(30000.5))), Some(30000.5));
        assert_eq!(parse_str_f64(Some(&json!("abc"))), None);
        assert_eq!(parse_str_f64(None), None);
        assert_eq!(parse_str_u64(Some(&json!("17"))), Some(17));
        assert_eq!(parse_str_u64(Some(&json!(17))), Some(17));
    }

    #[test]
    fn tick_line_with_mixed_encodings() {
        let line = r#"{"bid":"10.1","ask":10.2,"bid_size":"3","timestamp_us":"1700000000000000"}"#;
        let p = parse_tick_line(line, "SPY").unwrap();
        assert_eq!(p.instrument, "SPY");
        assert_eq!(p.bid, Some(10.1));
        assert_eq!(p.ask, Some(10.2));
        assert_eq!(p.bid_size, Some(3.0));
        assert_eq!(p.last, None);
        assert_eq!(p.timestamp_us, 1_700_000_000_000_000);
    }

    #[test]
    fn millisecond_timestamps_and_bars() {
        let line = r#"{"instrument":"QQQ","last":5,"timestamp_ms":2,
                       "bar":{"open":4,"high":6,"low":3,"close":5}}"#;
        let p = parse_tick_line(line, "SPY").unwrap();
        assert_eq!(p.instrument, "QQQ");
        assert_eq!(p.timestamp_us, 2_000);
        assert_eq!(p.bar, Some(PriceBar { open: 4.0, high: 6.0, low: 3.0, close: 5.0 }));
    }

    #[test]
    fn rejects_garbage_and_missing_timestamp() {
        assert!(parse_tick_line("not json", "SPY").is_none());
        assert!(parse_tick_line(r#"{"bid":1.0}"#, "SPY").is_none());
        // microseconds would not fit in u64
        assert!(parse_tick_line(r#"{"bid":1,"timestamp_ms":18446744073709552}"#, "SPY").is_none());
    }
}
