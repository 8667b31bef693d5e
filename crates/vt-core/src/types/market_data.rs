//! Market data structures — quotes and the bars aggregated from them.
//!
//! # Timestamp convention
//!
//! All timestamps are in **microseconds since Unix epoch** (us).

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// PriceBar (OHLC)
// ---------------------------------------------------------------------------

/// Open/high/low/close of one time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// A flat bar where all four prices are `price`.
    pub fn flat(price: f64) -> Self {
        Self { open: price, high: price, low: price, close: price }
    }
}

// ---------------------------------------------------------------------------
// PricePoint
// ---------------------------------------------------------------------------

/// A single quote observation for one instrument.
///
/// The point refers to its instrument by name only; instruments and their
/// point sequences are stored in separate maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PricePoint {
    /// Instrument name (e.g. `"SPY"`).
    pub instrument: String,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub last: Option<f64>,
    #[serde(default)]
    pub bid_size: Option<f64>,
    #[serde(default)]
    pub ask_size: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    /// Observation time (us since epoch).
    pub timestamp_us: u64,
    /// Aggregated bar, filled in by the aggregator.
    #[serde(default)]
    pub bar: Option<PriceBar>,
}

impl PricePoint {
    /// Shorthand for a quote with bid and ask only.
    pub fn quote(instrument: &str, bid: f64, ask: f64, timestamp_us: u64) -> Self {
        Self {
            instrument: instrument.to_string(),
            bid: Some(bid),
            ask: Some(ask),
            timestamp_us,
            ..Default::default()
        }
    }

    /// Trade price of this point: `last`, then `bid`, then `ask`.
    #[inline]
    pub fn trade_price(&self) -> Option<f64> {
        self.last.or(self.bid).or(self.ask)
    }

    /// Price a buyer pays right now (ask, falling back to the trade price).
    #[inline]
    pub fn buy_price(&self) -> Option<f64> {
        self.ask.or_else(|| self.trade_price())
    }

    /// Price a seller receives right now (bid, falling back to the trade price).
    #[inline]
    pub fn sell_price(&self) -> Option<f64> {
        self.bid.or_else(|| self.trade_price())
    }
}

impl std::fmt::Display for PricePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fmt_opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |p| format!("{p:.4}"));
        write!(
            f,
            "Point({} bid={} ask={} last={} ts={})",
            self.instrument,
            fmt_opt(self.bid),
            fmt_opt(self.ask),
            fmt_opt(self.last),
            self.timestamp_us
        )
    }
}
