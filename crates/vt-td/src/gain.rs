//! Gain estimation.
//!
//! `gain = (close - open) * signed volume * leverage`, signed volume being
//! positive for a long and negative for a short. Open positions are marked at
//! the price they could be closed at right now: the bid for a long, the ask
//! for a short.

use vt_core::{Position, PricePoint, Side};

/// Gain of moving `volume` from `open` to `close` on a `side` position.
#[inline]
pub fn estimate(side: Side, open: f64, close: f64, volume: f64, leverage: f64) -> f64 {
    (close - open) * side.sign() * volume * leverage
}

/// Price a position of `side` would be closed at.
#[inline]
pub fn mark_price(side: Side, point: &PricePoint) -> Option<f64> {
    match side {
        Side::Buy => point.sell_price(),
        Side::Sell => point.buy_price(),
    }
}

/// Unrealized gain of `position` at `point`.
pub fn unrealized(position: &Position, point: &PricePoint, leverage: f64) -> Option<f64> {
    let close = mark_price(position.side, point)?;
    Some(estimate(position.side, position.price, close, position.volume, leverage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: Side, volume: f64, price: f64) -> Position {
        Position {
            id: "p".into(),
            instrument: "SPY".into(),
            side,
            volume,
            price,
            descriptor: None,
            open_time_us: 0,
            time_us: 0,
            gain: 0.0,
        }
    }

    #[test]
    fn sign_follows_side() {
        assert_eq!(estimate(Side::Buy, 10.0, 12.0, 3.0, 1.0), 6.0);
        assert_eq!(estimate(Side::Sell, 10.0, 12.0, 3.0, 1.0), -6.0);
        assert_eq!(estimate(Side::Sell, 10.0, 8.0, 1.0, 100.0), 200.0);
    }

    #[test]
    fn long_marks_at_bid_short_at_ask() {
        let q = PricePoint::quote("SPY", 11.0, 11.5, 0);
        assert_eq!(unrealized(&position(Side::Buy, 2.0, 10.0), &q, 1.0), Some(2.0));
        assert_eq!(unrealized(&position(Side::Sell, 2.0, 12.0), &q, 1.0), Some(1.0));
        assert_eq!(unrealized(&position(Side::Buy, 1.0, 10.0), &PricePoint::default(), 1.0), None);
    }
}
