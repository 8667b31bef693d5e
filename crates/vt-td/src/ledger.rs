//! Account ledger: balance, netted positions, pending orders and deals.
//!
//! # Netting
//!
//! There is at most one position per instrument. A fill on the same side
//! grows it at the volume-weighted average price; a fill on the opposite
//! side reduces, closes or reverses it:
//!
//! ```text
//! |open - fill| ~ 0   → full close, one deal, position removed
//! open > fill         → partial close, deal of `fill`, position shrinks
//! open < fill         → close + reverse, deal of `open`, new opposite position
//! ```
//!
//! Realized gain of every deal is credited to the balance immediately.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use vt_core::{Deal, Fill, Order, OrderStatus, Position, PricePoint};

use crate::gain;

/// Volumes closer than this are treated as equal.
pub const EPSILON: f64 = 1e-12;

/// What one fill did to the ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FillOutcome {
    /// Deals closed by this fill (zero or one).
    pub deals: Vec<Deal>,
    /// Position of the instrument after the fill, `None` if flat.
    pub position: Option<Position>,
}

/// Point-in-time account summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub name: String,
    pub initial_balance: f64,
    pub balance: f64,
    pub realized_gain: f64,
    pub unrealized_gain: f64,
    /// `balance + unrealized_gain`.
    pub equity: f64,
    pub open_positions: usize,
    pub pending_orders: usize,
    pub deals: usize,
}

/// In-memory state of the single simulated account.
#[derive(Debug, Clone)]
pub struct Ledger {
    name: String,
    initial_balance: f64,
    balance: f64,
    positions: AHashMap<String, Position>,
    /// Pending orders keyed by arrival sequence.
    orders: BTreeMap<u64, Order>,
    deals: Vec<Deal>,
}

impl Ledger {
    pub fn new(name: &str, balance: f64) -> Self {
        Self {
            name: name.to_string(),
            initial_balance: balance,
            balance,
            positions: AHashMap::new(),
            orders: BTreeMap::new(),
            deals: Vec::new(),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn initial_balance(&self) -> f64 {
        self.initial_balance
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Open positions sorted by instrument.
    pub fn positions(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self.positions.values().cloned().collect();
        out.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        out
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    // -- pending orders --

    /// Pending orders in arrival order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// `true` if `id` names a pending order or one of its dormant brackets.
    pub fn has_order(&self, id: &str) -> bool {
        self.orders.values().any(|o| o.id == id || o.brackets.iter().any(|b| b.id == id))
    }

    /// Store a pending order. Orders in any other status are rejected.
    pub fn insert_order(&mut self, seq: u64, order: Order) -> bool {
        if order.status() != OrderStatus::Pending {
            return false;
        }
        self.orders.insert(seq, order);
        true
    }

    /// Arrival sequences of the pending orders of `instrument`, oldest first.
    pub fn pending_for(&self, instrument: &str) -> Vec<u64> {
        self.orders.iter().filter(|(_, o)| o.instrument() == instrument).map(|(k, _)| *k).collect()
    }

    /// Arrival sequences of pending orders carrying `descriptor`.
    pub fn pending_with_descriptor(&self, descriptor: &str) -> Vec<u64> {
        self.orders.iter().filter(|(_, o)| o.descriptor() == Some(descriptor)).map(|(k, _)| *k).collect()
    }

    pub fn order_mut(&mut self, seq: u64) -> Option<&mut Order> {
        self.orders.get_mut(&seq)
    }

    pub fn take_order(&mut self, seq: u64) -> Option<Order> {
        self.orders.remove(&seq)
    }

    pub fn take_order_by_id(&mut self, id: &str) -> Option<Order> {
        let seq = self.orders.iter().find(|(_, o)| o.id == id).map(|(k, _)| *k)?;
        self.orders.remove(&seq)
    }

    // -- fills --

    /// Net one fill into the instrument's position.
    pub fn apply_fill(&mut self, fill: &Fill, leverage: f64) -> FillOutcome {
        let mut deals = Vec::new();

        let next = match self.positions.remove(&fill.instrument) {
            None => Some(Position::open(fill)),
            Some(mut pos) if pos.side == fill.side => {
                let volume = pos.volume + fill.volume;
                pos.price = (pos.price * pos.volume + fill.price * fill.volume) / volume;
                pos.volume = volume;
                pos.id = fill.order_id.clone();
                pos.descriptor = fill.descriptor.clone();
                pos.time_us = fill.time_us;
                Some(pos)
            }
            Some(mut pos) => {
                let remaining = pos.volume - fill.volume;
                if remaining.abs() <= EPSILON {
                    deals.push(self.close(&pos, pos.volume, fill, leverage));
                    None
                } else if remaining > 0.0 {
                    deals.push(self.close(&pos, fill.volume, fill, leverage));
                    pos.volume = remaining;
                    pos.time_us = fill.time_us;
                    pos.gain = gain::estimate(pos.side, pos.price, fill.price, pos.volume, leverage);
                    Some(pos)
                } else {
                    deals.push(self.close(&pos, pos.volume, fill, leverage));
                    let mut reversed = Position::open(fill);
                    reversed.volume = -remaining;
                    Some(reversed)
                }
            }
        };

        let position = next.filter(|p| p.volume > EPSILON);
        if let Some(ref p) = position {
            self.positions.insert(p.instrument.clone(), p.clone());
        }
        FillOutcome { deals, position }
    }

    fn close(&mut self, pos: &Position, volume: f64, fill: &Fill, leverage: f64) -> Deal {
        let realized = gain::estimate(pos.side, pos.price, fill.price, volume, leverage);
        self.balance += realized;
        let deal = Deal {
            id: fill.order_id.clone(),
            position_id: pos.id.clone(),
            instrument: pos.instrument.clone(),
            side: pos.side,
            volume,
            open_price: pos.price,
            close_price: fill.price,
            gain: realized,
            open_time_us: pos.open_time_us,
            close_time_us: fill.time_us,
            descriptor: pos.descriptor.clone(),
        };
        self.deals.push(deal.clone());
        deal
    }

    /// Refresh the unrealized gain of the instrument's position.
    pub fn mark(&mut self, point: &PricePoint, leverage: f64) -> Option<f64> {
        let pos = self.positions.get_mut(&point.instrument)?;
        let g = gain::unrealized(pos, point, leverage)?;
        pos.gain = g;
        Some(g)
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        let realized_gain = self.deals.iter().map(|d| d.gain).sum();
        let unrealized_gain: f64 = self.positions.values().map(|p| p.gain).sum();
        AccountSnapshot {
            name: self.name.clone(),
            initial_balance: self.initial_balance,
            balance: self.balance,
            realized_gain,
            unrealized_gain,
            equity: self.balance + unrealized_gain,
            open_positions: self.positions.len(),
            pending_orders: self.orders.len(),
            deals: self.deals.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vt_core::{OrderRequest, Side};

    fn fill(id: &str, side: Side, volume: f64, price: f64, t: u64) -> Fill {
        Fill {
            order_id: id.into(),
            instrument: "SPY".into(),
            side,
            volume,
            price,
            time_us: t,
            descriptor: None,
        }
    }

    #[test]
    fn same_side_fills_average() {
        let mut l = Ledger::new("t", 1000.0);
        l.apply_fill(&fill("a", Side::Buy, 100.0, 10.0, 1), 1.0);
        let out = l.apply_fill(&fill("b", Side::Buy, 50.0, 13.0, 2), 1.0);

        assert!(out.deals.is_empty());
        let pos = l.position("SPY").unwrap();
        assert_eq!(pos.volume, 150.0);
        assert!((pos.price - 11.0).abs() < 1e-9);
        assert_eq!(pos.id, "b");
        assert_eq!(pos.open_time_us, 1);
        assert_eq!(l.positions().len(), 1);
        assert_eq!(l.balance(), 1000.0);
    }

    #[test]
    fn partial_close_of_option_short() {
        let mut l = Ledger::new("t", 0.0);
        l.apply_fill(&fill("a", Side::Sell, 2.0, 5.0, 1), 100.0);
        let out = l.apply_fill(&fill("b", Side::Buy, 1.0, 4.0, 2), 100.0);

        assert_eq!(out.deals.len(), 1);
        assert_eq!(out.deals[0].volume, 1.0);
        assert_eq!(out.deals[0].gain, 100.0);
        let pos = out.position.unwrap();
        assert_eq!(pos.side, Side::Sell);
        assert_eq!(pos.volume, 1.0);
        assert_eq!(l.balance(), 100.0);
    }

    #[test]
    fn full_close_removes_position() {
        let mut l = Ledger::new("t", 0.0);
        l.apply_fill(&fill("a", Side::Buy, 3.0, 10.0, 1), 1.0);
        let out = l.apply_fill(&fill("b", Side::Sell, 3.0, 9.0, 2), 1.0);
        assert!(out.position.is_none());
        assert!(l.position("SPY").is_none());
        assert_eq!(l.deals().len(), 1);
        assert_eq!(l.balance(), -3.0);
    }

    #[test]
    fn opposite_fill_reverses() {
        let mut l = Ledger::new("t", 0.0);
        l.apply_fill(&fill("a", Side::Buy, 5.0, 10.0, 1), 1.0);
        let out = l.apply_fill(&fill("b", Side::Sell, 10.0, 12.0, 2), 1.0);

        assert_eq!(out.deals.len(), 1);
        assert_eq!(out.deals[0].volume, 5.0);
        assert_eq!(out.deals[0].close_price, 12.0);
        assert_eq!(out.deals[0].gain, 10.0);
        let pos = l.position("SPY").unwrap();
        assert_eq!(pos.side, Side::Sell);
        assert_eq!(pos.volume, 5.0);
        assert_eq!(pos.price, 12.0);
        assert_eq!(pos.open_time_us, 2);
    }

    #[test]
    fn mark_uses_closing_side() {
        let mut l = Ledger::new("t", 100.0);
        l.apply_fill(&fill("a", Side::Buy, 2.0, 10.0, 1), 1.0);
        assert_eq!(l.mark(&PricePoint::quote("SPY", 11.0, 11.5, 2), 1.0), Some(2.0));
        let snap = l.snapshot();
        assert_eq!(snap.unrealized_gain, 2.0);
        assert_eq!(snap.equity, 102.0);
        assert_eq!(snap.open_positions, 1);
        assert_eq!(l.mark(&PricePoint::quote("QQQ", 1.0, 1.0, 2), 1.0), None);
    }

    #[test]
    fn only_pending_orders_are_stored() {
        let mut l = Ledger::new("t", 0.0);
        let req = OrderRequest::limit("SPY", Side::Buy, 1.0, 9.0);
        let mut order = Order::from_request(&req, "ORD-000001".into(), None, 0);
        assert!(!l.insert_order(1, order.clone()));
        order.advance(OrderStatus::Pending, 0).unwrap();
        assert!(l.insert_order(1, order));
        assert!(l.has_order("ORD-000001"));
        assert_eq!(l.pending_for("SPY"), vec![1]);
        assert!(l.take_order_by_id("ORD-000001").is_some());
        assert!(l.take_order_by_id("ORD-000001").is_none());
    }
}
