//! Events emitted by the engine worker to downstream consumers.
//!
//! Two streams leave the worker: bar updates ([`PointUpdate`]) and order
//! lifecycle changes ([`OrderUpdate`]). Both are tokio unbounded channels so
//! the worker thread never blocks on a slow consumer.

use serde::{Deserialize, Serialize};
use vt_core::{Deal, Order, Position, PricePoint};

/// A bar slot was created or updated by a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointUpdate {
    pub instrument: String,
    /// Position of the slot in the instrument's sequence.
    pub index: usize,
    pub point: PricePoint,
}

/// An order changed status (pending, filled, canceled) or was re-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order: Order,
    /// Deals closed by this change. Only fills produce deals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deals: Vec<Deal>,
    /// Position of the order's instrument after the change, `None` if flat.
    pub position: Option<Position>,
}

pub type PointSender = tokio::sync::mpsc::UnboundedSender<PointUpdate>;
pub type PointReceiver = tokio::sync::mpsc::UnboundedReceiver<PointUpdate>;
pub type OrderSender = tokio::sync::mpsc::UnboundedSender<OrderUpdate>;
pub type OrderReceiver = tokio::sync::mpsc::UnboundedReceiver<OrderUpdate>;

/// Sending halves, owned by the engine worker.
#[derive(Debug, Clone)]
pub struct EventSenders {
    pub points: PointSender,
    pub orders: OrderSender,
}

/// Receiving halves, polled by whoever consumes the simulation.
#[derive(Debug)]
pub struct EventReceivers {
    pub points: PointReceiver,
    pub orders: OrderReceiver,
}

/// Create both event channels.
pub fn channels() -> (EventSenders, EventReceivers) {
    let (point_tx, point_rx) = tokio::sync::mpsc::unbounded_channel();
    let (order_tx, order_rx) = tokio::sync::mpsc::unbounded_channel();
    (
        EventSenders { points: point_tx, orders: order_tx },
        EventReceivers { points: point_rx, orders: order_rx },
    )
}
