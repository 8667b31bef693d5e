//! Trading data structures — the order family.
//!
//! A submission starts as an [`OrderRequest`]. Accepted requests become
//! working [`Order`]s (pending or filled). Every execution is described by a
//! [`Fill`], which the ledger nets into one [`Position`] per instrument.
//! Closing or reducing a position produces an immutable [`Deal`].

use serde::{Deserialize, Serialize};

use super::enums::{Instruction, OrderStatus, OrderType, Side};
use crate::error::VtError;

// ---------------------------------------------------------------------------
// Order request (caller → engine)
// ---------------------------------------------------------------------------

/// An order submission, possibly with child legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-assigned id. Empty means "assign one".
    #[serde(default)]
    pub id: String,
    pub instrument: String,
    pub side: Side,
    #[serde(default, rename = "type")]
    pub order_type: OrderType,
    /// Limit / stop price. Ignored for market orders.
    #[serde(default)]
    pub price: Option<f64>,
    /// Stop-limit activation price.
    #[serde(default)]
    pub activation_price: Option<f64>,
    #[serde(default)]
    pub volume: f64,
    /// Correlates bracket siblings: orders sharing a descriptor cancel each
    /// other when one of them fills.
    #[serde(default)]
    pub descriptor: Option<String>,
    #[serde(default)]
    pub instruction: Instruction,
    /// Submission time (us). `None` uses the latest quote time.
    #[serde(default)]
    pub time_us: Option<u64>,
    #[serde(default)]
    pub children: Vec<OrderRequest>,
}

impl OrderRequest {
    pub fn market(instrument: &str, side: Side, volume: f64) -> Self {
        Self {
            id: String::new(),
            instrument: instrument.to_string(),
            side,
            order_type: OrderType::Market,
            price: None,
            activation_price: None,
            volume,
            descriptor: None,
            instruction: Instruction::Side,
            time_us: None,
            children: Vec::new(),
        }
    }

    pub fn limit(instrument: &str, side: Side, volume: f64, price: f64) -> Self {
        Self { order_type: OrderType::Limit, price: Some(price), ..Self::market(instrument, side, volume) }
    }

    pub fn stop(instrument: &str, side: Side, volume: f64, price: f64) -> Self {
        Self { order_type: OrderType::Stop, price: Some(price), ..Self::market(instrument, side, volume) }
    }

    pub fn stop_limit(instrument: &str, side: Side, volume: f64, activation: f64, price: f64) -> Self {
        Self {
            order_type: OrderType::StopLimit,
            price: Some(price),
            activation_price: Some(activation),
            ..Self::market(instrument, side, volume)
        }
    }

    /// A group container with no volume of its own.
    pub fn group(instrument: &str, side: Side) -> Self {
        Self { instruction: Instruction::Group, ..Self::market(instrument, side, 0.0) }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn with_descriptor(mut self, descriptor: &str) -> Self {
        self.descriptor = Some(descriptor.to_string());
        self
    }

    /// Attach a bracket leg (stop-loss or take-profit).
    pub fn with_brace(mut self, mut child: OrderRequest) -> Self {
        child.instruction = Instruction::Brace;
        self.children.push(child);
        self
    }

    /// Attach an independent executable leg.
    pub fn with_leg(mut self, mut child: OrderRequest) -> Self {
        child.instruction = Instruction::Side;
        self.children.push(child);
        self
    }
}

// ---------------------------------------------------------------------------
// Transaction / Order (engine → caller)
// ---------------------------------------------------------------------------

/// Execution state embedded in every working order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub instrument: String,
    /// Filled volume.
    pub volume: f64,
    /// Average fill price, once filled.
    pub price: Option<f64>,
    pub status: OrderStatus,
    /// Time of the last status change (us).
    pub time_us: u64,
    pub descriptor: Option<String>,
}

/// A working order: accepted by the engine, pending or already executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<f64>,
    pub activation_price: Option<f64>,
    /// Requested volume.
    pub volume: f64,
    pub instruction: Instruction,
    pub transaction: Transaction,
    /// Bracket legs that become pending once this order fills.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brackets: Vec<Order>,
}

impl Order {
    /// Build a working order from a request leg. Children are not copied;
    /// the engine decides what to do with them.
    pub fn from_request(request: &OrderRequest, id: String, descriptor: Option<String>, time_us: u64) -> Self {
        Self {
            id,
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            activation_price: request.activation_price,
            volume: request.volume,
            instruction: request.instruction,
            transaction: Transaction {
                instrument: request.instrument.clone(),
                volume: 0.0,
                price: None,
                status: OrderStatus::None,
                time_us,
                descriptor,
            },
            brackets: Vec::new(),
        }
    }

    #[inline]
    pub fn instrument(&self) -> &str {
        &self.transaction.instrument
    }

    #[inline]
    pub fn descriptor(&self) -> Option<&str> {
        self.transaction.descriptor.as_deref()
    }

    #[inline]
    pub fn status(&self) -> OrderStatus {
        self.transaction.status
    }

    /// Move to `next`, rejecting backwards transitions.
    pub fn advance(&mut self, next: OrderStatus, time_us: u64) -> Result<(), VtError> {
        let current = self.transaction.status;
        if !current.can_transition_to(next) {
            return Err(VtError::InvalidTransition { id: self.id.clone(), from: current, to: next });
        }
        self.transaction.status = next;
        self.transaction.time_us = time_us;
        Ok(())
    }

    /// Mark the whole requested volume as executed at `price`.
    pub fn fill(&mut self, price: f64, time_us: u64) -> Result<Fill, VtError> {
        self.advance(OrderStatus::Filled, time_us)?;
        self.transaction.volume = self.volume;
        self.transaction.price = Some(price);
        Ok(Fill {
            order_id: self.id.clone(),
            instrument: self.transaction.instrument.clone(),
            side: self.side,
            volume: self.volume,
            price,
            time_us,
            descriptor: self.transaction.descriptor.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Fill / Position / Deal (ledger)
// ---------------------------------------------------------------------------

/// One executed leg handed to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub instrument: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub time_us: u64,
    pub descriptor: Option<String>,
}

/// The open, netted exposure of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Id of the order that last opened or increased the position.
    pub id: String,
    pub instrument: String,
    pub side: Side,
    pub volume: f64,
    /// Volume-weighted average open price.
    pub price: f64,
    pub descriptor: Option<String>,
    pub open_time_us: u64,
    pub time_us: u64,
    /// Unrealized gain at the latest quote.
    #[serde(default)]
    pub gain: f64,
}

impl Position {
    pub fn open(fill: &Fill) -> Self {
        Self {
            id: fill.order_id.clone(),
            instrument: fill.instrument.clone(),
            side: fill.side,
            volume: fill.volume,
            price: fill.price,
            descriptor: fill.descriptor.clone(),
            open_time_us: fill.time_us,
            time_us: fill.time_us,
            gain: 0.0,
        }
    }
}

/// A closed (fully or partially) slice of a position. Never mutated after it
/// is recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    /// Id of the closing order.
    pub id: String,
    /// Id of the position that was closed.
    pub position_id: String,
    pub instrument: String,
    /// Side of the closed position.
    pub side: Side,
    pub volume: f64,
    pub open_price: f64,
    pub close_price: f64,
    /// Realized gain, already credited to the balance.
    pub gain: f64,
    pub open_time_us: u64,
    pub close_time_us: u64,
    pub descriptor: Option<String>,
}
