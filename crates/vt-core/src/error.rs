//! Typed error definitions for the simulation core.
//!
//! [`VtError`] covers precondition violations and integration mistakes. Order
//! validation failures are *not* errors: they are returned as data by the
//! validator. All variants implement `std::error::Error` via `thiserror`, so
//! they convert into `anyhow::Error` at the edges.

use thiserror::Error;

use crate::types::OrderStatus;

/// Domain-specific errors for the simulation core.
#[derive(Debug, Error)]
pub enum VtError {
    /// Configuration parsing or validation error.
    #[error("config error: {0}")]
    Config(String),

    /// The instrument was never registered with the engine.
    #[error("unknown instrument: {0}")]
    UnknownInstrument(String),

    /// A tick carried no bid, ask or last and no earlier point exists.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A tick opened a bucket older than the newest bucket of its sequence.
    #[error("out-of-order tick for {instrument}: bucket {bucket} precedes {last}")]
    OutOfOrder { instrument: String, bucket: u64, last: u64 },

    /// An order status was asked to move backwards.
    #[error("invalid transition for order {id}: {from:?} -> {to:?}")]
    InvalidTransition { id: String, from: OrderStatus, to: OrderStatus },

    /// The engine worker has shut down.
    #[error("engine worker closed")]
    WorkerClosed,
}
