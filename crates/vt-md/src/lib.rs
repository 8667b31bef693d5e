//! # vt-md
//!
//! Market data side of the simulated terminal: where ticks come from and how
//! they are folded into bars.
//!
//! ## Architecture
//!
//! A [`source::TickSource`] opens one stream per instrument. The
//! [`feed::ReplayFeed`] drives those streams on a timer and hands ticks to a
//! [`TickSink`] (in practice the engine worker), which aggregates them with
//! [`aggregator::upsert`].
//!
//! - [`aggregator`] — `GroupedSequence` + bucketed bar upsert
//! - [`source`] — in-memory and JSON-lines tick sources
//! - [`feed`] — per-instrument replay tasks
//! - [`json_util`] — JSON parsing helpers

pub mod aggregator;
pub mod feed;
pub mod json_util;
pub mod source;

use vt_core::PricePoint;

/// Consumer of replayed ticks.
///
/// Implementations must not block for long: `deliver` is called from the
/// replay tasks.
pub trait TickSink: Send + Sync {
    /// Hand over one tick. Returns `false` once the consumer is gone, which
    /// stops the replay task.
    fn deliver(&self, point: PricePoint) -> bool;
}
