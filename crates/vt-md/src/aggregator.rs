//! Tick aggregation into time-bucketed bars.
//!
//! Every tick is folded into a [`GroupedSequence`]: an append-only vector with
//! one [`PricePoint`] per bucket plus a bucket → position table. A tick whose
//! bucket already exists updates that slot in place; otherwise a new slot is
//! appended.
//!
//! ```text
//! tick ──► bucket_index(ts, frame) ──► exists? ──yes──► merge into slot
//!                                          └─────no──► append new bar
//! ```

use ahash::AHashMap;
use vt_core::time_util::bucket_index;
use vt_core::{PriceBar, PricePoint, VtError};

// ---------------------------------------------------------------------------
// GroupedSequence
// ---------------------------------------------------------------------------

/// Time-ordered bars of one instrument, one slot per bucket.
///
/// Slots are never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct GroupedSequence {
    items: Vec<PricePoint>,
    index: AHashMap<u64, usize>,
    last_bucket: Option<u64>,
}

impl GroupedSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Newest bar.
    pub fn last(&self) -> Option<&PricePoint> {
        self.items.last()
    }

    pub fn get(&self, position: usize) -> Option<&PricePoint> {
        self.items.get(position)
    }

    /// Position of a bucket in the sequence.
    pub fn position_of(&self, bucket: u64) -> Option<usize> {
        self.index.get(&bucket).copied()
    }

    pub fn get_by_bucket(&self, bucket: u64) -> Option<&PricePoint> {
        self.position_of(bucket).map(|i| &self.items[i])
    }

    pub fn as_slice(&self) -> &[PricePoint] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PricePoint> {
        self.items.iter()
    }
}

// ---------------------------------------------------------------------------
// upsert
// ---------------------------------------------------------------------------

/// Returns `true` if a trade price can be derived for `point`, either from its
/// own quote or from `previous`.
#[inline]
pub fn has_usable_price(point: &PricePoint, previous: Option<&PricePoint>) -> bool {
    point.trade_price().is_some() || previous.is_some_and(|p| p.trade_price().is_some())
}

/// Fold `point` into `sequence` and return the bar slot it landed in.
///
/// - Existing bucket: bid/ask default to the trade price when the tick omits
///   them, sizes accumulate, volume is replaced when present, close becomes the
///   trade price, open is kept, high/low extend.
/// - New bucket: the bar opens at the previous bucket's close (or the trade
///   price for the first bar).
///
/// The trade price is `last ?? bid ?? ask`, falling back to the last price of
/// the slot being updated (or of the newest slot for a new bucket).
///
/// # Errors
///
/// - [`VtError::Precondition`] when no trade price can be derived. Callers are
///   expected to check [`has_usable_price`] first.
/// - [`VtError::OutOfOrder`] when the tick would open a bucket older than the
///   newest one.
pub fn upsert<'a>(
    sequence: &'a mut GroupedSequence,
    point: &PricePoint,
    time_frame_us: Option<u64>,
) -> Result<&'a PricePoint, VtError> {
    let bucket = bucket_index(point.timestamp_us, time_frame_us);
    let existing = sequence.position_of(bucket);

    let fallback = match existing {
        Some(pos) => sequence.items.get(pos),
        None => sequence.last(),
    };
    let price = point
        .trade_price()
        .or_else(|| fallback.and_then(PricePoint::trade_price))
        .ok_or_else(|| {
            VtError::Precondition(format!(
                "{}: tick at {} has no bid, ask or last",
                point.instrument, point.timestamp_us
            ))
        })?;

    if let Some(pos) = existing {
        let current = &mut sequence.items[pos];
        merge_into(current, point, price);
        return Ok(&sequence.items[pos]);
    }

    if let Some(last) = sequence.last_bucket.filter(|&last| bucket < last) {
        return Err(VtError::OutOfOrder { instrument: point.instrument.clone(), bucket, last });
    }

    let open = sequence.last().and_then(|p| p.bar).map_or(price, |b| b.close);
    let mut bar = PriceBar { open, high: open.max(price), low: open.min(price), close: price };
    if let Some(incoming) = point.bar {
        bar.high = bar.high.max(incoming.high);
        bar.low = bar.low.min(incoming.low);
    }

    sequence.items.push(PricePoint {
        instrument: point.instrument.clone(),
        bid: Some(point.bid.unwrap_or(price)),
        ask: Some(point.ask.unwrap_or(price)),
        last: Some(price),
        bid_size: Some(point.bid_size.unwrap_or(0.0)),
        ask_size: Some(point.ask_size.unwrap_or(0.0)),
        volume: point.volume,
        timestamp_us: point.timestamp_us,
        bar: Some(bar),
    });
    let pos = sequence.items.len() - 1;
    sequence.index.insert(bucket, pos);
    sequence.last_bucket = Some(bucket);

    Ok(&sequence.items[pos])
}

/// Merge a tick into the slot of its (already open) bucket.
fn merge_into(current: &mut PricePoint, point: &PricePoint, price: f64) {
    current.bid = Some(point.bid.unwrap_or(price));
    current.ask = Some(point.ask.unwrap_or(price));
    current.bid_size = Some(current.bid_size.unwrap_or(0.0) + point.bid_size.unwrap_or(0.0));
    current.ask_size = Some(current.ask_size.unwrap_or(0.0) + point.ask_size.unwrap_or(0.0));
    if point.volume.is_some() {
        current.volume = point.volume;
    }
    current.last = Some(price);
    current.timestamp_us = point.timestamp_us;

    // open is only written when the slot has no bar yet
    let bar = current.bar.get_or_insert(PriceBar::flat(price));
    bar.close = price;
    bar.high = bar.high.max(price);
    bar.low = bar.low.min(price);
    if let Some(incoming) = point.bar {
        bar.high = bar.high.max(incoming.high);
        bar.low = bar.low.min(incoming.low);
    }
}
