//! Order matching engine.
//!
//! [`MatchingEngine`] owns everything the simulation mutates: instrument
//! definitions, the aggregated bar sequences and the [`Ledger`]. It is driven
//! by two kinds of input, ticks and order submissions, and is only ever
//! touched by one thread (see [`crate::worker`]).
//!
//! # Tick cycle
//!
//! ```text
//! tick ──► upsert bar ──► mark position ──► scan pending (arrival order)
//!                                             ├─ stop-limit activated → limit
//!                                             ├─ triggered → cancel siblings → fill → activate brackets
//!                                             └─ otherwise stays pending
//! ```
//!
//! Trigger rules (buys execute at the ask, sells at the bid):
//!
//! | order                   | fires when   |
//! |-------------------------|--------------|
//! | buy stop / sell limit   | ask >= price |
//! | sell stop / buy limit   | bid <= price |
//!
//! Every status change is queued as an [`OrderUpdate`]; the worker drains the
//! queue with [`MatchingEngine::take_updates`] after each command.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vt_core::time_util::bucket_index;
use vt_core::{
    Deal, Instruction, Instrument, Order, OrderRequest, OrderStatus, OrderType, Position, PricePoint, Side, VtError,
};
use vt_md::aggregator::{self, GroupedSequence};

use crate::event::{OrderUpdate, PointUpdate};
use crate::ledger::{AccountSnapshot, EPSILON, Ledger};
use crate::validator::{self, QuoteLookup, ValidationError};

/// Result of a submission. Either `orders` or `errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Orders created by the batch: filled market legs, pending legs and
    /// brackets that became pending.
    pub orders: Vec<Order>,
    pub errors: Vec<ValidationError>,
}

impl SubmitResponse {
    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Market state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Market {
    instruments: AHashMap<String, Instrument>,
    sequences: AHashMap<String, GroupedSequence>,
}

impl QuoteLookup for Market {
    fn is_registered(&self, instrument: &str) -> bool {
        self.instruments.contains_key(instrument)
    }

    fn current(&self, instrument: &str) -> Option<&PricePoint> {
        self.sequences.get(instrument).and_then(GroupedSequence::last)
    }
}

// ---------------------------------------------------------------------------
// MatchingEngine
// ---------------------------------------------------------------------------

pub struct MatchingEngine {
    market: Market,
    ledger: Ledger,
    /// Source of order ids and of the pending-map arrival order.
    seq: u64,
    outbox: Vec<OrderUpdate>,
}

impl MatchingEngine {
    pub fn new(ledger: Ledger) -> Self {
        Self { market: Market::default(), ledger, seq: 0, outbox: Vec::new() }
    }

    /// Add or replace an instrument definition. Existing bars are kept.
    pub fn register(&mut self, instrument: Instrument) {
        info!("[engine] registered {} ({})", instrument.name, instrument.kind);
        self.market.sequences.entry(instrument.name.clone()).or_default();
        self.market.instruments.insert(instrument.name.clone(), instrument);
    }

    pub fn instrument(&self, name: &str) -> Option<&Instrument> {
        self.market.instruments.get(name)
    }

    /// Latest bar slot of `instrument`.
    pub fn current(&self, instrument: &str) -> Option<&PricePoint> {
        self.market.current(instrument)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Drain the queued order updates.
    pub fn take_updates(&mut self) -> Vec<OrderUpdate> {
        std::mem::take(&mut self.outbox)
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn leverage(&self, instrument: &str) -> f64 {
        self.market.instruments.get(instrument).map_or(1.0, Instrument::leverage)
    }

    fn emit(&mut self, order: Order) {
        let position = self.ledger.position(order.instrument()).cloned();
        self.outbox.push(OrderUpdate { order, deals: Vec::new(), position });
    }

    // -----------------------------------------------------------------------
    // Ticks
    // -----------------------------------------------------------------------

    /// Aggregate one tick and run the pending orders of its instrument
    /// against it.
    ///
    /// # Errors
    ///
    /// `UnknownInstrument`, `Precondition` (no usable price) and `OutOfOrder`
    /// leave the engine untouched.
    pub fn on_tick(&mut self, point: PricePoint) -> Result<PointUpdate, VtError> {
        let instrument = self
            .market
            .instruments
            .get(&point.instrument)
            .ok_or_else(|| VtError::UnknownInstrument(point.instrument.clone()))?;
        let time_frame = instrument.time_frame_us;
        let leverage = instrument.leverage();

        let sequence = self.market.sequences.entry(point.instrument.clone()).or_default();
        if !aggregator::has_usable_price(&point, sequence.last()) {
            return Err(VtError::Precondition(format!("{}: first tick has no price", point.instrument)));
        }
        let slot = aggregator::upsert(sequence, &point, time_frame)?.clone();
        let index = sequence
            .position_of(bucket_index(point.timestamp_us, time_frame))
            .unwrap_or(sequence.len().saturating_sub(1));

        self.ledger.mark(&slot, leverage);
        self.match_pending(&slot)?;

        Ok(PointUpdate { instrument: point.instrument, index, point: slot })
    }

    fn match_pending(&mut self, point: &PricePoint) -> Result<(), VtError> {
        let (Some(ask), Some(bid)) = (point.buy_price(), point.sell_price()) else {
            return Ok(());
        };
        let time = point.timestamp_us;

        for seq in self.ledger.pending_for(&point.instrument) {
            // may already be gone: canceled as a sibling earlier in this scan
            let (retyped, fired) = match self.ledger.order_mut(seq) {
                None => continue,
                Some(order) => {
                    let retyped = activate_stop_limit(order, bid, ask);
                    (retyped.then(|| order.clone()), triggers(order, bid, ask))
                }
            };
            if let Some(order) = retyped {
                debug!("[engine] {} stop-limit activated, now limit {:?}", order.id, order.price);
                self.emit(order);
            }
            if !fired {
                continue;
            }

            let Some(order) = self.ledger.take_order(seq) else { continue };
            let price = match order.side {
                Side::Buy => ask,
                Side::Sell => bid,
            };
            debug!("[engine] {} {} {} triggered at {price}", order.id, order.side, order.order_type);
            if let Some(descriptor) = order.descriptor().map(str::to_string) {
                self.cancel_descriptor(&descriptor, time)?;
            }
            self.execute(order, price, time)?;
        }
        Ok(())
    }

    /// Cancel every pending order carrying `descriptor`.
    fn cancel_descriptor(&mut self, descriptor: &str, time_us: u64) -> Result<(), VtError> {
        for seq in self.ledger.pending_with_descriptor(descriptor) {
            if let Some(mut order) = self.ledger.take_order(seq) {
                order.advance(OrderStatus::Canceled, time_us)?;
                debug!("[engine] {} canceled with its bracket sibling", order.id);
                self.emit(order);
            }
        }
        Ok(())
    }

    /// Fill `order` completely at `price`, net it, then make its brackets
    /// pending. Returns the filled order followed by the activated brackets.
    fn execute(&mut self, mut order: Order, price: f64, time_us: u64) -> Result<Vec<Order>, VtError> {
        let leverage = self.leverage(order.instrument());
        let fill = order.fill(price, time_us)?;
        let mut outcome = self.ledger.apply_fill(&fill, leverage);
        // the remaining or grown position is valued at the prevailing quote
        if let Some(point) = self.market.current(order.instrument()) {
            if self.ledger.mark(point, leverage).is_some() {
                outcome.position = self.ledger.position(order.instrument()).cloned();
            }
        }
        info!(
            "[engine] filled {} {} {} {}@{price} ({} deals)",
            order.id,
            order.side,
            order.instrument(),
            order.volume,
            outcome.deals.len()
        );

        let brackets = std::mem::take(&mut order.brackets);
        self.outbox.push(OrderUpdate { order: order.clone(), deals: outcome.deals, position: outcome.position });

        let mut out = Vec::with_capacity(1 + brackets.len());
        out.push(order);
        for mut bracket in brackets {
            bracket.advance(OrderStatus::Pending, time_us)?;
            let seq = self.next_seq();
            self.emit(bracket.clone());
            out.push(bracket.clone());
            self.ledger.insert_order(seq, bracket);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Validate and execute a batch. Nothing changes unless every leg of
    /// every request is valid.
    pub fn submit(&mut self, requests: Vec<OrderRequest>) -> Result<SubmitResponse, VtError> {
        let mut errors = validator::validate_batch(&requests, &self.market);
        let mut seen = Vec::new();
        for (i, request) in requests.iter().enumerate() {
            self.check_ids(request, &format!("orders[{i}]"), &mut seen, &mut errors);
        }
        if !errors.is_empty() {
            warn!("[engine] rejected batch of {} orders ({} errors)", requests.len(), errors.len());
            return Ok(SubmitResponse { orders: Vec::new(), errors });
        }

        let reserved: Vec<String> = seen.into_iter().map(str::to_string).collect();
        let mut placed = Vec::new();
        for request in &requests {
            self.place(request, &reserved, &mut placed)?;
        }
        Ok(SubmitResponse { orders: placed, errors })
    }

    fn check_ids<'a>(
        &self,
        request: &'a OrderRequest,
        path: &str,
        seen: &mut Vec<&'a str>,
        errors: &mut Vec<ValidationError>,
    ) {
        if !request.id.is_empty() {
            if self.ledger.has_order(&request.id) || seen.contains(&request.id.as_str()) {
                errors.push(ValidationError {
                    field: format!("{path}.id"),
                    message: format!("order id {} already in use", request.id),
                });
            }
            seen.push(&request.id);
        }
        for (i, child) in request.children.iter().enumerate() {
            self.check_ids(child, &format!("{path}.children[{i}]"), seen, errors);
        }
    }

    /// Caller ids are kept. Generated ids skip anything already pending or
    /// named by the current batch.
    fn assign_id(&mut self, requested: &str, reserved: &[String]) -> (u64, String) {
        if !requested.is_empty() {
            return (self.next_seq(), requested.to_string());
        }
        loop {
            let seq = self.next_seq();
            let id = format!("ORD-{seq:06}");
            if !self.ledger.has_order(&id) && !reserved.contains(&id) {
                return (seq, id);
            }
        }
    }

    fn place(&mut self, request: &OrderRequest, reserved: &[String], placed: &mut Vec<Order>) -> Result<(), VtError> {
        if request.volume > EPSILON {
            let (seq, id) = self.assign_id(&request.id, reserved);
            let quote_time = self.market.current(&request.instrument).map(|p| p.timestamp_us);
            let time_us = request.time_us.or(quote_time).unwrap_or(0);

            let braces: Vec<&OrderRequest> =
                request.children.iter().filter(|c| c.instruction == Instruction::Brace).collect();
            let descriptor = request.descriptor.clone().or_else(|| (!braces.is_empty()).then(|| format!("{id}/brace")));

            let mut order = Order::from_request(request, id, descriptor.clone(), time_us);
            for brace in braces {
                let (_, brace_id) = self.assign_id(&brace.id, reserved);
                order.brackets.push(Order::from_request(brace, brace_id, descriptor.clone(), time_us));
            }

            if !request.order_type.is_resting() {
                let point = self
                    .market
                    .current(&request.instrument)
                    .ok_or_else(|| VtError::Precondition(format!("no quote for {}", request.instrument)))?;
                let price = match request.side {
                    Side::Buy => point.buy_price(),
                    Side::Sell => point.sell_price(),
                }
                .ok_or_else(|| VtError::Precondition(format!("no price for {}", request.instrument)))?;
                placed.extend(self.execute(order, price, time_us)?);
            } else {
                order.advance(OrderStatus::Pending, time_us)?;
                debug!("[engine] {} {} {} pending at {:?}", order.id, order.side, order.order_type, order.price);
                self.emit(order.clone());
                placed.push(order.clone());
                self.ledger.insert_order(seq, order);
            }
        }

        for child in request.children.iter().filter(|c| c.instruction != Instruction::Brace) {
            self.place(child, reserved, placed)?;
        }
        Ok(())
    }

    /// Cancel pending orders by id. Unknown and already-filled ids are
    /// ignored.
    pub fn delete(&mut self, ids: &[String]) -> Result<Vec<Order>, VtError> {
        let mut canceled = Vec::new();
        for id in ids {
            let Some(mut order) = self.ledger.take_order_by_id(id) else {
                debug!("[engine] delete: {id} is not pending");
                continue;
            };
            let time_us = self.market.current(order.instrument()).map_or(order.transaction.time_us, |p| p.timestamp_us);
            order.advance(OrderStatus::Canceled, time_us)?;
            info!("[engine] canceled {}", order.id);
            self.emit(order.clone());
            canceled.push(order);
        }
        Ok(canceled)
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    pub fn account(&self) -> AccountSnapshot {
        self.ledger.snapshot()
    }

    pub fn positions(&self) -> Vec<Position> {
        self.ledger.positions()
    }

    /// Pending orders in arrival order.
    pub fn orders(&self) -> Vec<Order> {
        self.ledger.orders().cloned().collect()
    }

    pub fn deals(&self) -> Vec<Deal> {
        self.ledger.deals().to_vec()
    }

    pub fn points(&self, instrument: &str) -> Result<Vec<PricePoint>, VtError> {
        if !self.market.is_registered(instrument) {
            return Err(VtError::UnknownInstrument(instrument.to_string()));
        }
        Ok(self.market.sequences.get(instrument).map(|s| s.as_slice().to_vec()).unwrap_or_default())
    }
}

/// Turn a triggered stop-limit into a plain limit. Returns `true` if it did.
fn activate_stop_limit(order: &mut Order, bid: f64, ask: f64) -> bool {
    if order.order_type != OrderType::StopLimit {
        return false;
    }
    let Some(activation) = order.activation_price else { return false };
    let hit = match order.side {
        Side::Buy => ask >= activation,
        Side::Sell => bid <= activation,
    };
    if hit {
        order.order_type = OrderType::Limit;
        order.activation_price = None;
    }
    hit
}

fn triggers(order: &Order, bid: f64, ask: f64) -> bool {
    let Some(price) = order.price else { return false };
    match (order.order_type, order.side) {
        (OrderType::Stop, Side::Buy) | (OrderType::Limit, Side::Sell) => ask >= price,
        (OrderType::Stop, Side::Sell) | (OrderType::Limit, Side::Buy) => bid <= price,
        _ => false,
    }
}
