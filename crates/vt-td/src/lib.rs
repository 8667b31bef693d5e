//! # vt-td
//!
//! Trading side of the simulated terminal: validation, matching, netting and
//! the gateway that exposes them.
//!
//! Every gateway implements the [`Gateway`] trait. The lifecycle is:
//! `connect()` → `subscribe()` / order operations → `disconnect()`.
//!
//! ## Modules
//!
//! | module        | role                                                   |
//! |---------------|--------------------------------------------------------|
//! | `validator`   | pure pre-trade checks                                  |
//! | `gain`        | gain estimation                                        |
//! | `ledger`      | balance, positions, pending orders, deals              |
//! | `engine`      | tick aggregation + order matching                      |
//! | `worker`      | single engine thread behind an `EngineHandle`          |
//! | `simulation`  | `SimulationGateway` (replay-driven)                    |
//! | `event`       | outbound point / order streams                         |

pub mod engine;
pub mod event;
pub mod gain;
pub mod ledger;
pub mod simulation;
pub mod validator;
pub mod worker;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::watch;
use vt_core::{ConnectionStatus, Deal, Order, OrderRequest, Position, PricePoint};

use crate::engine::SubmitResponse;
use crate::ledger::AccountSnapshot;

/// Trait implemented by every trading gateway.
///
/// # Lifecycle
///
/// 1. Construct via the implementation's `new(..)`.
/// 2. Call [`connect`](Gateway::connect); instruments become known and quoted.
/// 3. [`subscribe`](Gateway::subscribe) to start streaming an instrument, and
///    use [`create_orders`](Gateway::create_orders) /
///    [`delete_orders`](Gateway::delete_orders) for order management.
/// 4. Call [`disconnect`](Gateway::disconnect) to stop all streams.
///
/// Bars and order updates are delivered on the channels created with
/// [`event::channels`]; connection changes on [`status`](Gateway::status).
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Human-readable gateway name.
    fn name(&self) -> &str;

    /// Watch of the connection status.
    fn status(&self) -> watch::Receiver<ConnectionStatus>;

    async fn connect(&mut self) -> Result<ConnectionStatus>;

    async fn disconnect(&mut self) -> Result<ConnectionStatus>;

    /// Start periodic tick delivery for an instrument.
    async fn subscribe(&mut self, instrument: &str) -> Result<()>;

    /// Stop periodic tick delivery for an instrument.
    async fn unsubscribe(&mut self, instrument: &str) -> Result<()>;

    /// Submit a batch. Validation failures come back in
    /// [`SubmitResponse::errors`], not as `Err`.
    async fn create_orders(&self, orders: Vec<OrderRequest>) -> Result<SubmitResponse>;

    /// Cancel pending orders. Returns the orders actually canceled.
    async fn delete_orders(&self, ids: Vec<String>) -> Result<Vec<Order>>;

    async fn account(&self) -> Result<AccountSnapshot>;

    async fn positions(&self) -> Result<Vec<Position>>;

    /// Pending orders.
    async fn orders(&self) -> Result<Vec<Order>>;

    async fn deals(&self) -> Result<Vec<Deal>>;

    /// Aggregated bars of an instrument.
    async fn points(&self, instrument: &str) -> Result<Vec<PricePoint>>;
}
