//! Engine worker: one thread that owns the [`MatchingEngine`].
//!
//! Every access to the account goes through a bounded crossbeam channel and
//! is processed to completion, in arrival order, on the worker thread.
//! Callers hold a cloneable [`EngineHandle`]; queries reply over a tokio
//! oneshot so async callers can await them.
//!
//! ```text
//! ReplayFeed ──Tick──┐
//! Gateway ──Submit──►├──► [crossbeam queue] ──► worker thread (MatchingEngine)
//! Gateway ──Query───┘                                 ├──► PointUpdate channel
//!                                                     └──► OrderUpdate channel
//! ```

use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::oneshot;
use tracing::{debug, error, info};
use vt_core::{Deal, Instrument, Order, OrderRequest, Position, PricePoint, VtError};
use vt_md::TickSink;

use crate::engine::{MatchingEngine, SubmitResponse};
use crate::event::EventSenders;
use crate::ledger::AccountSnapshot;

type Reply<T> = oneshot::Sender<T>;

/// A unit of work for the engine thread.
#[derive(Debug)]
pub enum Command {
    Register(Instrument),
    Tick(PricePoint),
    Submit(Vec<OrderRequest>, Reply<Result<SubmitResponse, VtError>>),
    Delete(Vec<String>, Reply<Result<Vec<Order>, VtError>>),
    Account(Reply<AccountSnapshot>),
    Positions(Reply<Vec<Position>>),
    Orders(Reply<Vec<Order>>),
    Deals(Reply<Vec<Deal>>),
    Points(String, Reply<Result<Vec<PricePoint>, VtError>>),
    /// Flush marker: replied to once every earlier command is processed.
    Sync(Reply<()>),
    Shutdown,
}

// ---------------------------------------------------------------------------
// EngineHandle
// ---------------------------------------------------------------------------

/// Cloneable access point to the engine thread.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: Sender<Command>,
}

impl EngineHandle {
    fn send(&self, cmd: Command) -> Result<(), VtError> {
        self.tx.send(cmd).map_err(|_| VtError::WorkerClosed)
    }

    async fn ask<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, VtError> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply))?;
        rx.await.map_err(|_| VtError::WorkerClosed)
    }

    pub fn register(&self, instrument: Instrument) -> Result<(), VtError> {
        self.send(Command::Register(instrument))
    }

    pub fn tick(&self, point: PricePoint) -> Result<(), VtError> {
        self.send(Command::Tick(point))
    }

    pub async fn submit(&self, orders: Vec<OrderRequest>) -> Result<SubmitResponse, VtError> {
        self.ask(|r| Command::Submit(orders, r)).await?
    }

    pub async fn delete(&self, ids: Vec<String>) -> Result<Vec<Order>, VtError> {
        self.ask(|r| Command::Delete(ids, r)).await?
    }

    pub async fn account(&self) -> Result<AccountSnapshot, VtError> {
        self.ask(Command::Account).await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, VtError> {
        self.ask(Command::Positions).await
    }

    pub async fn orders(&self) -> Result<Vec<Order>, VtError> {
        self.ask(Command::Orders).await
    }

    pub async fn deals(&self) -> Result<Vec<Deal>, VtError> {
        self.ask(Command::Deals).await
    }

    pub async fn points(&self, instrument: &str) -> Result<Vec<PricePoint>, VtError> {
        let instrument = instrument.to_string();
        self.ask(|r| Command::Points(instrument, r)).await?
    }

    /// Wait until every command sent before this call has been processed.
    pub async fn sync(&self) -> Result<(), VtError> {
        self.ask(Command::Sync).await
    }

    /// Ask the worker to exit after draining earlier commands.
    pub fn shutdown(&self) -> Result<(), VtError> {
        self.send(Command::Shutdown)
    }
}

impl TickSink for EngineHandle {
    fn deliver(&self, point: PricePoint) -> bool {
        self.tick(point).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Worker thread
// ---------------------------------------------------------------------------

/// Start the engine thread. The thread exits on [`Command::Shutdown`] or once
/// every handle is dropped.
pub fn spawn(
    engine: MatchingEngine,
    events: EventSenders,
    cpu_core: Option<usize>,
    capacity: usize,
) -> std::io::Result<(EngineHandle, JoinHandle<()>)> {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let join = std::thread::Builder::new()
        .name("vt-engine".into())
        .spawn(move || run_engine_loop("engine", rx, engine, events, cpu_core))?;
    Ok((EngineHandle { tx }, join))
}

/// Process commands on the calling thread until shutdown.
pub fn run_engine_loop(
    label: &str,
    rx: Receiver<Command>,
    mut engine: MatchingEngine,
    events: EventSenders,
    cpu_core: Option<usize>,
) {
    vt_core::cpu_affinity::pin_if_configured(cpu_core);
    info!("[{label}] worker started");

    let mut ticks = 0u64;
    while let Ok(cmd) = rx.recv() {
        match cmd {
            Command::Register(instrument) => engine.register(instrument),
            Command::Tick(point) => {
                let instrument = point.instrument.clone();
                match engine.on_tick(point) {
                    Ok(update) => {
                        ticks += 1;
                        let _ = events.points.send(update);
                    }
                    Err(e) => error!("[{label}] tick for {instrument} dropped: {e}"),
                }
            }
            Command::Submit(orders, reply) => {
                let result = engine.submit(orders);
                if let Err(ref e) = result {
                    error!("[{label}] submit failed: {e}");
                }
                let _ = reply.send(result);
            }
            Command::Delete(ids, reply) => {
                let result = engine.delete(&ids);
                if let Err(ref e) = result {
                    error!("[{label}] delete failed: {e}");
                }
                let _ = reply.send(result);
            }
            Command::Account(reply) => {
                let _ = reply.send(engine.account());
            }
            Command::Positions(reply) => {
                let _ = reply.send(engine.positions());
            }
            Command::Orders(reply) => {
                let _ = reply.send(engine.orders());
            }
            Command::Deals(reply) => {
                let _ = reply.send(engine.deals());
            }
            Command::Points(instrument, reply) => {
                let _ = reply.send(engine.points(&instrument));
            }
            Command::Sync(reply) => {
                let _ = reply.send(());
            }
            Command::Shutdown => {
                debug!("[{label}] shutdown requested");
                break;
            }
        }

        for update in engine.take_updates() {
            let _ = events.orders.send(update);
        }
    }

    info!("[{label}] worker exited after {ticks} ticks");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event;
    use crate::ledger::Ledger;
    use vt_core::{OrderStatus, Side};

    fn start() -> (EngineHandle, JoinHandle<()>, event::EventReceivers) {
        let mut engine = MatchingEngine::new(Ledger::new("test", 1000.0));
        engine.register(Instrument::spot("SPY"));
        let (tx, rx) = event::channels();
        let (handle, join) = spawn(engine, tx, None, 16).unwrap();
        (handle, join, rx)
    }

    #[tokio::test]
    async fn commands_run_in_arrival_order() {
        let (handle, join, mut rx) = start();

        handle.tick(PricePoint::quote("SPY", 15.0, 15.0, 1)).unwrap();
        let resp = handle.submit(vec![OrderRequest::stop("SPY", Side::Buy, 1.0, 25.0)]).await.unwrap();
        assert!(resp.is_accepted());

        handle.tick(PricePoint::quote("SPY", 20.0, 20.0, 2)).unwrap();
        handle.tick(PricePoint::quote("SPY", 25.0, 25.0, 3)).unwrap();
        // queued behind the ticks, so it sees the fill
        let positions = handle.positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].price, 25.0);
        assert!(handle.orders().await.unwrap().is_empty());

        let mut statuses = Vec::new();
        while let Ok(u) = rx.orders.try_recv() {
            statuses.push(u.order.status());
        }
        assert_eq!(statuses, vec![OrderStatus::Pending, OrderStatus::Filled]);

        let mut timestamps = Vec::new();
        while let Ok(p) = rx.points.try_recv() {
            timestamps.push(p.point.timestamp_us);
        }
        assert_eq!(timestamps, vec![1, 2, 3]);

        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[tokio::test]
    async fn bad_ticks_do_not_stop_the_worker() {
        let (handle, join, _rx) = start();
        handle.tick(PricePoint::quote("IWM", 1.0, 1.0, 1)).unwrap();
        handle.tick(PricePoint::quote("SPY", 1.0, 1.0, 1)).unwrap();
        assert_eq!(handle.points("SPY").await.unwrap().len(), 1);
        assert!(matches!(handle.points("IWM").await, Err(VtError::UnknownInstrument(_))));
        assert_eq!(handle.account().await.unwrap().balance, 1000.0);

        handle.shutdown().unwrap();
        join.join().unwrap();
        assert!(matches!(handle.account().await, Err(VtError::WorkerClosed)));
    }
}
