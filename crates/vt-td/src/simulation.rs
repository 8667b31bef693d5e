//! Simulation gateway.
//!
//! [`SimulationGateway`] implements [`Gateway`](crate::Gateway) on top of the
//! engine worker and a replay feed. There is no network involved: connecting
//! registers the configured instruments, seeds each with its first ticks, and
//! from then on the feed replays recorded ticks for subscribed instruments.
//!
//! ```text
//! SimulationGateway
//! ├── EngineHandle   (orders, snapshots, registration)
//! ├── ReplayFeed     (one replay task per subscription → EngineHandle)
//! └── status watch   (Disconnected / Connected / Faulted)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info, warn};
use vt_core::config::AppConfig;
use vt_core::{ConnectionStatus, Deal, Instrument, Order, OrderRequest, Position, PricePoint};
use vt_md::feed::ReplayFeed;
use vt_md::source::TickSource;

use crate::engine::SubmitResponse;
use crate::ledger::AccountSnapshot;
use crate::worker::EngineHandle;

/// Replay settings of a [`SimulationGateway`].
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub name: String,
    pub instruments: Vec<Instrument>,
    pub interval: Duration,
    pub seed_ticks: usize,
}

impl SimulationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            name: config.account.effective_name(),
            instruments: config.instruments(),
            interval: Duration::from_millis(config.replay.effective_interval_ms()),
            seed_ticks: config.replay.effective_seed_ticks(),
        }
    }
}

pub struct SimulationGateway {
    settings: SimulationSettings,
    engine: EngineHandle,
    feed: ReplayFeed,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl SimulationGateway {
    pub fn new(settings: SimulationSettings, engine: EngineHandle, source: Arc<dyn TickSource>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        let status = Arc::new(status);
        let feed = ReplayFeed::new(source, Arc::new(engine.clone()), settings.interval, status.clone());
        Self { settings, engine, feed, status }
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.feed.subscriptions()
    }

    fn current_status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    fn ensure_connected(&self) -> Result<()> {
        match self.current_status() {
            ConnectionStatus::Disconnected => bail!("[{}] not connected", self.settings.name),
            _ => Ok(()),
        }
    }

    fn ensure_known(&self, instrument: &str) -> Result<()> {
        if !self.settings.instruments.iter().any(|i| i.name == instrument) {
            bail!("[{}] unknown instrument {instrument}", self.settings.name);
        }
        Ok(())
    }
}

#[async_trait]
impl crate::Gateway for SimulationGateway {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    async fn connect(&mut self) -> Result<ConnectionStatus> {
        if self.current_status() != ConnectionStatus::Disconnected {
            warn!("[{}] already connected", self.settings.name);
            return Ok(self.current_status());
        }

        for instrument in &self.settings.instruments {
            self.engine.register(instrument.clone())?;
        }

        let mut status = ConnectionStatus::Connected;
        for instrument in &self.settings.instruments {
            match self.feed.seed(&instrument.name, self.settings.seed_ticks) {
                Ok(n) => info!("[{}] {} seeded with {n} ticks", self.settings.name, instrument.name),
                Err(e) => {
                    error!("[{}] cannot seed {}: {e:#}", self.settings.name, instrument.name);
                    status = ConnectionStatus::Faulted;
                }
            }
        }
        // seeded quotes are visible to the next command
        self.engine.sync().await?;

        self.status.send_replace(status);
        info!("[{}] connected ({} instruments)", self.settings.name, self.settings.instruments.len());
        Ok(status)
    }

    async fn disconnect(&mut self) -> Result<ConnectionStatus> {
        self.feed.stop();
        self.status.send_replace(ConnectionStatus::Disconnected);
        info!("[{}] disconnected", self.settings.name);
        Ok(ConnectionStatus::Disconnected)
    }

    async fn subscribe(&mut self, instrument: &str) -> Result<()> {
        self.ensure_connected()?;
        self.ensure_known(instrument)?;
        if !self.feed.subscribe(instrument) {
            warn!("[{}] {instrument} already subscribed", self.settings.name);
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, instrument: &str) -> Result<()> {
        self.ensure_known(instrument)?;
        self.feed.unsubscribe(instrument);
        Ok(())
    }

    async fn create_orders(&self, orders: Vec<OrderRequest>) -> Result<SubmitResponse> {
        self.ensure_connected()?;
        let resp = self.engine.submit(orders).await?;
        if !resp.is_accepted() {
            for e in &resp.errors {
                warn!("[{}] order rejected: {e}", self.settings.name);
            }
        }
        Ok(resp)
    }

    async fn delete_orders(&self, ids: Vec<String>) -> Result<Vec<Order>> {
        self.ensure_connected()?;
        Ok(self.engine.delete(ids).await?)
    }

    async fn account(&self) -> Result<AccountSnapshot> {
        Ok(self.engine.account().await?)
    }

    async fn positions(&self) -> Result<Vec<Position>> {
        Ok(self.engine.positions().await?)
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.engine.orders().await?)
    }

    async fn deals(&self) -> Result<Vec<Deal>> {
        Ok(self.engine.deals().await?)
    }

    async fn points(&self, instrument: &str) -> Result<Vec<PricePoint>> {
        Ok(self.engine.points(instrument).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Gateway;
    use crate::engine::MatchingEngine;
    use crate::event::{self, EventReceivers};
    use crate::ledger::Ledger;
    use crate::worker;
    use vt_core::{OrderStatus, Side};
    use vt_md::source::MemorySource;

    fn setup(ticks: Vec<PricePoint>) -> (SimulationGateway, EventReceivers, std::thread::JoinHandle<()>) {
        let (tx, rx) = event::channels();
        let (handle, join) = worker::spawn(MatchingEngine::new(Ledger::new("sim", 1000.0)), tx, None, 64).unwrap();
        let settings = SimulationSettings {
            name: "sim".into(),
            instruments: vec![Instrument::spot("SPY")],
            interval: Duration::from_millis(1),
            seed_ticks: 1,
        };
        let source = Arc::new(MemorySource::new().with_ticks("SPY", ticks));
        (SimulationGateway::new(settings, handle, source), rx, join)
    }

    #[tokio::test]
    async fn replay_triggers_pending_order() {
        let ticks = vec![
            PricePoint::quote("SPY", 15.0, 15.0, 1),
            PricePoint::quote("SPY", 20.0, 20.0, 2),
            PricePoint::quote("SPY", 25.0, 25.2, 3),
            PricePoint::quote("SPY", 26.0, 26.0, 4),
        ];
        let (mut gw, mut rx, join) = setup(ticks);

        assert!(gw.create_orders(vec![OrderRequest::market("SPY", Side::Buy, 1.0)]).await.is_err());
        assert_eq!(gw.connect().await.unwrap(), ConnectionStatus::Connected);
        assert_eq!(*gw.status().borrow(), ConnectionStatus::Connected);

        let resp = gw.create_orders(vec![OrderRequest::stop("SPY", Side::Buy, 2.0, 25.0)]).await.unwrap();
        assert!(resp.is_accepted());
        assert_eq!(gw.orders().await.unwrap().len(), 1);

        gw.subscribe("SPY").await.unwrap();
        assert!(gw.subscribe("IWM").await.is_err());

        let filled = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let update = rx.orders.recv().await.unwrap();
                if update.order.status() == OrderStatus::Filled {
                    break update;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(filled.order.transaction.price, Some(25.2));
        assert_eq!(filled.position.unwrap().volume, 2.0);

        let first_point = rx.points.recv().await.unwrap();
        assert_eq!(first_point.point.timestamp_us, 1);

        gw.disconnect().await.unwrap();
        assert!(gw.subscriptions().is_empty());
        assert_eq!(gw.positions().await.unwrap().len(), 1);
        assert!(gw.engine().shutdown().is_ok());
        join.join().unwrap();
    }

    #[tokio::test]
    async fn missing_source_faults_on_subscribe() {
        struct Missing;
        impl TickSource for Missing {
            fn open(&self, instrument: &str) -> Result<vt_md::source::TickStream> {
                bail!("no data for {instrument}")
            }
        }

        let (tx, _rx) = event::channels();
        let (handle, join) = worker::spawn(MatchingEngine::new(Ledger::new("sim", 0.0)), tx, None, 8).unwrap();
        let settings = SimulationSettings {
            name: "sim".into(),
            instruments: vec![Instrument::spot("SPY")],
            interval: Duration::from_millis(1),
            seed_ticks: 1,
        };
        let mut gw = SimulationGateway::new(settings, handle.clone(), Arc::new(Missing));
        assert_eq!(gw.connect().await.unwrap(), ConnectionStatus::Faulted);

        // orders are refused without a quote, not because of the fault
        let resp = gw.create_orders(vec![OrderRequest::market("SPY", Side::Buy, 1.0)]).await.unwrap();
        assert_eq!(resp.errors.len(), 1);

        gw.disconnect().await.unwrap();
        handle.shutdown().unwrap();
        join.join().unwrap();
    }

    #[tokio::test]
    async fn delete_through_gateway() {
        let (mut gw, _rx, join) = setup(vec![PricePoint::quote("SPY", 10.0, 10.0, 1)]);
        gw.connect().await.unwrap();
        let resp = gw.create_orders(vec![OrderRequest::limit("SPY", Side::Buy, 1.0, 9.0)]).await.unwrap();
        let canceled = gw.delete_orders(vec![resp.orders[0].id.clone()]).await.unwrap();
        assert_eq!(canceled[0].status(), OrderStatus::Canceled);
        assert!(gw.orders().await.unwrap().is_empty());
        assert_eq!(gw.points("SPY").await.unwrap().len(), 1);
        assert_eq!(gw.account().await.unwrap().pending_orders, 0);
        assert!(gw.deals().await.unwrap().is_empty());
        gw.disconnect().await.unwrap();
        gw.engine().shutdown().unwrap();
        join.join().unwrap();
    }
}
