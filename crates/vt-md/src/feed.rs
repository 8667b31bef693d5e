//! Periodic tick replay.
//!
//! [`ReplayFeed`] runs one tokio task per subscribed instrument. Each task
//! pulls the next tick from its [`TickSource`] stream once per interval,
//! filters it through a shared [`MonotonicGuard`] and hands it to the
//! [`TickSink`].
//!
//! ```text
//! TickSource ──► [replay task per instrument] ──► MonotonicGuard ──► TickSink
//!                         │ I/O error
//!                         └──► status watch = Faulted
//! ```
//!
//! A per-instrument cursor remembers how many records were consumed, so
//! seeding and re-subscribing resume where the previous stream stopped
//! instead of replaying from the top.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ahash::AHashMap;
use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use vt_core::ordering::MonotonicGuard;
use vt_core::ConnectionStatus;

use crate::source::{TickSource, TickStream};
use crate::TickSink;

#[derive(Default)]
struct FeedState {
    guard: MonotonicGuard,
    cursors: AHashMap<String, usize>,
}

type SharedState = Arc<Mutex<FeedState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of pulling one record.
enum Step {
    Delivered,
    Dropped,
    End,
    SinkClosed,
    Failed(anyhow::Error),
}

// ---------------------------------------------------------------------------
// ReplayFeed
// ---------------------------------------------------------------------------

/// Replays recorded ticks into a sink at a fixed interval per instrument.
pub struct ReplayFeed {
    source: Arc<dyn TickSource>,
    sink: Arc<dyn TickSink>,
    interval: Duration,
    status: Arc<watch::Sender<ConnectionStatus>>,
    state: SharedState,
    tasks: AHashMap<String, JoinHandle<()>>,
}

impl ReplayFeed {
    pub fn new(
        source: Arc<dyn TickSource>,
        sink: Arc<dyn TickSink>,
        interval: Duration,
        status: Arc<watch::Sender<ConnectionStatus>>,
    ) -> Self {
        Self {
            source,
            sink,
            interval,
            status,
            state: Arc::new(Mutex::new(FeedState::default())),
            tasks: AHashMap::new(),
        }
    }

    /// Deliver up to `count` ticks of `instrument` synchronously. Returns the
    /// number of ticks handed to the sink.
    pub fn seed(&self, instrument: &str, count: usize) -> Result<usize> {
        let mut stream = open_at_cursor(self.source.as_ref(), instrument, &self.state)?;
        let mut delivered = 0;
        while delivered < count {
            match pump_one(&mut stream, instrument, &self.state, self.sink.as_ref()) {
                Step::Delivered => delivered += 1,
                Step::Dropped => {}
                Step::End | Step::SinkClosed => break,
                Step::Failed(e) => return Err(e),
            }
        }
        debug!("[replay:{instrument}] seeded {delivered} ticks");
        Ok(delivered)
    }

    /// Start periodic delivery. Returns `false` if already running.
    pub fn subscribe(&mut self, instrument: &str) -> bool {
        if self.is_subscribed(instrument) {
            return false;
        }
        let task = tokio::spawn(run_replay(
            instrument.to_string(),
            self.source.clone(),
            self.sink.clone(),
            self.interval,
            self.state.clone(),
            self.status.clone(),
        ));
        self.tasks.insert(instrument.to_string(), task);
        info!("[replay:{instrument}] subscribed ({:?} interval)", self.interval);
        true
    }

    /// Stop periodic delivery. Returns `false` if nothing was running.
    pub fn unsubscribe(&mut self, instrument: &str) -> bool {
        match self.tasks.remove(instrument) {
            Some(task) => {
                let was_running = !task.is_finished();
                task.abort();
                info!("[replay:{instrument}] unsubscribed");
                was_running
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self, instrument: &str) -> bool {
        self.tasks.get(instrument).is_some_and(|t| !t.is_finished())
    }

    /// Instruments with a live replay task.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.tasks.iter().filter(|(_, t)| !t.is_finished()).map(|(k, _)| k.clone()).collect();
        names.sort();
        names
    }

    /// Abort every replay task.
    pub fn stop(&mut self) {
        let n = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
        info!("[replay] stopped {n} tasks");
    }
}

impl Drop for ReplayFeed {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Replay task
// ---------------------------------------------------------------------------

fn open_at_cursor(source: &dyn TickSource, instrument: &str, state: &SharedState) -> Result<TickStream> {
    let mut stream = source.open(instrument)?;
    let skip = lock(state).cursors.get(instrument).copied().unwrap_or(0);
    for _ in 0..skip {
        if stream.next().is_none() {
            break;
        }
    }
    Ok(stream)
}

fn pump_one(stream: &mut TickStream, instrument: &str, state: &SharedState, sink: &dyn TickSink) -> Step {
    let point = match stream.next() {
        None => return Step::End,
        Some(Err(e)) => return Step::Failed(e),
        Some(Ok(point)) => point,
    };

    let accepted = {
        let mut st = lock(state);
        *st.cursors.entry(instrument.to_string()).or_insert(0) += 1;
        st.guard.check_and_update(instrument, point.timestamp_us)
    };
    if !accepted {
        warn!("[replay:{instrument}] dropping stale tick at {}", point.timestamp_us);
        return Step::Dropped;
    }

    if sink.deliver(point) { Step::Delivered } else { Step::SinkClosed }
}

async fn run_replay(
    instrument: String,
    source: Arc<dyn TickSource>,
    sink: Arc<dyn TickSink>,
    interval: Duration,
    state: SharedState,
    status: Arc<watch::Sender<ConnectionStatus>>,
) {
    let mut stream = match open_at_cursor(source.as_ref(), &instrument, &state) {
        Ok(s) => s,
        Err(e) => {
            error!("[replay:{instrument}] cannot open source: {e:#}");
            status.send_replace(ConnectionStatus::Faulted);
            return;
        }
    };

    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut delivered = 0u64;
    loop {
        ticker.tick().await;
        match pump_one(&mut stream, &instrument, &state, sink.as_ref()) {
            Step::Delivered => delivered += 1,
            Step::Dropped => {}
            Step::End => {
                info!("[replay:{instrument}] source exhausted after {delivered} ticks");
                break;
            }
            Step::SinkClosed => {
                warn!("[replay:{instrument}] sink closed, stopping");
                break;
            }
            Step::Failed(e) => {
                error!("[replay:{instrument}] source error: {e:#}");
                status.send_replace(ConnectionStatus::Faulted);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use vt_core::PricePoint;

    #[derive(Default)]
    struct Collect(Mutex<Vec<PricePoint>>);

    impl TickSink for Collect {
        fn deliver(&self, point: PricePoint) -> bool {
            self.0.lock().unwrap().push(point);
            true
        }
    }

    impl Collect {
        fn timestamps(&self) -> Vec<u64> {
            self.0.lock().unwrap().iter().map(|p| p.timestamp_us).collect()
        }
    }

    struct Broken;

    impl TickSource for Broken {
        fn open(&self, _instrument: &str) -> Result<TickStream> {
            Ok(Box::new(std::iter::once(Err(anyhow::anyhow!("disk gone")))))
        }
    }

    fn source(ts: &[u64]) -> Arc<dyn TickSource> {
        let ticks = ts.iter().map(|&t| PricePoint::quote("SPY", 10.0, 10.5, t)).collect();
        Arc::new(MemorySource::new().with_ticks("SPY", ticks))
    }

    fn feed(src: Arc<dyn TickSource>, sink: Arc<Collect>) -> (ReplayFeed, watch::Receiver<ConnectionStatus>) {
        let (tx, rx) = watch::channel(ConnectionStatus::Connected);
        (ReplayFeed::new(src, sink, Duration::from_millis(1), Arc::new(tx)), rx)
    }

    async fn wait_for(sink: &Collect, n: usize) {
        for _ in 0..500 {
            if sink.timestamps().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[test]
    fn seed_delivers_first_ticks() {
        let sink = Arc::new(Collect::default());
        let (f, _rx) = feed(source(&[1, 2, 3]), sink.clone());
        assert_eq!(f.seed("SPY", 2).unwrap(), 2);
        assert_eq!(sink.timestamps(), vec![1, 2]);
    }

    #[test]
    fn stale_ticks_are_dropped() {
        let sink = Arc::new(Collect::default());
        let (f, _rx) = feed(source(&[5, 3, 5, 7]), sink.clone());
        f.seed("SPY", 10).unwrap();
        assert_eq!(sink.timestamps(), vec![5, 5, 7]);
    }

    #[tokio::test]
    async fn subscribe_resumes_after_seed() {
        let sink = Arc::new(Collect::default());
        let (mut f, _rx) = feed(source(&[1, 2, 3, 4]), sink.clone());
        f.seed("SPY", 1).unwrap();
        assert!(f.subscribe("SPY"));
        assert!(!f.subscribe("SPY"));
        wait_for(&sink, 4).await;
        assert_eq!(sink.timestamps(), vec![1, 2, 3, 4]);
        f.stop();
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let sink = Arc::new(Collect::default());
        let (mut f, _rx) = feed(source(&(1..=10_000).collect::<Vec<_>>()), sink.clone());
        f.subscribe("SPY");
        wait_for(&sink, 2).await;
        assert!(f.unsubscribe("SPY"));
        assert!(f.subscriptions().is_empty());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let frozen = sink.timestamps().len();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.timestamps().len(), frozen);

        // no tick is replayed twice after a re-subscribe
        f.subscribe("SPY");
        wait_for(&sink, frozen + 2).await;
        f.stop();
        let ts = sink.timestamps();
        assert!(ts.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn tasks_share_one_guard_keyed_by_instrument() {
        let spy = [5, 6, 7].iter().map(|&t| PricePoint::quote("SPY", 10.0, 10.5, t)).collect();
        let qqq = [1, 2, 3].iter().map(|&t| PricePoint::quote("QQQ", 20.0, 20.5, t)).collect();
        let src = Arc::new(MemorySource::new().with_ticks("SPY", spy).with_ticks("QQQ", qqq));
        let sink = Arc::new(Collect::default());
        let (mut f, _rx) = feed(src, sink.clone());

        f.subscribe("SPY");
        f.subscribe("QQQ");
        wait_for(&sink, 6).await;
        f.stop();

        let points = sink.0.lock().unwrap();
        let of = |name: &str| {
            points.iter().filter(|p| p.instrument == name).map(|p| p.timestamp_us).collect::<Vec<_>>()
        };
        assert_eq!(of("SPY"), vec![5, 6, 7]);
        assert_eq!(of("QQQ"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn source_error_faults_status() {
        let sink = Arc::new(Collect::default());
        let (mut f, mut rx) = feed(Arc::new(Broken), sink.clone());
        f.subscribe("SPY");
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == ConnectionStatus::Faulted))
            .await
            .unwrap()
            .unwrap();
        assert!(sink.timestamps().is_empty());
    }
}
