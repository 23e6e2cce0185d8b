//! Runtime wiring: one task owns the store and applies every event in arrival
//! order; the snapshot poller and the stream supervisor only send events.

use crate::config::AppConfig;
use crate::fallback;
use crate::models::{Category, PriceDelta, ReadModel};
use crate::snapshot::{CategoryRule, SnapshotFetcher, SnapshotSource, spawn_snapshot_poller};
use crate::store::{ReconciliationStore, StoreEvent};
use crate::stream::{
    ConnectionState, PriceConnector, StreamCounters, StreamHandle, spawn_price_stream,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const MARKETS_SOURCE: &str = "markets";
const TRENDING_SOURCE: &str = "trending";

/// Running reconciliation pipeline.
pub struct PulseRuntime {
    read_model: watch::Receiver<ReadModel>,
    shutdown: watch::Sender<bool>,
    store_task: JoinHandle<()>,
    markets_task: JoinHandle<()>,
    trending_task: JoinHandle<()>,
    forward_task: JoinHandle<()>,
    stream: StreamHandle,
}

impl PulseRuntime {
    /// Start the store loop, both snapshot pollers and the price stream.
    ///
    /// `markets` feeds the watchlist and is banded by market cap; every record
    /// from `trending` is `Category::Trending`. An id returned by both keeps the
    /// watchlist record.
    pub fn spawn(
        config: &AppConfig,
        markets: Arc<dyn SnapshotSource>,
        trending: Arc<dyn SnapshotSource>,
        connector: Arc<dyn PriceConnector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel::<StoreEvent>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let store = ReconciliationStore::new(fallback::tokens(), config.evict_after_missed)
            .with_priority(&[MARKETS_SOURCE, TRENDING_SOURCE]);
        let (model_tx, model_rx) = watch::channel(store.read_model());
        let store_task = spawn_store_loop(store, events_rx, model_tx, shutdown_rx.clone());

        let markets = Arc::new(SnapshotFetcher::new(
            MARKETS_SOURCE,
            markets,
            CategoryRule::Bands(config.bands),
            config.backoff,
        ));
        let markets_task = spawn_snapshot_poller(
            markets,
            config.refresh_interval,
            events_tx.clone(),
            shutdown_rx.clone(),
        );

        let trending = Arc::new(SnapshotFetcher::new(
            TRENDING_SOURCE,
            trending,
            CategoryRule::Fixed(Category::Trending),
            config.backoff,
        ));
        let trending_task = spawn_snapshot_poller(
            trending,
            config.trending_refresh_interval,
            events_tx.clone(),
            shutdown_rx.clone(),
        );

        let (delta_tx, delta_rx) = mpsc::unbounded_channel::<Vec<PriceDelta>>();
        let stream = spawn_price_stream(
            connector,
            config.token_ids.clone(),
            config.reconnect_delay,
            delta_tx,
        );
        let forward_task = spawn_delta_forwarder(delta_rx, events_tx, shutdown_rx);

        info!(
            ids = config.token_ids.len(),
            refresh_secs = config.refresh_interval.as_secs(),
            trending_secs = config.trending_refresh_interval.as_secs(),
            "[INIT] runtime started"
        );

        Self {
            read_model: model_rx,
            shutdown: shutdown_tx,
            store_task,
            markets_task,
            trending_task,
            forward_task,
            stream,
        }
    }

    /// Read-only view; a new value is published after every applied event.
    pub fn subscribe(&self) -> watch::Receiver<ReadModel> {
        self.read_model.clone()
    }

    pub fn snapshot(&self) -> ReadModel {
        self.read_model.borrow().clone()
    }

    pub fn stream_counters(&self) -> StreamCounters {
        self.stream.counters()
    }

    pub fn stream_state(&self) -> ConnectionState {
        self.stream.state()
    }

    /// Stop polling, abort in-flight fetches, close the stream, cancel any
    /// pending reconnect and join every task.
    pub async fn shutdown(self) -> StreamCounters {
        self.shutdown.send_replace(true);
        let counters = self.stream.shutdown().await;
        for (name, task) in [
            ("markets poller", self.markets_task),
            ("trending poller", self.trending_task),
            ("forwarder", self.forward_task),
            ("store", self.store_task),
        ] {
            if let Err(e) = task.await {
                warn!(task = name, error = %e, "[SHUTDOWN] task failed");
            }
        }
        info!("[SHUTDOWN] runtime stopped");
        counters
    }
}

fn spawn_store_loop(
    mut store: ReconciliationStore,
    mut events: mpsc::UnboundedReceiver<StoreEvent>,
    model_tx: watch::Sender<ReadModel>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            store.apply(event);
            model_tx.send_replace(store.read_model());
        }
    })
}

fn spawn_delta_forwarder(
    mut deltas: mpsc::UnboundedReceiver<Vec<PriceDelta>>,
    events: mpsc::UnboundedSender<StoreEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => break,
                batch = deltas.recv() => match batch {
                    Some(b) => b,
                    None => break,
                },
            };
            if events.send(StoreEvent::Deltas(batch)).is_err() {
                break;
            }
        }
    })
}
