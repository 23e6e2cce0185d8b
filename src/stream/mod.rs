//! Streaming price client.
//!
//! Responsibilities:
//! • Keep a push connection open for a fixed set of token ids.
//! • Decode `(id, price)` deltas and hand them to the subscriber.
//! • Reconnect after a fixed delay, forever, until torn down.
//! • On teardown, close the connection and cancel a pending reconnect.

use crate::errors::Result;
use crate::models::PriceDelta;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

pub mod coincap;

pub use coincap::{CoinCapConnector, decode_prices};

/// Raw text frames of one connection; ends when the connection closes.
pub type MessageStream = BoxStream<'static, Result<String>>;

/// Opens one push connection for a set of ids.
#[async_trait]
pub trait PriceConnector: Send + Sync {
    async fn connect(&self, ids: &[String]) -> Result<MessageStream>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Errored => "errored",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
struct StreamStats {
    connect_attempts: AtomicU64,
    reconnects_scheduled: AtomicU64,
    pending_reconnects: AtomicU64,
    messages_dropped: AtomicU64,
    deltas_forwarded: AtomicU64,
}

impl StreamStats {
    fn snapshot(&self) -> StreamCounters {
        StreamCounters {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            pending_reconnects: self.pending_reconnects.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            deltas_forwarded: self.deltas_forwarded.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the supervisor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCounters {
    pub connect_attempts: u64,
    pub reconnects_scheduled: u64,
    /// Reconnect timers armed right now; 0 or 1.
    pub pending_reconnects: u64,
    pub messages_dropped: u64,
    pub deltas_forwarded: u64,
}

/// Owner of a running stream supervisor. Dropping it also tears the stream down.
pub struct StreamHandle {
    state: watch::Receiver<ConnectionState>,
    stats: Arc<StreamStats>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl StreamHandle {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn counters(&self) -> StreamCounters {
        self.stats.snapshot()
    }

    /// Close the connection, cancel any pending reconnect and wait for the
    /// supervisor to exit.
    pub async fn shutdown(self) -> StreamCounters {
        self.shutdown.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "[STREAM] supervisor task failed");
        }
        self.stats.snapshot()
    }
}

enum SessionEnd {
    Closed,
    Errored,
    Shutdown,
    SubscriberGone,
}

/// Spawn the connect / reconnect supervisor for `ids`.
pub fn spawn_price_stream(
    connector: Arc<dyn PriceConnector>,
    ids: Vec<String>,
    reconnect_delay: Duration,
    deltas: mpsc::UnboundedSender<Vec<PriceDelta>>,
) -> StreamHandle {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stats = Arc::new(StreamStats::default());

    let task = tokio::spawn(supervise(
        connector,
        ids,
        reconnect_delay,
        deltas,
        state_tx,
        shutdown_rx,
        stats.clone(),
    ));

    StreamHandle {
        state: state_rx,
        stats,
        shutdown: shutdown_tx,
        task,
    }
}

async fn supervise(
    connector: Arc<dyn PriceConnector>,
    ids: Vec<String>,
    reconnect_delay: Duration,
    deltas: mpsc::UnboundedSender<Vec<PriceDelta>>,
    state: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
    stats: Arc<StreamStats>,
) {
    loop {
        state.send_replace(ConnectionState::Connecting);
        stats.connect_attempts.fetch_add(1, Ordering::Relaxed);

        let connected = tokio::select! {
            _ = shutdown.changed() => break,
            res = connector.connect(&ids) => res,
        };

        let end = match connected {
            Ok(messages) => {
                state.send_replace(ConnectionState::Open);
                info!(assets = ids.len(), "[STREAM] open");
                pump(messages, &deltas, &mut shutdown, &stats).await
            }
            Err(e) => {
                warn!(error = %e, "[STREAM] connect failed");
                SessionEnd::Errored
            }
        };

        match end {
            SessionEnd::Closed => state.send_replace(ConnectionState::Closed),
            SessionEnd::Errored => state.send_replace(ConnectionState::Errored),
            SessionEnd::Shutdown | SessionEnd::SubscriberGone => break,
        };

        stats.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
        stats.pending_reconnects.fetch_add(1, Ordering::Relaxed);
        info!(delay_ms = reconnect_delay.as_millis() as u64, "[STREAM] reconnect scheduled");

        let cancelled = tokio::select! {
            _ = shutdown.changed() => true,
            _ = deltas.closed() => true,
            _ = tokio::time::sleep(reconnect_delay) => false,
        };
        stats.pending_reconnects.fetch_sub(1, Ordering::Relaxed);
        if cancelled {
            break;
        }
    }

    state.send_replace(ConnectionState::Closed);
    info!("[STREAM] supervisor stopped");
}

/// Forward decoded deltas until the connection ends or we are told to stop.
/// Dropping `messages` on return closes the connection.
async fn pump(
    mut messages: MessageStream,
    deltas: &mpsc::UnboundedSender<Vec<PriceDelta>>,
    shutdown: &mut watch::Receiver<bool>,
    stats: &StreamStats,
) -> SessionEnd {
    loop {
        let next = tokio::select! {
            _ = shutdown.changed() => return SessionEnd::Shutdown,
            _ = deltas.closed() => return SessionEnd::SubscriberGone,
            next = messages.next() => next,
        };
        match next {
            Some(Ok(text)) => match decode_prices(&text) {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    let n = batch.len() as u64;
                    if deltas.send(batch).is_err() {
                        return SessionEnd::SubscriberGone;
                    }
                    stats.deltas_forwarded.fetch_add(n, Ordering::Relaxed);
                }
                Err(e) => {
                    stats.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, "[STREAM] message dropped");
                }
            },
            Some(Err(e)) => {
                warn!(error = %e, "[STREAM] connection lost");
                return SessionEnd::Errored;
            }
            None => {
                info!("[STREAM] connection closed");
                return SessionEnd::Closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use futures::stream;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// First `closing` connections deliver `frames` then close; later ones
    /// deliver `frames` and stay open. `failing` connects error out first.
    struct FakeConnector {
        failing: usize,
        closing: usize,
        frames: Vec<&'static str>,
        calls: Mutex<Vec<Instant>>,
    }

    impl FakeConnector {
        fn new(failing: usize, closing: usize, frames: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                failing,
                closing,
                frames,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_times(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PriceConnector for FakeConnector {
        async fn connect(&self, _ids: &[String]) -> Result<MessageStream> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len()
            };
            if n <= self.failing {
                return Err(AppError::Transport("refused".into()));
            }
            let frames: Vec<Result<String>> =
                self.frames.iter().map(|f| Ok(f.to_string())).collect();
            if n <= self.failing + self.closing {
                Ok(stream::iter(frames).boxed())
            } else {
                Ok(stream::iter(frames).chain(stream::pending()).boxed())
            }
        }
    }

    fn ids() -> Vec<String> {
        vec!["bitcoin".into(), "ethereum".into()]
    }

    const DELAY: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn n_closes_schedule_n_reconnects_at_fixed_delay() {
        let connector = FakeConnector::new(0, 3, vec![r#"{"bitcoin":"100.0"}"#]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let calls = connector.call_times();
        assert_eq!(calls.len(), 4);
        for pair in calls.windows(2) {
            assert_eq!(pair[1] - pair[0], DELAY);
        }
        assert_eq!(handle.state(), ConnectionState::Open);
        let counters = handle.counters();
        assert_eq!(counters.reconnects_scheduled, 3);
        assert_eq!(counters.pending_reconnects, 0);

        let mut batches = 0;
        while let Ok(batch) = rx.try_recv() {
            assert_eq!(batch[0].id, "bitcoin");
            batches += 1;
        }
        assert_eq!(batches, 4);

        let counters = handle.shutdown().await;
        assert_eq!(counters.pending_reconnects, 0);
        assert_eq!(counters.connect_attempts, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_reconnect() {
        let connector = FakeConnector::new(0, usize::MAX / 2, vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.counters().pending_reconnects, 1);
        assert_eq!(handle.state(), ConnectionState::Closed);

        let counters = handle.shutdown().await;
        assert_eq!(counters.pending_reconnects, 0);
        assert_eq!(counters.reconnects_scheduled, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.call_times().len(), 1, "timer fired after teardown");
    }

    #[tokio::test(start_paused = true)]
    async fn connect_error_reconnects() {
        let connector = FakeConnector::new(2, 0, vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.state(), ConnectionState::Errored);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.call_times().len(), 3);
        assert_eq!(handle.state(), ConnectionState::Open);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn garbled_message_keeps_connection_open() {
        let connector = FakeConnector::new(
            0,
            0,
            vec!["garbage", r#"{"bitcoin":"x","ethereum":"3500.5"}"#],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);

        let batch = rx.recv().await.unwrap();
        assert_eq!(
            batch,
            vec![PriceDelta {
                id: "ethereum".into(),
                price: 3500.5
            }]
        );
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.call_times().len(), 1);
        assert_eq!(handle.state(), ConnectionState::Open);
        assert_eq!(handle.counters().messages_dropped, 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_subscriber_stops_supervisor() {
        let connector = FakeConnector::new(0, 0, vec![]);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(handle.task.is_finished());
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_tears_down() {
        let connector = FakeConnector::new(0, usize::MAX / 2, vec![]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = spawn_price_stream(connector.clone(), ids(), DELAY, tx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.call_times().len(), 1);
    }
}
