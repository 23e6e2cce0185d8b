//! REST snapshot fetcher.
//!
//! Responsibilities:
//! • Pull a bounded set of market records from a REST provider.
//! • Retry failed pulls with capped exponential backoff.
//! • Normalize provider records into `Token`s and assign categories.
//! • Re-poll on a fixed interval, tagging every pull with a sequence number.

use crate::config::BackoffConfig;
use crate::errors::{AppError, Result};
use crate::models::Token;
use crate::store::StoreEvent;
use crate::utils::backoff_delay;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub mod client;
pub mod normalize;

pub use client::CoinGeckoClient;
pub use normalize::{CategoryRule, MarketRecord, band_category, normalize_record, normalize_snapshot};

/// Anything that can return one page of raw market records.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>>;
}

/// Source plus category rule plus retry policy.
pub struct SnapshotFetcher {
    label: &'static str,
    source: Arc<dyn SnapshotSource>,
    rule: CategoryRule,
    backoff: BackoffConfig,
}

impl SnapshotFetcher {
    pub fn new(
        label: &'static str,
        source: Arc<dyn SnapshotSource>,
        rule: CategoryRule,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            label,
            source,
            rule,
            backoff,
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// One logical fetch: up to `max_attempts` pulls, sleeping
    /// `min(base * 2^attempt, cap)` between them. Returns the last error once
    /// every attempt failed.
    pub async fn fetch(&self) -> Result<Vec<Token>> {
        let attempts = self.backoff.max_attempts.max(1);
        let mut last_err = AppError::Other("no fetch attempted".into());
        for attempt in 0..attempts {
            match self.source.fetch_markets().await {
                Ok(records) => {
                    let tokens = normalize_snapshot(records, &self.rule);
                    debug!(source = self.label, attempt, count = tokens.len(), "[SNAPSHOT] fetched");
                    return Ok(tokens);
                }
                Err(e) => {
                    warn!(source = self.label, attempt, error = %e, "[SNAPSHOT] fetch failed");
                    last_err = e;
                    if attempt + 1 < attempts {
                        let delay = backoff_delay(self.backoff.base, attempt, self.backoff.cap);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(last_err)
    }
}

/// Spawn the refresh loop: one fetch immediately, then one per `period`.
///
/// Every fetch runs in its own task so a slow one never delays the next tick;
/// the store drops results that arrive out of sequence. On shutdown the ticker
/// stops and in-flight fetches are aborted.
pub fn spawn_snapshot_poller(
    fetcher: Arc<SnapshotFetcher>,
    period: Duration,
    events: mpsc::UnboundedSender<StoreEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight = JoinSet::new();
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    seq += 1;
                    let source = fetcher.label();
                    if events.send(StoreEvent::SnapshotStarted { source, seq }).is_err() {
                        break;
                    }
                    let fetcher = fetcher.clone();
                    let events = events.clone();
                    in_flight.spawn(async move {
                        let event = match fetcher.fetch().await {
                            Ok(tokens) => StoreEvent::SnapshotReady { source, seq, tokens },
                            Err(error) => StoreEvent::SnapshotFailed { source, seq, error },
                        };
                        let _ = events.send(event);
                    });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        let pending = in_flight.len();
        in_flight.shutdown().await;
        info!(pending, "[SNAPSHOT] poller stopped");
    })
}
