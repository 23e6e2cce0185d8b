use anyhow::Result;
use std::sync::Arc;
use token_pulse::{
    PulseRuntime,
    config::AppConfig,
    models::Category,
    query::{TokenQuery, top_movers},
    snapshot::CoinGeckoClient,
    stream::CoinCapConnector,
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = AppConfig::load()?;
    tracing::info!(
        api = %config.snapshot_api_url,
        ws = %config.stream_ws_url,
        ids = config.token_ids.len(),
        "[INIT] token-pulse starting"
    );

    let markets = Arc::new(CoinGeckoClient::new(
        &config.snapshot_api_url,
        config.token_ids.clone(),
        config.per_page,
        config.fetch_timeout,
    )?);
    let trending = Arc::new(CoinGeckoClient::top_markets(
        &config.snapshot_api_url,
        config.trending_per_page,
        config.fetch_timeout,
    )?);
    let connector = Arc::new(CoinCapConnector::new(config.stream_ws_url.clone()));
    let runtime = PulseRuntime::spawn(&config, markets, trending, connector);
    let model_rx = runtime.subscribe();

    let mut ticker = tokio::time::interval(config.heartbeat);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("[SHUTDOWN] ctrl-c received");
                break;
            }
            _ = ticker.tick() => {
                let model = model_rx.borrow().clone();
                if model.loading {
                    tracing::info!("[HEARTBEAT] waiting for first snapshot");
                    continue;
                }
                if model.is_unavailable() {
                    tracing::error!(error = ?model.last_error, "[HEARTBEAT] no data available");
                    continue;
                }
                let per_category: Vec<String> = Category::ALL
                    .iter()
                    .map(|c| format!("{}={}", c, model.by_category(*c).count()))
                    .collect();
                let leaders: Vec<String> = TokenQuery { per_page: 3, ..Default::default() }
                    .run(&model)
                    .items
                    .iter()
                    .map(|t| format!("{} ${:.4}", t.symbol, t.price))
                    .collect();
                let (gainers, losers) = top_movers(&model, 1);
                let counters = runtime.stream_counters();
                tracing::info!(
                    tokens = model.tokens.len(),
                    categories = ?per_category,
                    leaders = ?leaders,
                    top_gainer = ?gainers.first().map(|t| &t.symbol),
                    top_loser = ?losers.first().map(|t| &t.symbol),
                    refreshing = model.refreshing,
                    fallback = model.fallback_active,
                    persistent_failure = model.persistent_failure,
                    stream = %runtime.stream_state(),
                    deltas = counters.deltas_forwarded,
                    reconnects = counters.reconnects_scheduled,
                    "[HEARTBEAT] read model"
                );
            }
        }
    }

    let counters = runtime.shutdown().await;
    tracing::info!(
        connects = counters.connect_attempts,
        dropped = counters.messages_dropped,
        "[SHUTDOWN] done"
    );
    Ok(())
}
