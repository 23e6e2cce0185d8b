//! Configuration loader and application settings.

use crate::errors::{AppError, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_SNAPSHOT_API_URL: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_STREAM_WS_URL: &str = "wss://ws.coincap.io/prices";

pub const DEFAULT_TOKEN_IDS: [&str; 25] = [
    "bitcoin",
    "ethereum",
    "solana",
    "cardano",
    "polkadot",
    "ripple",
    "dogecoin",
    "shiba-inu",
    "uniswap",
    "aave",
    "chainlink",
    "litecoin",
    "polygon",
    "avalanche-2",
    "cosmos",
    "near",
    "filecoin",
    "the-graph",
    "optimism",
    "arbitrum",
    "fantom",
    "aptos",
    "sui",
    "stacks",
    "maker",
];

/// Rank bands for positional category assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandConfig {
    /// First N by market cap.
    pub migrated: usize,
    /// Next M after the migrated band.
    pub final_stretch: usize,
}

/// Retry policy for snapshot fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub cap: Duration,
    /// Total attempts per fetch, including the first.
    pub max_attempts: u32,
}

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// REST market-data base URL.
    pub snapshot_api_url: String,
    /// Websocket price feed URL, without query string.
    pub stream_ws_url: String,
    pub token_ids: Vec<String>,
    pub per_page: u32,
    pub refresh_interval: Duration,
    /// Size of the unrestricted top-N feed whose records are all `Trending`.
    pub trending_per_page: u32,
    pub trending_refresh_interval: Duration,
    pub fetch_timeout: Duration,
    pub backoff: BackoffConfig,
    pub reconnect_delay: Duration,
    pub bands: BandConfig,
    /// `None` keeps ids dropped from a refresh forever.
    pub evict_after_missed: Option<u32>,
    pub heartbeat: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            snapshot_api_url: DEFAULT_SNAPSHOT_API_URL.to_string(),
            stream_ws_url: DEFAULT_STREAM_WS_URL.to_string(),
            token_ids: DEFAULT_TOKEN_IDS.iter().map(|s| s.to_string()).collect(),
            per_page: 250,
            refresh_interval: Duration::from_secs(30),
            trending_per_page: 100,
            trending_refresh_interval: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(10),
            backoff: BackoffConfig {
                base: Duration::from_millis(1000),
                cap: Duration::from_millis(8000),
                max_attempts: 3,
            },
            reconnect_delay: Duration::from_secs(5),
            bands: BandConfig {
                migrated: 8,
                final_stretch: 8,
            },
            evict_after_missed: None,
            heartbeat: Duration::from_secs(10),
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let token_ids = match get("TOKEN_IDS") {
            Some(raw) => parse_id_list(&raw),
            None => defaults.token_ids,
        };
        if token_ids.is_empty() {
            return Err(AppError::Config("TOKEN_IDS must name at least one id".into()));
        }

        let max_attempts: u32 = parse_or(&get, "FETCH_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(AppError::Config("FETCH_MAX_ATTEMPTS must be at least 1".into()));
        }
        let refresh_secs: u64 = parse_or(&get, "REFRESH_INTERVAL_SECS", 30)?;
        if refresh_secs == 0 {
            return Err(AppError::Config("REFRESH_INTERVAL_SECS must be positive".into()));
        }
        let trending_refresh_secs: u64 = parse_or(&get, "TRENDING_REFRESH_SECS", 60)?;
        if trending_refresh_secs == 0 {
            return Err(AppError::Config("TRENDING_REFRESH_SECS must be positive".into()));
        }

        let evict_after_missed = match get("EVICT_AFTER_MISSED") {
            Some(raw) => Some(parse_value::<u32>("EVICT_AFTER_MISSED", &raw)?),
            None => None,
        };

        Ok(Self {
            snapshot_api_url: get("SNAPSHOT_API_URL").unwrap_or(defaults.snapshot_api_url),
            stream_ws_url: get("STREAM_WS_URL").unwrap_or(defaults.stream_ws_url),
            token_ids,
            per_page: parse_or(&get, "SNAPSHOT_PER_PAGE", defaults.per_page)?,
            refresh_interval: Duration::from_secs(refresh_secs),
            trending_per_page: parse_or(&get, "TRENDING_PER_PAGE", defaults.trending_per_page)?,
            trending_refresh_interval: Duration::from_secs(trending_refresh_secs),
            fetch_timeout: Duration::from_secs(parse_or(&get, "FETCH_TIMEOUT_SECS", 10)?),
            backoff: BackoffConfig {
                base: Duration::from_millis(parse_or(&get, "FETCH_BACKOFF_BASE_MS", 1000)?),
                cap: Duration::from_millis(parse_or(&get, "FETCH_BACKOFF_CAP_MS", 8000)?),
                max_attempts,
            },
            reconnect_delay: Duration::from_secs(parse_or(&get, "RECONNECT_DELAY_SECS", 5)?),
            bands: BandConfig {
                migrated: parse_or(&get, "BAND_MIGRATED", defaults.bands.migrated)?,
                final_stretch: parse_or(&get, "BAND_FINAL_STRETCH", defaults.bands.final_stretch)?,
            },
            evict_after_missed,
            heartbeat: Duration::from_secs(parse_or(&get, "HEARTBEAT_SECS", 10)?),
        })
    }
}

fn parse_id_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}")))
}
