use crate::errors::{AppError, Result};
use crate::snapshot::{MarketRecord, SnapshotSource};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// REST client for a CoinGecko-compatible `/coins/markets` endpoint.
#[derive(Clone)]
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    /// `None` asks for the unrestricted top-N by market cap.
    ids: Option<Vec<String>>,
    per_page: u32,
}

impl CoinGeckoClient {
    /// Client restricted to `ids`.
    pub fn new(base_url: &str, ids: Vec<String>, per_page: u32, timeout: Duration) -> Result<Self> {
        Self::build(base_url, Some(ids), per_page, timeout)
    }

    /// Client for the top `per_page` markets by market cap.
    pub fn top_markets(base_url: &str, per_page: u32, timeout: Duration) -> Result<Self> {
        Self::build(base_url, None, per_page, timeout)
    }

    fn build(
        base_url: &str,
        ids: Option<Vec<String>>,
        per_page: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let client = Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            ids,
            per_page,
        };
        client.markets_url()?;
        Ok(client)
    }

    pub fn markets_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/coins/markets", self.base_url))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("vs_currency", "usd");
            if let Some(ids) = &self.ids {
                q.append_pair("ids", &ids.join(","));
            }
            q.append_pair("order", "market_cap_desc")
                .append_pair("per_page", &self.per_page.to_string())
                .append_pair("page", "1")
                .append_pair("sparkline", "false")
                .append_pair("price_change_percentage", "1h,24h,7d");
        }
        Ok(url)
    }
}

#[async_trait]
impl SnapshotSource for CoinGeckoClient {
    async fn fetch_markets(&self) -> Result<Vec<MarketRecord>> {
        let url = self.markets_url()?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Transport(format!("markets request returned {status}")));
        }
        let body = resp.text().await?;
        let records: Vec<MarketRecord> = serde_json::from_str(&body)?;
        debug!(count = records.len(), "[SNAPSHOT] markets decoded");
        Ok(records)
    }
}
