//! CoinGecko markets client

use std::time::Duration;

use reqwest::Client;

use super::http::{build_client, get_json_rows, RetryPolicy};
use super::{RawItem, SourceKind};
use crate::config::MAX_BATCH_SIZE;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Fetch the first page of coins ordered by market cap
    ///
    /// CoinGecko serves at most 250 coins per page, so larger limits are capped.
    pub async fn get_coins_markets(&self, limit: u32) -> Result<Vec<RawItem>> {
        let url = format!("{}/coins/markets", self.base_url);
        let per_page = limit.min(MAX_BATCH_SIZE);
        let query = [
            ("vs_currency", "usd".to_string()),
            ("order", "market_cap_desc".to_string()),
            ("per_page", per_page.to_string()),
            ("page", "1".to_string()),
            ("sparkline", "false".to_string()),
        ];

        tracing::debug!(per_page, "Fetching CoinGecko markets");
        let rows = get_json_rows(&self.client, SourceKind::CoinGecko, &url, &query, self.retry).await?;
        tracing::debug!(count = rows.len(), "Fetched CoinGecko markets");

        Ok(rows)
    }
}
