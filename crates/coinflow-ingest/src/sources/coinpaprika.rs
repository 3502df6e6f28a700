//! CoinPaprika tickers client

use std::time::Duration;

use reqwest::Client;

use super::http::{build_client, get_json_rows, RetryPolicy};
use super::{RawItem, SourceKind};
use crate::error::Result;

/// User agent sent with every CoinPaprika request
pub const USER_AGENT: &str = concat!("Coinflow-ETL/", env!("CARGO_PKG_VERSION"));

/// Client for the public CoinPaprika API
#[derive(Debug, Clone)]
pub struct CoinPaprikaClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl CoinPaprikaClient {
    pub fn new(base_url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout, Some(USER_AGENT))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    /// Fetch the top `limit` tickers quoted in USD
    pub async fn get_tickers(&self, limit: u32) -> Result<Vec<RawItem>> {
        let url = format!("{}/tickers", self.base_url);
        let query = [("quotes", "USD".to_string()), ("limit", limit.to_string())];

        tracing::debug!(limit, "Fetching CoinPaprika tickers");
        let rows = get_json_rows(&self.client, SourceKind::CoinPaprika, &url, &query, self.retry).await?;
        tracing::debug!(count = rows.len(), "Fetched CoinPaprika tickers");

        Ok(rows)
    }
}
