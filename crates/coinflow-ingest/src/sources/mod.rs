//! Upstream market data sources
//!
//! Each source yields raw, source-shaped JSON objects. Extractors never touch
//! the database; the pipeline persists raw items on their behalf.

pub mod coingecko;
pub mod coinpaprika;
pub mod csv_file;
pub mod http;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::SourcesConfig;
use crate::error::{IngestError, Result};

pub use coingecko::CoinGeckoClient;
pub use coinpaprika::CoinPaprikaClient;
pub use csv_file::CsvReader;
pub use http::RetryPolicy;

/// One extracted item, exactly as the source shaped it
pub type RawItem = serde_json::Map<String, serde_json::Value>;

/// The fixed set of upstream sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    CoinPaprika,
    CoinGecko,
    Csv,
}

impl SourceKind {
    /// Every source in pipeline order
    pub const ALL: [SourceKind; 3] = [SourceKind::CoinPaprika, SourceKind::CoinGecko, SourceKind::Csv];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::CoinPaprika => "coinpaprika",
            SourceKind::CoinGecko => "coingecko",
            SourceKind::Csv => "csv",
        }
    }

    /// Whether raw items from this source land in `raw_api_data`
    pub fn is_api(&self) -> bool {
        !matches!(self, SourceKind::Csv)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coinpaprika" => Ok(SourceKind::CoinPaprika),
            "coingecko" => Ok(SourceKind::CoinGecko),
            "csv" => Ok(SourceKind::Csv),
            other => Err(IngestError::config(format!(
                "unknown source '{}', expected one of coinpaprika, coingecko, csv",
                other
            ))),
        }
    }
}

/// Extractor selected by [`SourceKind`]
#[derive(Debug, Clone)]
pub enum Extractor {
    CoinPaprika(CoinPaprikaClient),
    CoinGecko(CoinGeckoClient),
    Csv(CsvReader),
}

impl Extractor {
    /// Build the extractor for `kind` from source configuration
    pub fn for_kind(kind: SourceKind, config: &SourcesConfig) -> Result<Self> {
        let retry = RetryPolicy::from_config(config);
        Ok(match kind {
            SourceKind::CoinPaprika => Extractor::CoinPaprika(CoinPaprikaClient::new(
                &config.coinpaprika_base_url,
                config.http_timeout(),
                retry,
            )?),
            SourceKind::CoinGecko => Extractor::CoinGecko(CoinGeckoClient::new(
                &config.coingecko_base_url,
                config.http_timeout(),
                retry,
            )?),
            SourceKind::Csv => Extractor::Csv(CsvReader::new(&config.csv_file_path)),
        })
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Extractor::CoinPaprika(_) => SourceKind::CoinPaprika,
            Extractor::CoinGecko(_) => SourceKind::CoinGecko,
            Extractor::Csv(_) => SourceKind::Csv,
        }
    }

    /// Fetch up to `limit` items; file sources return every row
    pub async fn fetch(&self, limit: u32) -> Result<Vec<RawItem>> {
        match self {
            Extractor::CoinPaprika(client) => client.get_tickers(limit).await,
            Extractor::CoinGecko(client) => client.get_coins_markets(limit).await,
            Extractor::Csv(reader) => reader.read(),
        }
    }
}
