//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

// ============================================================================
// Database Constants
// ============================================================================

/// Default database URL for local runs; `mode=rwc` creates the file on first use.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/coinflow.db?mode=rwc";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// Source Constants
// ============================================================================

/// Default location of the CSV feed.
pub const DEFAULT_CSV_FILE_PATH: &str = "data/crypto_sample.csv";

/// Default number of items requested from each API source per run.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Largest batch CoinGecko will serve in a single page.
pub const MAX_BATCH_SIZE: u32 = 250;

pub const DEFAULT_COINPAPRIKA_BASE_URL: &str = "https://api.coinpaprika.com/v1";

pub const DEFAULT_COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default sleep after an HTTP 429 before retrying.
pub const DEFAULT_RATE_LIMIT_COOLDOWN_SECS: u64 = 60;

/// Default number of retries after an HTTP 429.
pub const DEFAULT_RATE_LIMIT_MAX_RETRIES: u32 = 1;

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Upstream source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub csv_file_path: PathBuf,
    pub batch_size: u32,
    pub coinpaprika_base_url: String,
    pub coingecko_base_url: String,
    pub http_timeout_secs: u64,
    pub rate_limit_cooldown_secs: u64,
    pub rate_limit_max_retries: u32,
}

impl SourcesConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Load configuration from the environment only
    pub fn from_env() -> Result<Self> {
        let config = IngestConfig {
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                ),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
            },
            sources: SourcesConfig {
                csv_file_path: PathBuf::from(env_string("CSV_FILE_PATH", DEFAULT_CSV_FILE_PATH)),
                batch_size: env_or("BATCH_SIZE", DEFAULT_BATCH_SIZE),
                coinpaprika_base_url: env_string(
                    "COINPAPRIKA_BASE_URL",
                    DEFAULT_COINPAPRIKA_BASE_URL,
                ),
                coingecko_base_url: env_string("COINGECKO_BASE_URL", DEFAULT_COINGECKO_BASE_URL),
                http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
                rate_limit_cooldown_secs: env_or(
                    "RATE_LIMIT_COOLDOWN_SECS",
                    DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
                ),
                rate_limit_max_retries: env_or(
                    "RATE_LIMIT_MAX_RETRIES",
                    DEFAULT_RATE_LIMIT_MAX_RETRIES,
                ),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(IngestError::config(
                "Database max_connections must be greater than 0",
            ));
        }

        if !(1..=MAX_BATCH_SIZE).contains(&self.sources.batch_size) {
            return Err(IngestError::config(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.sources.batch_size
            )));
        }

        if self.sources.http_timeout_secs == 0 {
            tracing::warn!("HTTP timeout of 0 seconds will fail every request");
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            sources: SourcesConfig {
                csv_file_path: PathBuf::from(DEFAULT_CSV_FILE_PATH),
                batch_size: DEFAULT_BATCH_SIZE,
                coinpaprika_base_url: DEFAULT_COINPAPRIKA_BASE_URL.to_string(),
                coingecko_base_url: DEFAULT_COINGECKO_BASE_URL.to_string(),
                http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN_SECS,
                rate_limit_max_retries: DEFAULT_RATE_LIMIT_MAX_RETRIES,
            },
        }
    }
}
