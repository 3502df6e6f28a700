//! Shared HTTP plumbing for the API sources
//!
//! Both API sources issue a single GET that answers with a JSON array of
//! objects. HTTP 429 is the only recoverable status: the request sleeps for the
//! policy cooldown and is sent again, up to `max_retries` times.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use super::{RawItem, SourceKind};
use crate::config::{
    SourcesConfig, DEFAULT_RATE_LIMIT_COOLDOWN_SECS, DEFAULT_RATE_LIMIT_MAX_RETRIES,
};
use crate::error::{IngestError, Result};

/// How an API source reacts to HTTP 429
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub cooldown: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_RATE_LIMIT_MAX_RETRIES,
            cooldown: Duration::from_secs(DEFAULT_RATE_LIMIT_COOLDOWN_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &SourcesConfig) -> Self {
        Self {
            max_retries: config.rate_limit_max_retries,
            cooldown: config.rate_limit_cooldown(),
        }
    }

    /// Fail on the first 429
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            cooldown: Duration::ZERO,
        }
    }
}

pub(crate) fn build_client(timeout: Duration, user_agent: Option<&str>) -> Result<Client> {
    let mut builder = Client::builder().timeout(timeout);
    if let Some(agent) = user_agent {
        builder = builder.user_agent(agent);
    }
    builder
        .build()
        .map_err(|e| IngestError::config(format!("failed to build HTTP client: {}", e)))
}

/// GET `url` and decode the body as a JSON array of objects
pub(crate) async fn get_json_rows(
    client: &Client,
    kind: SourceKind,
    url: &str,
    query: &[(&str, String)],
    retry: RetryPolicy,
) -> Result<Vec<RawItem>> {
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let response = client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| IngestError::unavailable(kind, e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            if attempts > retry.max_retries {
                return Err(IngestError::RateLimited { kind, attempts });
            }
            tracing::warn!(
                source = %kind,
                attempt = attempts,
                cooldown_secs = retry.cooldown.as_secs(),
                "Rate limited, waiting before retry"
            );
            tokio::time::sleep(retry.cooldown).await;
            continue;
        }

        if !status.is_success() {
            return Err(IngestError::unavailable(kind, format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::unavailable(kind, e.to_string()))?;

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| IngestError::format(kind, format!("invalid JSON: {}", e)))?;

        return rows_from_value(kind, value);
    }
}

pub(crate) fn rows_from_value(kind: SourceKind, value: Value) -> Result<Vec<RawItem>> {
    let Value::Array(items) = value else {
        return Err(IngestError::format(kind, "expected a JSON array"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            other => Err(IngestError::format(
                kind,
                format!("item {} is not an object: {}", i, other),
            )),
        })
        .collect()
}
