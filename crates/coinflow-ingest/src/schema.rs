//! Unified record shape shared by every source
//!
//! A [`UnifiedCryptoRecord`] can only be obtained through
//! [`UnifiedCryptoRecord::new`], which enforces the field rules:
//!
//! - `crypto_id` is trimmed, lowercased and non-empty
//! - `crypto_name` is trimmed and non-empty
//! - `price_usd` is finite and strictly positive
//! - `market_cap_usd` and `volume_24h_usd` are finite and non-negative when present
//! - `change_24h_percent` may take any sign but must be finite when present

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{IngestError, Result};
use crate::sources::SourceKind;

/// Unvalidated field values produced by a transformer
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub crypto_id: String,
    pub crypto_name: String,
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub change_24h_percent: Option<f64>,
    pub source: SourceKind,
    /// Defaults to the time of validation
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordDraft {
    pub fn new(
        source: SourceKind,
        crypto_id: impl Into<String>,
        crypto_name: impl Into<String>,
        price_usd: f64,
    ) -> Self {
        Self {
            crypto_id: crypto_id.into(),
            crypto_name: crypto_name.into(),
            price_usd,
            market_cap_usd: None,
            volume_24h_usd: None,
            change_24h_percent: None,
            source,
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedCryptoRecord {
    crypto_id: String,
    crypto_name: String,
    price_usd: f64,
    market_cap_usd: Option<f64>,
    volume_24h_usd: Option<f64>,
    change_24h_percent: Option<f64>,
    source: SourceKind,
    timestamp: DateTime<Utc>,
}

impl UnifiedCryptoRecord {
    pub fn new(draft: RecordDraft) -> Result<Self> {
        let crypto_id = draft.crypto_id.trim().to_lowercase();
        if crypto_id.is_empty() {
            return Err(IngestError::validation("crypto_id cannot be empty"));
        }

        let crypto_name = draft.crypto_name.trim().to_string();
        if crypto_name.is_empty() {
            return Err(IngestError::validation(format!(
                "crypto_name cannot be empty for '{}'",
                crypto_id
            )));
        }

        if !draft.price_usd.is_finite() || draft.price_usd <= 0.0 {
            return Err(IngestError::validation(format!(
                "price_usd must be positive for '{}', got {}",
                crypto_id, draft.price_usd
            )));
        }

        non_negative("market_cap_usd", &crypto_id, draft.market_cap_usd)?;
        non_negative("volume_24h_usd", &crypto_id, draft.volume_24h_usd)?;

        if let Some(change) = draft.change_24h_percent {
            if !change.is_finite() {
                return Err(IngestError::validation(format!(
                    "change_24h_percent must be finite for '{}'",
                    crypto_id
                )));
            }
        }

        Ok(Self {
            crypto_id,
            crypto_name,
            price_usd: draft.price_usd,
            market_cap_usd: draft.market_cap_usd,
            volume_24h_usd: draft.volume_24h_usd,
            change_24h_percent: draft.change_24h_percent,
            source: draft.source,
            timestamp: draft.timestamp.unwrap_or_else(Utc::now),
        })
    }

    pub fn crypto_id(&self) -> &str {
        &self.crypto_id
    }

    pub fn crypto_name(&self) -> &str {
        &self.crypto_name
    }

    pub fn price_usd(&self) -> f64 {
        self.price_usd
    }

    pub fn market_cap_usd(&self) -> Option<f64> {
        self.market_cap_usd
    }

    pub fn volume_24h_usd(&self) -> Option<f64> {
        self.volume_24h_usd
    }

    pub fn change_24h_percent(&self) -> Option<f64> {
        self.change_24h_percent
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// JSON form stored in `cleaned_data.normalized_data`
    pub fn normalized_json(&self) -> serde_json::Value {
        serde_json::json!({
            "crypto_id": self.crypto_id,
            "crypto_name": self.crypto_name,
            "price_usd": self.price_usd,
            "market_cap_usd": self.market_cap_usd,
            "volume_24h_usd": self.volume_24h_usd,
            "change_24h_percent": self.change_24h_percent,
            "source": self.source,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}

fn non_negative(field: &str, crypto_id: &str, value: Option<f64>) -> Result<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(IngestError::validation(format!(
            "{} must be non-negative for '{}', got {}",
            field, crypto_id, v
        ))),
        _ => Ok(()),
    }
}
