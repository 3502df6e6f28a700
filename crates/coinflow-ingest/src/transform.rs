//! Source-specific mappings into the unified record shape
//!
//! Every mapping is pure. A batch transform never fails: items that do not
//! yield a valid record are logged and counted, and the rest of the batch
//! carries on.

use serde_json::Value;

use crate::error::Result;
use crate::schema::{RecordDraft, UnifiedCryptoRecord};
use crate::sources::{RawItem, SourceKind};

/// Result of transforming one extracted batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutcome {
    pub records: Vec<UnifiedCryptoRecord>,
    /// Number of items that were skipped
    pub errors: usize,
}

/// Map every item of a batch, keeping the valid records
pub fn transform_batch(kind: SourceKind, items: &[RawItem]) -> TransformOutcome {
    let mut outcome = TransformOutcome {
        records: Vec::with_capacity(items.len()),
        errors: 0,
    };

    for item in items {
        match transform_item(kind, item) {
            Ok(record) => outcome.records.push(record),
            Err(e) => {
                outcome.errors += 1;
                tracing::warn!(
                    source = %kind,
                    item_id = %item_id(item),
                    error = %e,
                    "Skipped invalid record"
                );
            }
        }
    }

    tracing::info!(
        source = %kind,
        transformed = outcome.records.len(),
        errors = outcome.errors,
        "Transformed batch"
    );

    outcome
}

pub fn transform_item(kind: SourceKind, item: &RawItem) -> Result<UnifiedCryptoRecord> {
    let draft = match kind {
        SourceKind::CoinPaprika => coinpaprika_draft(item),
        SourceKind::CoinGecko => coingecko_draft(item),
        SourceKind::Csv => csv_draft(item),
    };
    UnifiedCryptoRecord::new(draft)
}

fn coinpaprika_draft(item: &RawItem) -> RecordDraft {
    let quote = item
        .get("quotes")
        .and_then(|q| q.get("USD"))
        .and_then(Value::as_object);
    let field = |name: &str| quote.and_then(|q| api_number(q.get(name)));

    RecordDraft {
        market_cap_usd: field("market_cap"),
        volume_24h_usd: field("volume_24h"),
        change_24h_percent: field("percent_change_24h"),
        ..RecordDraft::new(
            SourceKind::CoinPaprika,
            text(item.get("id")),
            text(item.get("name")),
            field("price").unwrap_or(0.0),
        )
    }
}

fn coingecko_draft(item: &RawItem) -> RecordDraft {
    RecordDraft {
        market_cap_usd: api_number(item.get("market_cap")),
        volume_24h_usd: api_number(item.get("total_volume")),
        change_24h_percent: api_number(item.get("price_change_percentage_24h")),
        ..RecordDraft::new(
            SourceKind::CoinGecko,
            text(item.get("id")),
            text(item.get("name")),
            api_number(item.get("current_price")).unwrap_or(0.0),
        )
    }
}

fn csv_draft(item: &RawItem) -> RecordDraft {
    let price = first_present(item, &["price_usd", "price"]).and_then(csv_number);

    RecordDraft {
        market_cap_usd: first_present(item, &["market_cap_usd", "market_cap"]).and_then(csv_number),
        volume_24h_usd: first_present(item, &["volume_24h_usd", "volume"]).and_then(csv_number),
        ..RecordDraft::new(
            SourceKind::Csv,
            text(item.get("id")).trim().to_lowercase(),
            text(item.get("name")),
            price.unwrap_or(0.0),
        )
    }
}

/// First of `keys` holding a non-null, non-blank value
fn first_present<'a>(item: &'a RawItem, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

/// Number or numeric string; anything else is treated as missing
fn api_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Like [`api_number`] but strips thousands separators first
fn csv_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn item_id(item: &RawItem) -> String {
    match item.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}
