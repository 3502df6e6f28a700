//! Read-only queries over loaded data and run bookkeeping

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use coinflow_common::pagination::{PageMetadata, PageParams};
use coinflow_common::CoinflowError;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db;
use crate::error::Result;
use crate::runs::{RunRecord, RunTracker};

/// Number of runs reported by [`pipeline_stats`]
pub const RECENT_RUNS_LIMIT: i64 = 10;

/// Sortable columns of `cleaned_data`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    #[default]
    CreatedAt,
    PriceUsd,
    MarketCapUsd,
    Volume24hUsd,
    Change24hPercent,
    CryptoId,
}

impl SortColumn {
    fn column(&self) -> &'static str {
        match self {
            SortColumn::CreatedAt => "created_at",
            SortColumn::PriceUsd => "price_usd",
            SortColumn::MarketCapUsd => "market_cap_usd",
            SortColumn::Volume24hUsd => "volume_24h_usd",
            SortColumn::Change24hPercent => "change_24h_percent",
            SortColumn::CryptoId => "crypto_id",
        }
    }
}

impl FromStr for SortColumn {
    type Err = CoinflowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_at" => Ok(SortColumn::CreatedAt),
            "price_usd" => Ok(SortColumn::PriceUsd),
            "market_cap_usd" => Ok(SortColumn::MarketCapUsd),
            "volume_24h_usd" => Ok(SortColumn::Volume24hUsd),
            "change_24h_percent" => Ok(SortColumn::Change24hPercent),
            "crypto_id" => Ok(SortColumn::CryptoId),
            other => Err(CoinflowError::config(format!("unknown sort column '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// `desc` in any case sorts descending; everything else ascending
    pub fn parse_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("ASC"),
            SortOrder::Desc => f.write_str("DESC"),
        }
    }
}

/// Filters, ordering and paging for [`list_records`]
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub source: Option<String>,
    pub crypto_id: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl RecordQuery {
    /// Unknown sort columns fall back to `created_at`
    fn sort_column(&self) -> SortColumn {
        match self.sort_by.as_deref() {
            None => SortColumn::default(),
            Some(name) => name.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to created_at ordering");
                SortColumn::default()
            }),
        }
    }

    fn sort_order(&self) -> SortOrder {
        self.order
            .as_deref()
            .map(SortOrder::parse_lenient)
            .unwrap_or_default()
    }
}

/// One row of `cleaned_data`
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CleanedRecord {
    pub id: i64,
    pub data_source: String,
    pub crypto_id: String,
    pub crypto_name: String,
    pub price_usd: f64,
    pub market_cap_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub change_24h_percent: Option<f64>,
    pub normalized_data: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordPage {
    pub request_id: Uuid,
    pub latency_ms: f64,
    pub total: i64,
    pub pagination: PageMetadata,
    pub data: Vec<CleanedRecord>,
}

fn lowered(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

pub async fn list_records(pool: &SqlitePool, query: &RecordQuery) -> Result<RecordPage> {
    let started = Instant::now();
    let request_id = Uuid::new_v4();

    let params = PageParams::new(query.limit, query.offset)?;
    let source = lowered(query.source.as_deref());
    let crypto_id = lowered(query.crypto_id.as_deref());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM cleaned_data
        WHERE (?1 IS NULL OR data_source = ?1) AND (?2 IS NULL OR crypto_id = ?2)
        "#,
    )
    .bind(&source)
    .bind(&crypto_id)
    .fetch_one(pool)
    .await?;

    // Column and direction come from closed enums, never from caller text
    let sql = format!(
        r#"
        SELECT id, data_source, crypto_id, crypto_name, price_usd, market_cap_usd,
               volume_24h_usd, change_24h_percent, normalized_data, created_at
        FROM cleaned_data
        WHERE (?1 IS NULL OR data_source = ?1) AND (?2 IS NULL OR crypto_id = ?2)
        ORDER BY {} {}, id {}
        LIMIT ?3 OFFSET ?4
        "#,
        query.sort_column().column(),
        query.sort_order(),
        query.sort_order()
    );

    let data = sqlx::query_as::<_, CleanedRecord>(&sql)
        .bind(&source)
        .bind(&crypto_id)
        .bind(params.limit)
        .bind(params.offset)
        .fetch_all(pool)
        .await?;

    let latency_ms = (started.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
    tracing::debug!(%request_id, total, returned = data.len(), latency_ms, "Listed records");

    Ok(RecordPage {
        request_id,
        latency_ms,
        total,
        pagination: PageMetadata::new(&params, total),
        data,
    })
}

/// Most recently loaded record for `crypto_id`, optionally from one source
pub async fn latest_record(
    pool: &SqlitePool,
    crypto_id: &str,
    source: Option<&str>,
) -> Result<CleanedRecord> {
    let crypto_id = crypto_id.trim().to_lowercase();
    let source = source.map(|s| s.trim().to_lowercase());

    let record = sqlx::query_as::<_, CleanedRecord>(
        r#"
        SELECT id, data_source, crypto_id, crypto_name, price_usd, market_cap_usd,
               volume_24h_usd, change_24h_percent, normalized_data, created_at
        FROM cleaned_data
        WHERE crypto_id = ?1 AND (?2 IS NULL OR data_source = ?2)
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(&crypto_id)
    .bind(&source)
    .fetch_optional(pool)
    .await?;

    record.ok_or_else(|| CoinflowError::not_found("Cryptocurrency", &crypto_id).into())
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SourceStats {
    pub source: String,
    pub total_records: i64,
    pub last_checkpoint: Option<i64>,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: RunRecord,
    pub duration_seconds: Option<f64>,
}

impl From<RunRecord> for RunSummary {
    fn from(run: RunRecord) -> Self {
        Self {
            duration_seconds: run.duration_seconds(),
            run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub total_cleaned_records: i64,
    pub total_raw_api_records: i64,
    pub total_raw_csv_records: i64,
    pub sources: Vec<SourceStats>,
    pub recent_runs: Vec<RunSummary>,
    pub uptime: String,
}

pub async fn pipeline_stats(pool: &SqlitePool) -> Result<PipelineStats> {
    let total_cleaned_records = count(pool, "cleaned_data").await?;
    let total_raw_api_records = count(pool, "raw_api_data").await?;
    let total_raw_csv_records = count(pool, "raw_csv_data").await?;

    let sources = sqlx::query_as::<_, SourceStats>(
        r#"
        SELECT c.data_source AS source,
               COUNT(c.id) AS total_records,
               k.last_processed_id AS last_checkpoint,
               k.last_processed_timestamp AS last_update
        FROM cleaned_data c
        LEFT JOIN etl_checkpoints k ON k.source = c.data_source
        GROUP BY c.data_source
        ORDER BY c.data_source
        "#,
    )
    .fetch_all(pool)
    .await?;

    let recent_runs = RunTracker::recent(pool, RECENT_RUNS_LIMIT)
        .await?
        .into_iter()
        .map(RunSummary::from)
        .collect();

    let first_started: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT started_at FROM etl_runs ORDER BY started_at ASC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(PipelineStats {
        total_cleaned_records,
        total_raw_api_records,
        total_raw_csv_records,
        sources,
        recent_runs,
        uptime: format_uptime(first_started, Utc::now()),
    })
}

async fn count(pool: &SqlitePool, table: &'static str) -> Result<i64> {
    let total = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// Time since the first run as `"{d}d {h}h {m}m"`, or `"N/A"` before any run
pub fn format_uptime(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(since) = since else {
        return "N/A".to_string();
    };
    let elapsed = (now - since).num_seconds().max(0);
    let days = elapsed / 86_400;
    let hours = (elapsed % 86_400) / 3_600;
    let minutes = (elapsed % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryStats {
    pub total_records: i64,
    pub last_successful_run: Option<DateTime<Utc>>,
    pub records_by_source: BTreeMap<String, i64>,
}

pub async fn summary(pool: &SqlitePool) -> Result<SummaryStats> {
    let total_records = count(pool, "cleaned_data").await?;

    let last_successful_run: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        SELECT ended_at FROM etl_runs
        WHERE success = 1 AND ended_at IS NOT NULL
        ORDER BY ended_at DESC
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await?;

    let by_source: Vec<(String, i64)> = sqlx::query_as(
        "SELECT data_source, COUNT(*) FROM cleaned_data GROUP BY data_source",
    )
    .fetch_all(pool)
    .await?;

    Ok(SummaryStats {
        total_records,
        last_successful_run,
        records_by_source: by_source.into_iter().collect(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    pub timestamp: DateTime<Utc>,
    pub last_run: Option<RunRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Database reachability and the latest run; never fails
pub async fn health(pool: &SqlitePool) -> HealthReport {
    let probe = async {
        db::health_check(pool).await?;
        let mut runs = RunTracker::recent(pool, 1).await?;
        Ok::<_, crate::error::IngestError>(runs.pop())
    };

    match probe.await {
        Ok(last_run) => HealthReport {
            status: "healthy",
            database: "connected",
            timestamp: Utc::now(),
            last_run,
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            HealthReport {
                status: "unhealthy",
                database: "disconnected",
                timestamp: Utc::now(),
                last_run: None,
                error: Some(e.to_string()),
            }
        }
    }
}
