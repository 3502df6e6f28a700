//! End-to-end pipeline tests against mocked upstream APIs
//!
//! Every test runs against an in-memory SQLite database, wiremock servers
//! standing in for CoinPaprika and CoinGecko, and a temporary CSV file.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io::Write;
use std::path::Path;

use coinflow_ingest::config::SourcesConfig;
use coinflow_ingest::{db, CheckpointStore, EtlPipeline, PipelineState, RunTracker, SourceKind};
use serde_json::json;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CSV_FEED: &str = "id,name,price_usd,market_cap_usd,volume_24h_usd\n\
Bitcoin,Bitcoin,\"42,000.50\",\"800,000,000,000\",\n\
ethereum,Ethereum,2500.75,300000000000,15000000000\n\
broken,Broken,,,\n";

async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    pool
}

fn csv_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn sources_config(paprika: &MockServer, gecko: &MockServer, csv_path: &Path) -> SourcesConfig {
    SourcesConfig {
        csv_file_path: csv_path.to_path_buf(),
        batch_size: 5,
        coinpaprika_base_url: paprika.uri(),
        coingecko_base_url: gecko.uri(),
        http_timeout_secs: 5,
        rate_limit_cooldown_secs: 0,
        rate_limit_max_retries: 1,
    }
}

async fn mount_paprika_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/tickers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "btc-bitcoin",
                "name": "Bitcoin",
                "quotes": {"USD": {"price": 50000.0, "market_cap": 1.0e12, "volume_24h": 3.0e10, "percent_change_24h": 1.5}}
            },
            {"id": "no-price", "name": "No Price", "quotes": {"USD": {}}}
        ])))
        .mount(server)
        .await;
}

async fn mount_gecko_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "bitcoin",
                "name": "Bitcoin",
                "current_price": 49950.0,
                "market_cap": 990000000000u64,
                "total_volume": 31000000000u64,
                "price_change_percentage_24h": -0.4
            }
        ])))
        .mount(server)
        .await;
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[tokio::test]
async fn test_full_run_loads_every_source() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    mount_paprika_ok(&paprika).await;
    mount_gecko_ok(&gecko).await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(pipeline.run(None).await);
    assert_eq!(pipeline.state(), PipelineState::Succeeded);

    let stats = pipeline.last_stats();
    assert_eq!(stats.extracted, 6);
    assert_eq!(stats.loaded, 4);
    assert_eq!(stats.skipped, 2);

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM raw_api_data").await, 3);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM raw_csv_data").await, 3);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data").await, 4);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data WHERE price_usd <= 0").await, 0);
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM cleaned_data WHERE data_source = 'csv' AND crypto_id = 'bitcoin' AND price_usd = 42000.5").await,
        1
    );

    assert_eq!(CheckpointStore::get(&pool, "coinpaprika").await.unwrap(), 1);
    assert_eq!(CheckpointStore::get(&pool, "coingecko").await.unwrap(), 1);
    assert_eq!(CheckpointStore::get(&pool, "csv").await.unwrap(), 2);

    let runs = RunTracker::recent(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].success);
    assert_eq!(runs[0].records_processed, 4);
    assert_eq!(runs[0].source.as_deref(), Some("coinpaprika,coingecko,csv"));
    assert!(runs[0].ended_at.is_some());
    assert!(runs[0].error_message.is_none());
}

#[tokio::test]
async fn test_failure_at_second_source_keeps_first_and_skips_third() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    mount_paprika_ok(&paprika).await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&gecko)
        .await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(!pipeline.run(None).await);
    assert_eq!(pipeline.state(), PipelineState::Failed);

    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM cleaned_data WHERE data_source = 'coinpaprika'").await,
        1
    );
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data WHERE data_source <> 'coinpaprika'").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM raw_csv_data").await, 0);

    let checkpoints = CheckpointStore::list(&pool).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].source, "coinpaprika");

    let runs = RunTracker::recent(&pool, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].success);
    assert_eq!(runs[0].records_processed, 1);
    let message = runs[0].error_message.as_deref().unwrap();
    assert!(message.contains("coingecko"), "unexpected message: {}", message);
    assert!(message.contains("500"));
}

#[tokio::test]
async fn test_selected_sources_only() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&paprika)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&gecko)
        .await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(pipeline.run(Some(&[SourceKind::Csv])).await);

    let runs = RunTracker::recent(&pool, 10).await.unwrap();
    assert_eq!(runs[0].source.as_deref(), Some("csv"));
    assert_eq!(runs[0].records_processed, 2);
}

#[tokio::test]
async fn test_rate_limit_retried_once_then_succeeds() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tickers"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .expect(1)
        .mount(&paprika)
        .await;
    mount_paprika_ok(&paprika).await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(pipeline.run(Some(&[SourceKind::CoinPaprika])).await);
    assert_eq!(CheckpointStore::get(&pool, "coinpaprika").await.unwrap(), 1);
}

#[tokio::test]
async fn test_rate_limit_exhausted_fails_run() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/coins/markets"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&gecko)
        .await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(!pipeline.run(Some(&[SourceKind::CoinGecko])).await);

    let runs = RunTracker::recent(&pool, 1).await.unwrap();
    assert_eq!(
        runs[0].error_message.as_deref(),
        Some("coingecko rate limited after 2 attempts")
    );
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM raw_api_data").await, 0);
}

#[tokio::test]
async fn test_missing_csv_file_fails_after_api_sources() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    mount_paprika_ok(&paprika).await;
    mount_gecko_ok(&gecko).await;

    let config = sources_config(&paprika, &gecko, Path::new("/nonexistent/coinflow/feed.csv"));
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(!pipeline.run(None).await);

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data").await, 2);
    let runs = RunTracker::recent(&pool, 1).await.unwrap();
    assert_eq!(runs[0].records_processed, 2);
    assert!(runs[0].error_message.as_deref().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_repeated_runs_keep_one_checkpoint_per_source() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    for _ in 0..3 {
        assert!(pipeline.run(Some(&[SourceKind::Csv])).await);
    }

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM etl_checkpoints").await, 1);
    assert_eq!(CheckpointStore::get(&pool, "csv").await.unwrap(), 2);
    // No deduplication across runs
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data").await, 6);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM etl_runs").await, 3);
}

#[tokio::test]
async fn test_ingest_single_source_directly() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    mount_gecko_ok(&gecko).await;
    let feed = csv_file(CSV_FEED);

    let config = sources_config(&paprika, &gecko, feed.path());
    let pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let stats = pipeline
        .ingest_source(&mut conn, SourceKind::CoinGecko)
        .await
        .unwrap();
    drop(conn);

    assert_eq!(stats.extracted, 1);
    assert_eq!(stats.loaded, 1);
    assert_eq!(CheckpointStore::get(&pool, "coingecko").await.unwrap(), 1);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM etl_runs").await, 0);
}

#[tokio::test]
async fn test_empty_batch_still_checkpoints_zero() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    let feed = csv_file("id,name,price\n");

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(pipeline.run(Some(&[SourceKind::Csv])).await);

    let checkpoints = CheckpointStore::list(&pool).await.unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].last_processed_id, 0);
}

#[tokio::test]
async fn test_cleaned_insert_failure_rolls_back_and_fails_run() {
    let pool = memory_pool().await;
    let paprika = MockServer::start().await;
    let gecko = MockServer::start().await;
    let feed = csv_file(CSV_FEED);

    sqlx::query(
        "CREATE TRIGGER reject_ethereum BEFORE INSERT ON cleaned_data \
         WHEN NEW.crypto_id = 'ethereum' \
         BEGIN SELECT RAISE(ABORT, 'ethereum rejected'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let config = sources_config(&paprika, &gecko, feed.path());
    let mut pipeline = EtlPipeline::new(pool.clone(), &config).unwrap();

    assert!(!pipeline.run(Some(&[SourceKind::Csv])).await);
    assert_eq!(pipeline.state(), PipelineState::Failed);

    // bitcoin was inserted before ethereum in the same transaction
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM cleaned_data").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM raw_csv_data").await, 3);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM etl_checkpoints").await, 0);

    let runs = RunTracker::recent(&pool, 1).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(!runs[0].success);
    assert!(runs[0].ended_at.is_some());
    assert_eq!(runs[0].records_processed, 0);
    let message = runs[0].error_message.as_deref().unwrap();
    assert!(message.starts_with("Database error"), "unexpected message: {}", message);
    assert!(message.contains("ethereum rejected"));
}
