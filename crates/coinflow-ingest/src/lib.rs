//! Coinflow Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch ETL for cryptocurrency market data.
//!
//! # Supported Sources
//!
//! - **CoinPaprika**: `/tickers` quoted in USD
//! - **CoinGecko**: `/coins/markets` ordered by market cap
//! - **CSV**: a local file feed with `price`/`price_usd` style columns
//!
//! Each run extracts a batch per source, keeps the raw payloads, normalizes
//! them into [`UnifiedCryptoRecord`]s, loads the valid ones and advances a
//! per-source checkpoint. Runs are recorded in `etl_runs`.
//!
//! # Example
//!
//! ```no_run
//! use coinflow_ingest::{config::IngestConfig, db, EtlPipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     db::run_migrations(&pool).await?;
//!
//!     let mut pipeline = EtlPipeline::new(pool, &config.sources)?;
//!     let ok = pipeline.run(None).await;
//!     println!("run succeeded: {}", ok);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod queries;
pub mod runs;
pub mod schema;
pub mod sources;
pub mod storage;
pub mod transform;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{IngestError, Result};
pub use pipeline::{EtlPipeline, IngestStats, PipelineState};
pub use runs::{RunHandle, RunRecord, RunTracker};
pub use schema::{RecordDraft, UnifiedCryptoRecord};
pub use sources::{Extractor, RawItem, RetryPolicy, SourceKind};
pub use transform::{transform_batch, TransformOutcome};
