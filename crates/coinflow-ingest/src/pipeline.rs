//! ETL orchestration
//!
//! A run walks the selected sources in fixed order (CoinPaprika, CoinGecko,
//! CSV). For each source:
//!
//! 1. Extract a batch
//! 2. Store every raw item (own transaction)
//! 3. Transform, skipping invalid items
//! 4. Store the valid records (own transaction)
//! 5. After that commit, set the source checkpoint to the number loaded
//!
//! The first source-level failure rolls back the in-flight transaction and
//! stops the run. Sources that already finished stay committed. The run row is
//! finalized on every path.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Connection, SqliteConnection, SqlitePool};
use tracing::Instrument;

use crate::checkpoint::CheckpointStore;
use crate::config::SourcesConfig;
use crate::error::{IngestError, Result};
use crate::runs::{RunHandle, RunTracker};
use crate::sources::{Extractor, SourceKind};
use crate::storage;
use crate::transform::transform_batch;

/// Where a pipeline is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running(SourceKind),
    Finalizing,
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Idle => f.write_str("idle"),
            PipelineState::Running(kind) => write!(f, "running({})", kind),
            PipelineState::Finalizing => f.write_str("finalizing"),
            PipelineState::Succeeded => f.write_str("succeeded"),
            PipelineState::Failed => f.write_str("failed"),
        }
    }
}

/// Counters for one source, or summed over a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestStats {
    /// Items returned by the extractor
    pub extracted: i64,
    /// Raw rows written
    pub raw_stored: i64,
    /// Cleaned rows written
    pub loaded: i64,
    /// Items dropped by validation
    pub skipped: i64,
    pub duration_secs: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IngestStats {
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
        if let (Some(start), Some(end)) = (self.started_at, self.completed_at) {
            self.duration_secs = (end - start).num_milliseconds() as f64 / 1000.0;
        }
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            extracted: self.extracted + other.extracted,
            raw_stored: self.raw_stored + other.raw_stored,
            loaded: self.loaded + other.loaded,
            skipped: self.skipped + other.skipped,
            duration_secs: self.duration_secs + other.duration_secs,
            started_at: self.started_at.or(other.started_at),
            completed_at: other.completed_at.or(self.completed_at),
        }
    }

    /// Share of extracted items that were loaded, as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.extracted > 0 {
            (self.loaded as f64 / self.extracted as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn records_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.loaded as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}

/// Sequential, checkpointed ETL over the configured sources
pub struct EtlPipeline {
    pool: SqlitePool,
    extractors: Vec<Extractor>,
    batch_size: u32,
    state: PipelineState,
    last_stats: IngestStats,
}

impl EtlPipeline {
    pub fn new(pool: SqlitePool, config: &SourcesConfig) -> Result<Self> {
        let extractors = SourceKind::ALL
            .into_iter()
            .map(|kind| Extractor::for_kind(kind, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            pool,
            extractors,
            batch_size: config.batch_size,
            state: PipelineState::Idle,
            last_stats: IngestStats::default(),
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Totals of the most recent run
    pub fn last_stats(&self) -> &IngestStats {
        &self.last_stats
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::debug!(from = %self.state, to = %next, "Pipeline state change");
        self.state = next;
    }

    fn extractor(&self, kind: SourceKind) -> Result<&Extractor> {
        self.extractors
            .iter()
            .find(|e| e.kind() == kind)
            .ok_or_else(|| IngestError::config(format!("no extractor configured for {}", kind)))
    }

    /// Run the pipeline over `sources`, or every source when `None`
    ///
    /// Returns whether every selected source completed. Errors are logged and
    /// recorded on the run row rather than returned.
    pub async fn run(&mut self, sources: Option<&[SourceKind]>) -> bool {
        let selected: Vec<SourceKind> = SourceKind::ALL
            .into_iter()
            .filter(|kind| sources.map_or(true, |wanted| wanted.contains(kind)))
            .collect();
        let label = selected
            .iter()
            .map(SourceKind::as_str)
            .collect::<Vec<_>>()
            .join(",");

        self.last_stats = IngestStats::new();

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Could not acquire a database connection");
                self.transition(PipelineState::Failed);
                return false;
            }
        };

        let handle = match RunTracker::begin(&mut *conn, &label).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(error = %e, "Could not record run start");
                self.transition(PipelineState::Failed);
                return false;
            }
        };
        let run_id = handle.id().unwrap_or_default();

        let mut totals = IngestStats::new();
        let mut failure: Option<IngestError> = None;

        for kind in selected {
            self.transition(PipelineState::Running(kind));
            let span = tracing::info_span!("ingest", run_id, source = %kind);

            match self.ingest_source(&mut conn, kind).instrument(span).await {
                Ok(stats) => totals = totals.merge(stats),
                Err(e) => {
                    tracing::error!(run_id, source = %kind, error = %e, "Source ingestion failed, aborting run");
                    failure = Some(e);
                    break;
                }
            }
        }

        self.transition(PipelineState::Finalizing);
        totals.complete();

        let success = failure.is_none();
        let message = failure.as_ref().map(ToString::to_string);
        self.finish(&mut conn, handle, totals.loaded, success, message.as_deref())
            .await;

        tracing::info!(
            run_id,
            success,
            loaded = totals.loaded,
            skipped = totals.skipped,
            duration_secs = totals.duration_secs,
            success_rate = format!("{:.1}%", totals.success_rate()),
            records_per_second = totals.records_per_second(),
            "Pipeline run complete"
        );

        self.last_stats = totals;
        self.transition(if success {
            PipelineState::Succeeded
        } else {
            PipelineState::Failed
        });

        success
    }

    async fn finish(
        &self,
        conn: &mut SqliteConnection,
        handle: RunHandle,
        loaded: i64,
        success: bool,
        message: Option<&str>,
    ) {
        if let Err(e) = RunTracker::finish(conn, handle, loaded, success, message).await {
            tracing::error!(run_id = ?handle.id(), error = %e, "Could not finalize run");
        }
    }

    /// Extract, store, transform, load and checkpoint one source
    ///
    /// Usable on its own to retry a single source after a failed run.
    pub async fn ingest_source(
        &self,
        conn: &mut SqliteConnection,
        kind: SourceKind,
    ) -> Result<IngestStats> {
        let mut stats = IngestStats::new();

        let items = self.extractor(kind)?.fetch(self.batch_size).await?;
        stats.extracted = items.len() as i64;
        tracing::info!(extracted = stats.extracted, "Extracted batch");

        let mut tx = conn.begin().await?;
        match storage::insert_raw_batch(&mut tx, kind, &items).await {
            Ok(n) => stats.raw_stored = n as i64,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        }
        tx.commit().await?;

        let outcome = transform_batch(kind, &items);
        stats.skipped = outcome.errors as i64;

        let mut tx = conn.begin().await?;
        match storage::insert_cleaned(&mut tx, &outcome.records).await {
            Ok(n) => stats.loaded = n as i64,
            Err(e) => {
                rollback(tx).await;
                return Err(e);
            }
        }
        tx.commit().await?;

        CheckpointStore::update(&mut *conn, kind.as_str(), stats.loaded).await?;

        stats.complete();
        tracing::info!(
            raw_stored = stats.raw_stored,
            loaded = stats.loaded,
            skipped = stats.skipped,
            "Source ingested"
        );

        Ok(stats)
    }
}

async fn rollback(tx: sqlx::Transaction<'_, sqlx::Sqlite>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Rollback failed");
    }
}
