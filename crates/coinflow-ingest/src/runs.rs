//! Pipeline run bookkeeping in `etl_runs`

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteExecutor;

use crate::db::timestamp_text;
use crate::error::Result;

/// Identifies the row created by [`RunTracker::begin`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHandle(Option<i64>);

impl RunHandle {
    /// A handle that refers to no run; finishing it does nothing
    pub fn unset() -> Self {
        Self(None)
    }

    pub fn id(&self) -> Option<i64> {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub records_processed: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub source: Option<String>,
}

impl RunRecord {
    /// Wall-clock duration, once the run has ended
    pub fn duration_seconds(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

pub struct RunTracker;

impl RunTracker {
    pub async fn begin<'e, E>(executor: E, label: &str) -> Result<RunHandle>
    where
        E: SqliteExecutor<'e>,
    {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO etl_runs (started_at, records_processed, success, source)
            VALUES (?1, 0, 0, ?2)
            RETURNING id
            "#,
        )
        .bind(timestamp_text(Utc::now()))
        .bind(label)
        .fetch_one(executor)
        .await?;

        tracing::info!(run_id = id, sources = label, "Run started");

        Ok(RunHandle(Some(id)))
    }

    /// Record the outcome of a run
    ///
    /// An unset handle, or one whose row no longer exists, is logged and ignored.
    pub async fn finish<'e, E>(
        executor: E,
        handle: RunHandle,
        records_processed: i64,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        let Some(id) = handle.id() else {
            tracing::warn!("Finish called without a started run");
            return Ok(());
        };

        let result = sqlx::query(
            r#"
            UPDATE etl_runs
            SET ended_at = ?1, records_processed = ?2, success = ?3, error_message = ?4
            WHERE id = ?5
            "#,
        )
        .bind(timestamp_text(Utc::now()))
        .bind(records_processed)
        .bind(success)
        .bind(error_message)
        .bind(id)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(run_id = id, "Finish called for a run that does not exist");
        } else {
            tracing::info!(run_id = id, records_processed, success, "Run finished");
        }

        Ok(())
    }

    pub async fn get<'e, E>(executor: E, id: i64) -> Result<Option<RunRecord>>
    where
        E: SqliteExecutor<'e>,
    {
        let run = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, started_at, ended_at, records_processed, success, error_message, source
            FROM etl_runs WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(run)
    }

    /// Most recent runs first
    pub async fn recent<'e, E>(executor: E, limit: i64) -> Result<Vec<RunRecord>>
    where
        E: SqliteExecutor<'e>,
    {
        let runs = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, started_at, ended_at, records_processed, success, error_message, source
            FROM etl_runs
            ORDER BY started_at DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(executor)
        .await?;

        Ok(runs)
    }
}
