//! Per-source extraction cursor
//!
//! One row per source in `etl_checkpoints`. Updates are a single upsert keyed
//! on the unique `source` column, so repeated updates never add rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteExecutor;

use crate::db::timestamp_text;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Checkpoint {
    pub source: String,
    pub last_processed_id: i64,
    pub last_processed_timestamp: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

pub struct CheckpointStore;

impl CheckpointStore {
    /// Cursor for `source`, or 0 when none has been recorded
    pub async fn get<'e, E>(executor: E, source: &str) -> Result<i64>
    where
        E: SqliteExecutor<'e>,
    {
        let cursor: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT last_processed_id FROM etl_checkpoints WHERE source = ?1
            "#,
        )
        .bind(source)
        .fetch_optional(executor)
        .await?;

        Ok(cursor.unwrap_or(0))
    }

    /// Create or overwrite the cursor for `source`
    pub async fn update<'e, E>(executor: E, source: &str, cursor: i64) -> Result<()>
    where
        E: SqliteExecutor<'e>,
    {
        let now = timestamp_text(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO etl_checkpoints (source, last_processed_id, last_processed_timestamp, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(source) DO UPDATE SET
                last_processed_id = excluded.last_processed_id,
                last_processed_timestamp = excluded.last_processed_timestamp,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source)
        .bind(cursor)
        .bind(&now)
        .execute(executor)
        .await?;

        tracing::debug!(source, cursor, "Checkpoint updated");

        Ok(())
    }

    pub async fn list<'e, E>(executor: E) -> Result<Vec<Checkpoint>>
    where
        E: SqliteExecutor<'e>,
    {
        let checkpoints = sqlx::query_as::<_, Checkpoint>(
            r#"
            SELECT source, last_processed_id, last_processed_timestamp, updated_at
            FROM etl_checkpoints
            ORDER BY source
            "#,
        )
        .fetch_all(executor)
        .await?;

        Ok(checkpoints)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn test_unknown_source_is_zero() {
        let pool = memory_pool().await;
        assert_eq!(CheckpointStore::get(&pool, "unknown-source").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_is_an_upsert() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        CheckpointStore::update(&mut *conn, "x", 100).await.unwrap();
        CheckpointStore::update(&mut *conn, "x", 200).await.unwrap();

        assert_eq!(CheckpointStore::get(&mut *conn, "x").await.unwrap(), 200);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM etl_checkpoints WHERE source = 'x'")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_repeated_updates_keep_one_row_per_source() {
        let pool = memory_pool().await;

        for cursor in 1..=5 {
            CheckpointStore::update(&pool, "coingecko", cursor).await.unwrap();
            CheckpointStore::update(&pool, "csv", cursor * 10).await.unwrap();
        }

        let all = CheckpointStore::list(&pool).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source, "coingecko");
        assert_eq!(all[0].last_processed_id, 5);
        assert_eq!(all[1].source, "csv");
        assert_eq!(all[1].last_processed_id, 50);
        assert!(all[1].last_processed_timestamp.is_some());
    }
}
