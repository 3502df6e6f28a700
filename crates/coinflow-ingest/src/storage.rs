//! Raw and cleaned record persistence
//!
//! These functions only issue statements; the caller owns the transaction.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db::timestamp_text;
use crate::error::Result;
use crate::schema::UnifiedCryptoRecord;
use crate::sources::{RawItem, SourceKind};

/// Append one raw row per extracted item
///
/// API items go to `raw_api_data` tagged with their source; CSV rows go to
/// `raw_csv_data`.
pub async fn insert_raw_batch(
    conn: &mut SqliteConnection,
    kind: SourceKind,
    items: &[RawItem],
) -> Result<u64> {
    let captured_at = timestamp_text(Utc::now());
    let mut inserted = 0;

    for item in items {
        let payload = sqlx::types::Json(item);
        let result = if kind.is_api() {
            sqlx::query(
                r#"
                INSERT INTO raw_api_data (source, raw_data, created_at)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(kind.as_str())
            .bind(payload)
            .bind(&captured_at)
            .execute(&mut *conn)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO raw_csv_data (raw_data, created_at)
                VALUES (?1, ?2)
                "#,
            )
            .bind(payload)
            .bind(&captured_at)
            .execute(&mut *conn)
            .await?
        };
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Insert validated records into `cleaned_data`, returning how many were written
pub async fn insert_cleaned(
    conn: &mut SqliteConnection,
    records: &[UnifiedCryptoRecord],
) -> Result<u64> {
    let created_at = timestamp_text(Utc::now());
    let mut inserted = 0;

    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO cleaned_data (
                data_source, crypto_id, crypto_name, price_usd, market_cap_usd,
                volume_24h_usd, change_24h_percent, normalized_data, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(record.source().as_str())
        .bind(record.crypto_id())
        .bind(record.crypto_name())
        .bind(record.price_usd())
        .bind(record.market_cap_usd())
        .bind(record.volume_24h_usd())
        .bind(record.change_24h_percent())
        .bind(sqlx::types::Json(record.normalized_json()))
        .bind(&created_at)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::schema::RecordDraft;
    use serde_json::json;
    use sqlx::{Connection, Row};

    fn item(value: serde_json::Value) -> RawItem {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_raw_rows_are_routed_by_source() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let api = vec![item(json!({"id": "bitcoin"})), item(json!({"id": "ethereum"}))];
        let csv = vec![item(json!({"id": "solana", "price": "100"}))];

        assert_eq!(insert_raw_batch(&mut conn, SourceKind::CoinGecko, &api).await.unwrap(), 2);
        assert_eq!(insert_raw_batch(&mut conn, SourceKind::Csv, &csv).await.unwrap(), 1);

        let row = sqlx::query("SELECT source, raw_data FROM raw_api_data ORDER BY id LIMIT 1")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("source"), "coingecko");
        let raw: serde_json::Value = serde_json::from_str(&row.get::<String, _>("raw_data")).unwrap();
        assert_eq!(raw["id"], "bitcoin");

        let csv_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_csv_data")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(csv_count, 1);
    }

    #[tokio::test]
    async fn test_cleaned_rows_roll_back_with_transaction() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let record = UnifiedCryptoRecord::new(RecordDraft::new(
            SourceKind::CoinPaprika,
            "btc-bitcoin",
            "Bitcoin",
            50000.0,
        ))
        .unwrap();

        {
            let mut tx = conn.begin().await.unwrap();
            insert_cleaned(&mut tx, std::slice::from_ref(&record)).await.unwrap();
            tx.rollback().await.unwrap();
        }

        let mut tx = conn.begin().await.unwrap();
        assert_eq!(insert_cleaned(&mut tx, &[record]).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let row = sqlx::query("SELECT data_source, crypto_id, price_usd, normalized_data FROM cleaned_data")
            .fetch_all(&mut *conn)
            .await
            .unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].get::<String, _>("data_source"), "coinpaprika");
        assert_eq!(row[0].get::<f64, _>("price_usd"), 50000.0);
        let normalized: serde_json::Value =
            serde_json::from_str(&row[0].get::<String, _>("normalized_data")).unwrap();
        assert_eq!(normalized["crypto_id"], "btc-bitcoin");
    }
}
