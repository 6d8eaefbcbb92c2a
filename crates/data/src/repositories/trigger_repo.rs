//! Trigger repository. Append-only.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::TriggerRecord;

#[derive(Debug, Clone)]
pub struct TriggerRepository {
    pool: PgPool,
}

impl TriggerRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a trigger row.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, record: &TriggerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO triggers
                (symbol, trigger_ts, ratio_observed, notional_observed, baseline_notional,
                 contract_count, print_count, bucket_minutes, confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.trigger_ts)
        .bind(record.ratio_observed)
        .bind(record.notional_observed)
        .bind(record.baseline_notional)
        .bind(record.contract_count)
        .bind(record.print_count)
        .bind(record.bucket_minutes)
        .bind(record.confidence)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Queries triggers for a symbol within a time range, oldest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn query_by_time_range(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TriggerRecord>> {
        let records = sqlx::query_as::<_, TriggerRecord>(
            r#"
            SELECT symbol, trigger_ts, ratio_observed, notional_observed, baseline_notional,
                   contract_count, print_count, bucket_minutes, confidence
            FROM triggers
            WHERE symbol = $1 AND trigger_ts >= $2 AND trigger_ts <= $3
            ORDER BY trigger_ts ASC
            "#,
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
