//! Flow bucket repository.
//!
//! Stores the 30-minute per-symbol accumulators that feed baseline
//! estimation. Writes are additive upserts so a retried batch after a
//! partial in-memory flush never overwrites previously stored totals.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::PgPool;

use crate::models::{BucketHistoryRow, FlowBucketRecord};

/// Repository for flow bucket operations.
#[derive(Debug, Clone)]
pub struct FlowBucketRepository {
    pool: PgPool,
}

impl FlowBucketRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Additively upserts a batch of bucket accumulators.
    ///
    /// The whole batch commits in a single transaction: either every row
    /// lands or none do, so the caller can safely retry the entire batch
    /// after a failure without double counting.
    ///
    /// # Errors
    /// Returns an error if the database transaction fails.
    pub async fn upsert_batch(&self, records: &[FlowBucketRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO flow_buckets
                    (symbol, trade_date, bucket_minutes, print_count, notional_sum, unique_contracts)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (symbol, trade_date, bucket_minutes) DO UPDATE
                SET print_count = flow_buckets.print_count + EXCLUDED.print_count,
                    notional_sum = flow_buckets.notional_sum + EXCLUDED.notional_sum,
                    unique_contracts = flow_buckets.unique_contracts + EXCLUDED.unique_contracts
                "#,
            )
            .bind(&record.symbol)
            .bind(record.trade_date)
            .bind(record.bucket_minutes)
            .bind(record.print_count)
            .bind(record.notional_sum)
            .bind(record.unique_contracts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Queries the trailing bucket history for one (symbol, session bucket),
    /// newest first, up to `limit` trading days strictly before `before`.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn bucket_history(
        &self,
        symbol: &str,
        bucket_minutes: i32,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<BucketHistoryRow>> {
        let rows = sqlx::query_as::<_, BucketHistoryRow>(
            r#"
            SELECT trade_date, notional_sum, print_count
            FROM flow_buckets
            WHERE symbol = $1 AND bucket_minutes = $2 AND trade_date < $3
            ORDER BY trade_date DESC
            LIMIT $4
            "#,
        )
        .bind(symbol)
        .bind(bucket_minutes)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Deletes bucket rows older than the retention horizon.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn delete_before(&self, before: NaiveDate) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM flow_buckets
            WHERE trade_date < $1
            "#,
        )
        .bind(before)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
