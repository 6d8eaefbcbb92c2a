//! Storage seam for bucket persistence and history reads.
//!
//! The aggregation and baseline code talk to this trait, not to Postgres,
//! so a pipeline instance can run against an in-memory store in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use gammaflow_data::{BucketHistoryRow, FlowBucketRecord, FlowBucketRepository};

/// Durable store for 30-minute flow buckets.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Additively upserts the batch; must commit or fail as a whole so a
    /// retried batch never double-counts.
    async fn upsert_batch(&self, records: &[FlowBucketRecord]) -> Result<()>;

    /// Trailing per-day observations for one (symbol, session bucket),
    /// newest first, strictly before `before`.
    async fn bucket_history(
        &self,
        symbol: &str,
        bucket_minutes: i32,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<BucketHistoryRow>>;
}

#[async_trait]
impl BucketStore for FlowBucketRepository {
    async fn upsert_batch(&self, records: &[FlowBucketRecord]) -> Result<()> {
        FlowBucketRepository::upsert_batch(self, records).await
    }

    async fn bucket_history(
        &self,
        symbol: &str,
        bucket_minutes: i32,
        before: NaiveDate,
        limit: i64,
    ) -> Result<Vec<BucketHistoryRow>> {
        FlowBucketRepository::bucket_history(self, symbol, bucket_minutes, before, limit).await
    }
}
