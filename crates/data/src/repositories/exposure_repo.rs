//! Exposure snapshot repository. Append-only.

use anyhow::Result;
use sqlx::PgPool;

use crate::models::ExposureRecord;

#[derive(Debug, Clone)]
pub struct ExposureRepository {
    pool: PgPool,
}

impl ExposureRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends an exposure snapshot row.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, record: &ExposureRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exposure_snapshots
                (symbol, computed_at, spot_price, net_gamma_exposure, net_delta_exposure,
                 net_vanna_exposure, net_charm, call_wall_strike, put_wall_strike,
                 gamma_flip_level, contracts_analyzed, total_call_oi, total_put_oi)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.computed_at)
        .bind(record.spot_price)
        .bind(record.net_gamma_exposure)
        .bind(record.net_delta_exposure)
        .bind(record.net_vanna_exposure)
        .bind(record.net_charm)
        .bind(record.call_wall_strike)
        .bind(record.put_wall_strike)
        .bind(record.gamma_flip_level)
        .bind(record.contracts_analyzed)
        .bind(record.total_call_oi)
        .bind(record.total_put_oi)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets the most recent exposure snapshot for a symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get_latest(&self, symbol: &str) -> Result<Option<ExposureRecord>> {
        let record = sqlx::query_as::<_, ExposureRecord>(
            r#"
            SELECT symbol, computed_at, spot_price, net_gamma_exposure, net_delta_exposure,
                   net_vanna_exposure, net_charm, call_wall_strike, put_wall_strike,
                   gamma_flip_level, contracts_analyzed, total_call_oi, total_put_oi
            FROM exposure_snapshots
            WHERE symbol = $1
            ORDER BY computed_at DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
