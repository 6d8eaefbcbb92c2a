//! Tracked-symbol repository.
//!
//! The tracking list grows append-only: a symbol that has triggered once
//! stays tracked forever and its trigger count is only ever incremented.
//! The upsert is a single atomic insert-or-increment so concurrent
//! orchestrator tasks cannot lose counts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::TrackedSymbolRecord;

#[derive(Debug, Clone)]
pub struct TrackedSymbolRepository {
    pool: PgPool,
}

impl TrackedSymbolRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the symbol or increments its trigger count.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn record_trigger(&self, symbol: &str, triggered_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracked_symbols (symbol, first_triggered, last_triggered, trigger_count)
            VALUES ($1, $2, $2, 1)
            ON CONFLICT (symbol) DO UPDATE
            SET trigger_count = tracked_symbols.trigger_count + 1,
                last_triggered = EXCLUDED.last_triggered
            "#,
        )
        .bind(symbol)
        .bind(triggered_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists every tracked symbol, most recently triggered first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn list(&self) -> Result<Vec<TrackedSymbolRecord>> {
        let records = sqlx::query_as::<_, TrackedSymbolRecord>(
            r#"
            SELECT symbol, first_triggered, last_triggered, trigger_count
            FROM tracked_symbols
            ORDER BY last_triggered DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Fetches a single tracked symbol.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn get(&self, symbol: &str) -> Result<Option<TrackedSymbolRecord>> {
        let record = sqlx::query_as::<_, TrackedSymbolRecord>(
            r#"
            SELECT symbol, first_triggered, last_triggered, trigger_count
            FROM tracked_symbols
            WHERE symbol = $1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }
}
