//! Phase transition repository.
//!
//! Ordinary transitions and high-priority alerts land in separate
//! append-only tables; a transition that qualifies as an alert is written
//! to both.

use anyhow::Result;
use sqlx::PgPool;

use crate::models::PhaseTransitionRecord;

#[derive(Debug, Clone)]
pub struct PhaseTransitionRepository {
    pool: PgPool,
}

impl PhaseTransitionRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a phase transition row.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert(&self, record: &PhaseTransitionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO phase_transitions
                (symbol, from_phase, to_phase, score, confidence, contributing_factors, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.symbol)
        .bind(&record.from_phase)
        .bind(&record.to_phase)
        .bind(record.score)
        .bind(record.confidence)
        .bind(&record.contributing_factors)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends a high-priority alert row.
    ///
    /// # Errors
    /// Returns an error if the database operation fails.
    pub async fn insert_alert(&self, record: &PhaseTransitionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO phase_alerts
                (symbol, from_phase, to_phase, score, confidence, contributing_factors, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.symbol)
        .bind(&record.from_phase)
        .bind(&record.to_phase)
        .bind(record.score)
        .bind(record.confidence)
        .bind(&record.contributing_factors)
        .bind(record.occurred_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Queries recent transitions for a symbol, newest first.
    ///
    /// # Errors
    /// Returns an error if the database query fails.
    pub async fn recent_for_symbol(
        &self,
        symbol: &str,
        limit: i64,
    ) -> Result<Vec<PhaseTransitionRecord>> {
        let records = sqlx::query_as::<_, PhaseTransitionRecord>(
            r#"
            SELECT symbol, from_phase, to_phase, score, confidence, contributing_factors, occurred_at
            FROM phase_transitions
            WHERE symbol = $1
            ORDER BY occurred_at DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}
