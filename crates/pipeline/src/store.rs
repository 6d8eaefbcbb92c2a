//! Persistence seam for the orchestrator.
//!
//! The orchestrator writes through this trait so trigger handling is
//! testable without Postgres; the production implementation fans out to
//! the repository layer.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use gammaflow_data::{
    ExposureRecord, ExposureRepository, PhaseTransitionRecord, PhaseTransitionRepository,
    TrackedSymbolRepository, TriggerRecord, TriggerRepository,
};

/// Durable store for trigger fan-out artifacts.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Appends a trigger and, when present, its exposure snapshot.
    async fn persist_trigger(
        &self,
        trigger: &TriggerRecord,
        exposure: Option<&ExposureRecord>,
    ) -> Result<()>;

    /// Insert-or-increment into the permanent tracking list.
    async fn track_symbol(&self, symbol: &str, triggered_at: DateTime<Utc>) -> Result<()>;

    /// Appends a phase transition; high-priority ones also land in the
    /// alert table.
    async fn persist_transition(
        &self,
        record: &PhaseTransitionRecord,
        high_priority: bool,
    ) -> Result<()>;
}

/// Repository-backed implementation.
pub struct PgTriggerStore {
    triggers: TriggerRepository,
    exposures: ExposureRepository,
    tracked: TrackedSymbolRepository,
    phases: PhaseTransitionRepository,
}

impl PgTriggerStore {
    /// Builds the store over one connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            triggers: TriggerRepository::new(pool.clone()),
            exposures: ExposureRepository::new(pool.clone()),
            tracked: TrackedSymbolRepository::new(pool.clone()),
            phases: PhaseTransitionRepository::new(pool),
        }
    }
}

#[async_trait]
impl TriggerStore for PgTriggerStore {
    async fn persist_trigger(
        &self,
        trigger: &TriggerRecord,
        exposure: Option<&ExposureRecord>,
    ) -> Result<()> {
        self.triggers.insert(trigger).await?;
        if let Some(exposure) = exposure {
            self.exposures.insert(exposure).await?;
        }
        Ok(())
    }

    async fn track_symbol(&self, symbol: &str, triggered_at: DateTime<Utc>) -> Result<()> {
        self.tracked.record_trigger(symbol, triggered_at).await
    }

    async fn persist_transition(
        &self,
        record: &PhaseTransitionRecord,
        high_priority: bool,
    ) -> Result<()> {
        self.phases.insert(record).await?;
        if high_priority {
            self.phases.insert_alert(record).await?;
        }
        Ok(())
    }
}
