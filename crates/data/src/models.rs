//! Row types for the pipeline's tables.
//!
//! Conversions from the in-memory event types happen here so repositories
//! stay thin over the SQL.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gammaflow_core::{ExposureSnapshot, PhaseTransition, Trigger};

/// One 30-minute per-symbol accumulator row, additively upserted.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FlowBucketRecord {
    pub symbol: String,
    pub trade_date: NaiveDate,
    /// Bucket start, minutes since midnight Eastern.
    pub bucket_minutes: i32,
    pub print_count: i64,
    pub notional_sum: Decimal,
    pub unique_contracts: i64,
}

/// Historical bucket observation used by the baseline estimator.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BucketHistoryRow {
    pub trade_date: NaiveDate,
    pub notional_sum: Decimal,
    pub print_count: i64,
}

/// A persisted unusual-activity trigger. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TriggerRecord {
    pub symbol: String,
    pub trigger_ts: DateTime<Utc>,
    pub ratio_observed: f64,
    pub notional_observed: Decimal,
    pub baseline_notional: f64,
    pub contract_count: i64,
    pub print_count: i64,
    pub bucket_minutes: i32,
    pub confidence: f64,
}

impl From<&Trigger> for TriggerRecord {
    fn from(t: &Trigger) -> Self {
        Self {
            symbol: t.symbol.clone(),
            trigger_ts: t.trigger_ts,
            ratio_observed: t.ratio_observed,
            notional_observed: t.notional_observed,
            baseline_notional: t.baseline_notional,
            contract_count: t.contract_count as i64,
            print_count: t.print_count as i64,
            bucket_minutes: t.bucket_minutes as i32,
            confidence: t.confidence,
        }
    }
}

/// A persisted dealer-exposure snapshot. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ExposureRecord {
    pub symbol: String,
    pub computed_at: DateTime<Utc>,
    pub spot_price: f64,
    pub net_gamma_exposure: f64,
    pub net_delta_exposure: f64,
    pub net_vanna_exposure: f64,
    pub net_charm: f64,
    pub call_wall_strike: Option<f64>,
    pub put_wall_strike: Option<f64>,
    pub gamma_flip_level: Option<f64>,
    pub contracts_analyzed: i64,
    pub total_call_oi: i64,
    pub total_put_oi: i64,
}

impl From<&ExposureSnapshot> for ExposureRecord {
    fn from(s: &ExposureSnapshot) -> Self {
        Self {
            symbol: s.symbol.clone(),
            computed_at: s.computed_at,
            spot_price: s.spot_price,
            net_gamma_exposure: s.net_gamma_exposure,
            net_delta_exposure: s.net_delta_exposure,
            net_vanna_exposure: s.net_vanna_exposure,
            net_charm: s.net_charm,
            call_wall_strike: s.call_wall_strike,
            put_wall_strike: s.put_wall_strike,
            gamma_flip_level: s.gamma_flip_level,
            contracts_analyzed: s.contracts_analyzed as i64,
            total_call_oi: s.total_call_oi as i64,
            total_put_oi: s.total_put_oi as i64,
        }
    }
}

/// A persisted phase transition. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhaseTransitionRecord {
    pub symbol: String,
    pub from_phase: String,
    pub to_phase: String,
    pub score: f64,
    pub confidence: f64,
    /// Sub-signal name/score pairs of the winning detector.
    pub contributing_factors: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl From<&PhaseTransition> for PhaseTransitionRecord {
    fn from(t: &PhaseTransition) -> Self {
        Self {
            symbol: t.symbol.clone(),
            from_phase: t.from_phase.to_string(),
            to_phase: t.to_phase.to_string(),
            score: t.score,
            confidence: t.confidence,
            contributing_factors: serde_json::to_value(&t.contributing_factors)
                .unwrap_or(serde_json::Value::Null),
            occurred_at: t.timestamp,
        }
    }
}

/// Permanent tracking-list entry; trigger_count only ever grows.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedSymbolRecord {
    pub symbol: String,
    pub first_triggered: DateTime<Utc>,
    pub last_triggered: DateTime<Utc>,
    pub trigger_count: i64,
}
