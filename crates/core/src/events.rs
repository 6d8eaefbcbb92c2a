//! Events flowing between pipeline stages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unusual-activity trigger emitted by the anomaly detector.
///
/// Immutable once constructed; one trigger may fan out into an exposure
/// snapshot and a phase transition downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub symbol: String,
    pub trigger_ts: DateTime<Utc>,
    /// Observed notional over baseline expectation.
    pub ratio_observed: f64,
    pub notional_observed: Decimal,
    pub baseline_notional: f64,
    /// Distinct contracts traded inside the window.
    pub contract_count: u64,
    pub print_count: u64,
    /// Session bucket (minutes since midnight Eastern) the trigger fell in.
    pub bucket_minutes: u32,
    /// Confidence inherited from the baseline source.
    pub confidence: f64,
}

/// Dealer-perspective exposure metrics aggregated across one chain snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposureSnapshot {
    pub symbol: String,
    pub spot_price: f64,
    /// Net gamma exposure, dollars per 1% spot move.
    pub net_gamma_exposure: f64,
    /// Net delta exposure in shares.
    pub net_delta_exposure: f64,
    pub net_vanna_exposure: f64,
    pub net_charm: f64,
    /// Strike carrying the most call open interest.
    pub call_wall_strike: Option<f64>,
    /// Strike carrying the most put open interest.
    pub put_wall_strike: Option<f64>,
    /// Spot level where cumulative dealer gamma changes sign, if any.
    pub gamma_flip_level: Option<f64>,
    pub contracts_analyzed: u64,
    pub total_call_oi: u64,
    pub total_put_oi: u64,
    pub computed_at: DateTime<Utc>,
}

/// Behavioral phase of a tracked symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    None,
    Setup,
    Acceleration,
    Reversal,
}

impl Phase {
    /// Valid successor phases along the classification graph.
    #[must_use]
    pub fn valid_successors(self) -> &'static [Phase] {
        match self {
            Self::None => &[Phase::Setup],
            Self::Setup => &[Phase::Acceleration, Phase::Reversal],
            Self::Acceleration => &[Phase::Reversal],
            Self::Reversal => &[Phase::Setup],
        }
    }

    /// Returns true when `next` is reachable from `self` in one step.
    #[must_use]
    pub fn can_transition_to(self, next: Phase) -> bool {
        self.valid_successors().contains(&next)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Setup => "setup",
            Self::Acceleration => "acceleration",
            Self::Reversal => "reversal",
        };
        write!(f, "{name}")
    }
}

/// A validated phase transition, delivered at-most-once to the downstream
/// consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub symbol: String,
    pub from_phase: Phase,
    pub to_phase: Phase,
    /// Winning detector score.
    pub score: f64,
    /// Sub-signal name and score pairs behind the winning detector.
    pub contributing_factors: Vec<(String, f64)>,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

impl PhaseTransition {
    /// High-priority transitions are alerted separately from ordinary
    /// transition storage.
    #[must_use]
    pub fn is_high_priority(&self, alert_confidence: f64) -> bool {
        self.confidence >= alert_confidence
    }
}
