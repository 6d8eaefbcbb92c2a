//! Phase state machine.
//!
//! One `PhaseState` per symbol, mutated only here. Evaluations are
//! serialized behind the engine's lock; a proposed jump along an invalid
//! edge is logged and discarded with state unchanged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gammaflow_core::{Phase, PhaseConfig, PhaseTransition};

use crate::detectors::{DetectorScore, PhaseDetector};
use crate::inputs::PhaseInputs;

/// Transitions retained per symbol.
const HISTORY_LIMIT: usize = 50;

/// Long-lived classification state for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseState {
    pub symbol: String,
    pub current_phase: Phase,
    pub phase_score: f64,
    pub phase_start_ts: Option<DateTime<Utc>>,
    pub transition_history: Vec<PhaseTransition>,
}

impl PhaseState {
    fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            current_phase: Phase::None,
            phase_score: 0.0,
            phase_start_ts: None,
            transition_history: Vec::new(),
        }
    }
}

/// Per-symbol phase classifier.
///
/// Transitions are delivered at-most-once, best-effort on the optional
/// notification channel; a full or closed channel never blocks or rolls
/// back a transition.
pub struct PhaseEngine {
    config: PhaseConfig,
    states: Mutex<HashMap<String, PhaseState>>,
    transition_tx: Option<mpsc::Sender<PhaseTransition>>,
    transitions: AtomicU64,
    alerts: AtomicU64,
    rejected: AtomicU64,
}

impl PhaseEngine {
    /// Creates an engine with no notification channel.
    #[must_use]
    pub fn new(config: PhaseConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
            transition_tx: None,
            transitions: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Sets the downstream transition channel.
    #[must_use]
    pub fn with_transition_channel(mut self, tx: mpsc::Sender<PhaseTransition>) -> Self {
        self.transition_tx = Some(tx);
        self
    }

    /// Evaluates a symbol against one inputs snapshot.
    ///
    /// Runs all three detectors, takes the dominant triggered one, and
    /// fires a transition when its phase is a valid successor of the
    /// current phase. Returns the transition when one fired.
    pub fn evaluate(
        &self,
        symbol: &str,
        inputs: &PhaseInputs,
        now: DateTime<Utc>,
    ) -> Option<PhaseTransition> {
        let dominant = dominant_detector(inputs)?;

        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let state = states
            .entry(symbol.to_string())
            .or_insert_with(|| PhaseState::new(symbol));

        let proposed = dominant.phase;
        if state.current_phase == proposed {
            // Same phase: refresh the score, nothing fires.
            state.phase_score = dominant.score;
            return None;
        }

        if !state.current_phase.can_transition_to(proposed) {
            warn!(
                symbol,
                from = %state.current_phase,
                to = %proposed,
                score = dominant.score,
                "Discarding invalid phase transition"
            );
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        let transition = PhaseTransition {
            symbol: symbol.to_string(),
            from_phase: state.current_phase,
            to_phase: proposed,
            score: dominant.score,
            contributing_factors: dominant.factors.clone(),
            confidence: dominant.score * dominant.coverage,
            timestamp: now,
        };

        state.current_phase = proposed;
        state.phase_score = dominant.score;
        state.phase_start_ts = Some(now);
        state.transition_history.push(transition.clone());
        if state.transition_history.len() > HISTORY_LIMIT {
            state.transition_history.remove(0);
        }
        drop(states);

        self.transitions.fetch_add(1, Ordering::Relaxed);
        if transition.is_high_priority(self.config.alert_confidence) {
            self.alerts.fetch_add(1, Ordering::Relaxed);
            info!(
                symbol,
                to = %transition.to_phase,
                confidence = transition.confidence,
                "High-priority phase alert"
            );
        } else {
            info!(
                symbol,
                from = %transition.from_phase,
                to = %transition.to_phase,
                score = transition.score,
                "Phase transition"
            );
        }

        if let Some(ref tx) = self.transition_tx {
            if tx.try_send(transition.clone()).is_err() {
                debug!(symbol, "Transition channel unavailable, notification dropped");
            }
        }

        Some(transition)
    }

    /// Snapshot of one symbol's state.
    #[must_use]
    pub fn state(&self, symbol: &str) -> Option<PhaseState> {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(symbol)
            .cloned()
    }

    /// Confidence at which a transition becomes a high-priority alert.
    #[must_use]
    pub fn alert_confidence(&self) -> f64 {
        self.config.alert_confidence
    }

    /// Transitions fired since startup.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transitions.load(Ordering::Relaxed)
    }

    /// High-priority alerts since startup.
    #[must_use]
    pub fn alert_count(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    /// Invalid-edge evaluations discarded since startup.
    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Highest-scoring triggered detector; the fixed evaluation order breaks
/// exact ties deterministically.
fn dominant_detector(inputs: &PhaseInputs) -> Option<DetectorScore> {
    let mut best: Option<DetectorScore> = None;
    for detector in [
        PhaseDetector::Setup,
        PhaseDetector::Acceleration,
        PhaseDetector::Reversal,
    ] {
        let score = detector.score(inputs);
        if !score.is_triggered() {
            continue;
        }
        if best.as_ref().is_none_or(|b| score.score > b.score) {
            best = Some(score);
        }
    }
    best
}
