//! The three phase detectors.
//!
//! Each detector is a weighted sum of sub-signal scores in [0, 1]; the
//! weights of every detector sum to 1.0. A detector is triggered at a
//! score of 0.5 or above.

use gammaflow_core::Phase;

use crate::inputs::PhaseInputs;

/// Score a detector considers triggered.
pub const TRIGGER_SCORE: f64 = 0.5;

// Setup weights.
const W_UNUSUAL_VOLUME: f64 = 0.50;
const W_IV_RANK: f64 = 0.25;
const W_CALL_OI_GROWTH: f64 = 0.25;

// Acceleration weights.
const W_ATR_BREAKOUT: f64 = 0.30;
const W_VOLUME_SURGE: f64 = 0.25;
const W_POSITIVE_GEX: f64 = 0.20;
const W_RSI_OVERBOUGHT: f64 = 0.15;
const W_VWAP_DEVIATION: f64 = 0.10;

// Reversal weights.
const W_VANNA_FLIP: f64 = 0.30;
const W_NEGATIVE_GEX: f64 = 0.25;
const W_RSI_DIVERGENCE: f64 = 0.20;
const W_VOLUME_CLIMAX: f64 = 0.15;
const W_IV_CRUSH: f64 = 0.10;

/// Net GEX magnitude (dollars per 1% move) that scores 1.0.
const GEX_FULL_SCALE: f64 = 1.0e9;

/// RSI drop against rising price that counts as bearish divergence.
const RSI_DIVERGENCE_DROP: f64 = 5.0;

/// RSI level considered overbought.
const RSI_OVERBOUGHT: f64 = 70.0;

/// A detector's verdict for one evaluation.
#[derive(Debug, Clone)]
pub struct DetectorScore {
    pub phase: Phase,
    pub score: f64,
    /// Sub-signals that contributed, with their unweighted scores.
    pub factors: Vec<(String, f64)>,
    /// Sub-signals that had data, over the detector's total.
    pub coverage: f64,
}

impl DetectorScore {
    /// True when the score clears the trigger threshold.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.score >= TRIGGER_SCORE
    }
}

/// One of the three phase detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseDetector {
    Setup,
    Acceleration,
    Reversal,
}

impl PhaseDetector {
    /// The phase this detector argues for.
    #[must_use]
    pub fn phase(self) -> Phase {
        match self {
            Self::Setup => Phase::Setup,
            Self::Acceleration => Phase::Acceleration,
            Self::Reversal => Phase::Reversal,
        }
    }

    /// Scores the inputs through this detector.
    #[must_use]
    pub fn score(self, inputs: &PhaseInputs) -> DetectorScore {
        match self {
            Self::Setup => score_setup(inputs),
            Self::Acceleration => score_acceleration(inputs),
            Self::Reversal => score_reversal(inputs),
        }
    }
}

/// Linear ramp: 0 at `lo`, 1 at `hi`, clamped.
fn ramp(value: f64, lo: f64, hi: f64) -> f64 {
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Accumulates weighted sub-signals and tracks data coverage.
struct ScoreBuilder {
    total: f64,
    signals: usize,
    present: usize,
    factors: Vec<(String, f64)>,
}

impl ScoreBuilder {
    fn new() -> Self {
        Self {
            total: 0.0,
            signals: 0,
            present: 0,
            factors: Vec::new(),
        }
    }

    fn add(&mut self, name: &str, weight: f64, score: Option<f64>) {
        self.signals += 1;
        if let Some(score) = score {
            self.present += 1;
            let score = score.clamp(0.0, 1.0);
            self.total += weight * score;
            if score > 0.0 {
                self.factors.push((name.to_string(), score));
            }
        }
    }

    fn finish(self, phase: Phase) -> DetectorScore {
        let coverage = if self.signals == 0 {
            0.0
        } else {
            self.present as f64 / self.signals as f64
        };
        DetectorScore {
            phase,
            score: self.total,
            factors: self.factors,
            coverage,
        }
    }
}

/// Setup: unusual volume (required), IV-rank elevation, call OI growth.
fn score_setup(inputs: &PhaseInputs) -> DetectorScore {
    let mut builder = ScoreBuilder::new();

    let volume_score = inputs.unusual_volume_ratio.map(|r| ramp(r, 1.0, 5.0));
    builder.add("unusual_volume", W_UNUSUAL_VOLUME, volume_score);
    builder.add(
        "iv_rank",
        W_IV_RANK,
        inputs.iv_rank.map(|rank| ramp(rank, 50.0, 90.0)),
    );
    builder.add(
        "call_oi_growth",
        W_CALL_OI_GROWTH,
        inputs.call_oi_growth.map(|g| ramp(g, 0.0, 0.30)),
    );

    let mut score = builder.finish(Phase::Setup);
    // The volume signal is required: without it the remaining evidence is
    // halved and capped so it can never trigger on its own.
    if volume_score.is_none() {
        score.score = (score.score * 0.5).min(TRIGGER_SCORE);
    }
    score
}

/// Acceleration: ATR breakout, volume surge, positive GEX, RSI
/// overbought, price-vs-VWAP deviation.
fn score_acceleration(inputs: &PhaseInputs) -> DetectorScore {
    let mut builder = ScoreBuilder::new();

    builder.add(
        "atr_breakout",
        W_ATR_BREAKOUT,
        inputs.atr_breakout.map(|atr| ramp(atr, 1.0, 3.0)),
    );
    builder.add(
        "volume_surge",
        W_VOLUME_SURGE,
        inputs.volume_surge.map(|v| ramp(v, 1.5, 4.0)),
    );
    builder.add(
        "positive_gex",
        W_POSITIVE_GEX,
        inputs
            .net_gex
            .map(|gex| if gex > 0.0 { ramp(gex, 0.0, GEX_FULL_SCALE) } else { 0.0 }),
    );
    builder.add(
        "rsi_overbought",
        W_RSI_OVERBOUGHT,
        inputs.rsi.map(|rsi| ramp(rsi, RSI_OVERBOUGHT, 85.0)),
    );
    builder.add(
        "vwap_deviation",
        W_VWAP_DEVIATION,
        inputs.vwap_deviation.map(|dev| ramp(dev, 0.005, 0.03)),
    );

    builder.finish(Phase::Acceleration)
}

/// Reversal: vanna flip or deepening, negative GEX, bearish RSI
/// divergence, volume climax, IV-rank crush.
fn score_reversal(inputs: &PhaseInputs) -> DetectorScore {
    let mut builder = ScoreBuilder::new();

    let vanna_score = match (inputs.vanna, inputs.prev_vanna) {
        (Some(now), Some(prev)) if prev > 0.0 && now < 0.0 => Some(1.0),
        (Some(now), Some(prev)) if now < 0.0 && now < prev => Some(0.6),
        (Some(now), None) if now < 0.0 => Some(0.3),
        (Some(_), _) => Some(0.0),
        (None, _) => None,
    };
    builder.add("vanna_flip", W_VANNA_FLIP, vanna_score);

    builder.add(
        "negative_gex",
        W_NEGATIVE_GEX,
        inputs
            .net_gex
            .map(|gex| if gex < 0.0 { ramp(-gex, 0.0, GEX_FULL_SCALE) } else { 0.0 }),
    );

    let divergence = match (inputs.price_change, inputs.rsi_change) {
        (Some(price), Some(rsi)) => {
            if price > 0.0 && rsi <= -RSI_DIVERGENCE_DROP {
                // Price pushing up while RSI fades.
                Some(1.0)
            } else if inputs.prev_rsi.is_some_and(|p| p >= RSI_OVERBOUGHT) && rsi <= -10.0 {
                // Sharp fall out of overbought.
                Some(0.8)
            } else {
                Some(0.0)
            }
        }
        _ => None,
    };
    builder.add("rsi_divergence", W_RSI_DIVERGENCE, divergence);

    builder.add(
        "volume_climax",
        W_VOLUME_CLIMAX,
        inputs
            .volume_peak_ratio
            .map(|ratio| ramp(0.7 - ratio, 0.0, 0.4)),
    );
    builder.add(
        "iv_crush",
        W_IV_CRUSH,
        inputs
            .iv_rank_change
            .map(|change| if change < 0.0 { ramp(-change, 0.0, 30.0) } else { 0.0 }),
    );

    builder.finish(Phase::Reversal)
}
