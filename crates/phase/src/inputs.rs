//! Per-symbol observables snapshotted for one evaluation.

use serde::{Deserialize, Serialize};

/// Inputs to a phase evaluation. Every field is optional: detectors score
/// what is present and skip what is not, except where a signal is marked
/// required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseInputs {
    /// Window notional over baseline expectation. Required by the setup
    /// detector; its absence halves and caps the setup score.
    pub unusual_volume_ratio: Option<f64>,
    /// IV percentile rank in [0, 100].
    pub iv_rank: Option<f64>,
    /// Fractional call open-interest growth (0.2 = +20%).
    pub call_oi_growth: Option<f64>,

    /// Price breakout measured in ATR multiples.
    pub atr_breakout: Option<f64>,
    /// Volume over its recent average.
    pub volume_surge: Option<f64>,
    /// Net dealer gamma exposure (dollars per 1% move).
    pub net_gex: Option<f64>,
    /// Current RSI in [0, 100].
    pub rsi: Option<f64>,
    /// RSI at the previous evaluation.
    pub prev_rsi: Option<f64>,
    /// Fractional deviation of price above VWAP.
    pub vwap_deviation: Option<f64>,

    /// Net vanna exposure now.
    pub vanna: Option<f64>,
    /// Net vanna exposure at the previous evaluation.
    pub prev_vanna: Option<f64>,
    /// Fractional price change over the lookback.
    pub price_change: Option<f64>,
    /// RSI change over the lookback (points).
    pub rsi_change: Option<f64>,
    /// Current volume over the recent peak, in [0, 1] when declining.
    pub volume_peak_ratio: Option<f64>,
    /// IV rank change over the lookback (points).
    pub iv_rank_change: Option<f64>,
}

impl PhaseInputs {
    /// Snapshot with only the unusual-volume ratio set, the minimum a
    /// fresh trigger provides.
    #[must_use]
    pub fn from_volume_ratio(ratio: f64) -> Self {
        Self {
            unusual_volume_ratio: Some(ratio),
            ..Self::default()
        }
    }
}
