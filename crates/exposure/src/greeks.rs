//! Closed-form Black-Scholes greeks.
//!
//! Theta is expressed per calendar day and vega per one-percentage-point
//! move in implied volatility. Degenerate inputs (expired or zero-vol
//! contracts) short-circuit to boundary values instead of propagating
//! NaN through the aggregation.

use gammaflow_core::OptionRight;

/// Per-contract greeks, recomputed on demand. Never cached across chain
/// snapshots: a new snapshot means new IV and spot.
#[derive(Debug, Clone, Copy, Default)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per one-percentage-point IV change.
    pub vega: f64,
    pub vanna: f64,
    pub charm: f64,
    pub d1: f64,
    pub d2: f64,
}

/// Standard normal probability density.
#[must_use]
pub fn norm_pdf(x: f64) -> f64 {
    (1.0 / std::f64::consts::TAU.sqrt()) * (-0.5 * x * x).exp()
}

/// Standard normal cumulative distribution via the Abramowitz-Stegun
/// erf approximation (max error ~1.5e-7, plenty for exposure screening).
#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let sign = x.signum();
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();

    sign * y
}

/// Computes Black-Scholes greeks for one contract.
///
/// `t_years` is time to expiry in years, `rate` the risk-free rate,
/// `div_yield` the continuous dividend yield, `sigma` implied volatility.
#[must_use]
pub fn black_scholes_greeks(
    spot: f64,
    strike: f64,
    t_years: f64,
    rate: f64,
    div_yield: f64,
    sigma: f64,
    right: OptionRight,
) -> Greeks {
    if t_years <= 0.0 || sigma <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return boundary_greeks(spot, strike, right);
    }

    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate - div_yield + 0.5 * sigma * sigma) * t_years)
        / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;

    let disc_q = (-div_yield * t_years).exp();
    let disc_r = (-rate * t_years).exp();
    let pdf_d1 = norm_pdf(d1);

    let delta = match right {
        OptionRight::Call => disc_q * norm_cdf(d1),
        OptionRight::Put => disc_q * (norm_cdf(d1) - 1.0),
    };

    let gamma = disc_q * pdf_d1 / (spot * sigma * sqrt_t);

    // Annualized theta, then per calendar day.
    let decay = -spot * disc_q * pdf_d1 * sigma / (2.0 * sqrt_t);
    let theta_annual = match right {
        OptionRight::Call => {
            decay - rate * strike * disc_r * norm_cdf(d2) + div_yield * spot * disc_q * norm_cdf(d1)
        }
        OptionRight::Put => {
            decay + rate * strike * disc_r * norm_cdf(-d2)
                - div_yield * spot * disc_q * norm_cdf(-d1)
        }
    };
    let theta = theta_annual / 365.0;

    // Raw vega is per unit of sigma; quote it per 1% IV move.
    let vega = spot * disc_q * pdf_d1 * sqrt_t * 0.01;

    // dDelta/dSigma, identical for calls and puts.
    let vanna = -disc_q * pdf_d1 * d2 / sigma;

    // dDelta/dTime (per year).
    let drift = (2.0 * (rate - div_yield) * t_years - d2 * sigma * sqrt_t)
        / (2.0 * t_years * sigma * sqrt_t);
    let charm = match right {
        OptionRight::Call => div_yield * disc_q * norm_cdf(d1) - disc_q * pdf_d1 * drift,
        OptionRight::Put => -div_yield * disc_q * norm_cdf(-d1) - disc_q * pdf_d1 * drift,
    };

    Greeks {
        delta,
        gamma,
        theta,
        vega,
        vanna,
        charm,
        d1,
        d2,
    }
}

/// Expiry / zero-vol boundary: delta collapses to its intrinsic side,
/// every other sensitivity is zero.
fn boundary_greeks(spot: f64, strike: f64, right: OptionRight) -> Greeks {
    let delta = match right {
        OptionRight::Call => {
            if spot > strike {
                1.0
            } else {
                0.0
            }
        }
        OptionRight::Put => {
            if spot < strike {
                -1.0
            } else {
                0.0
            }
        }
    };

    Greeks {
        delta,
        ..Greeks::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Distribution Tests ====================

    #[test]
    fn test_normal_distribution() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-4);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-3);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!((norm_pdf(0.0) - 0.3989).abs() < 1e-3);
    }

    // ==================== Boundary Tests ====================

    #[test]
    fn test_expired_call_delta_by_moneyness() {
        let itm = black_scholes_greeks(155.0, 150.0, 0.0, 0.05, 0.0, 0.3, OptionRight::Call);
        assert!((itm.delta - 1.0).abs() < f64::EPSILON);
        assert!(itm.gamma.abs() < f64::EPSILON);

        let otm = black_scholes_greeks(145.0, 150.0, 0.0, 0.05, 0.0, 0.3, OptionRight::Call);
        assert!(otm.delta.abs() < f64::EPSILON);
    }

    #[test]
    fn test_expired_put_delta_by_moneyness() {
        let itm = black_scholes_greeks(145.0, 150.0, 0.0, 0.05, 0.0, 0.3, OptionRight::Put);
        assert!((itm.delta + 1.0).abs() < f64::EPSILON);

        let otm = black_scholes_greeks(155.0, 150.0, 0.0, 0.05, 0.0, 0.3, OptionRight::Put);
        assert!(otm.delta.abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_vol_short_circuits() {
        let g = black_scholes_greeks(150.0, 150.0, 0.25, 0.05, 0.0, 0.0, OptionRight::Call);
        assert!(g.gamma.abs() < f64::EPSILON);
        assert!(g.vega.abs() < f64::EPSILON);
        assert!(g.delta.is_finite());
    }

    // ==================== Sanity Tests ====================

    #[test]
    fn test_atm_call_delta_near_half() {
        // 30 days, 25% vol: delta should sit just above 0.5.
        let g = black_scholes_greeks(100.0, 100.0, 30.0 / 365.0, 0.05, 0.0, 0.25, OptionRight::Call);
        assert!(g.delta > 0.45 && g.delta < 0.55, "delta = {}", g.delta);
    }

    #[test]
    fn test_put_call_delta_parity() {
        let t = 60.0 / 365.0;
        let call = black_scholes_greeks(100.0, 105.0, t, 0.05, 0.0, 0.3, OptionRight::Call);
        let put = black_scholes_greeks(100.0, 105.0, t, 0.05, 0.0, 0.3, OptionRight::Put);

        // With zero dividend yield: delta_call - delta_put = 1.
        assert!((call.delta - put.delta - 1.0).abs() < 1e-9);
        // Gamma and vega are right-independent.
        assert!((call.gamma - put.gamma).abs() < 1e-12);
        assert!((call.vega - put.vega).abs() < 1e-12);
    }

    #[test]
    fn test_gamma_positive_and_theta_negative_atm() {
        let g = black_scholes_greeks(100.0, 100.0, 30.0 / 365.0, 0.05, 0.0, 0.25, OptionRight::Call);
        assert!(g.gamma > 0.0);
        assert!(g.theta < 0.0);
        assert!(g.vega > 0.0);
    }

    #[test]
    fn test_theta_is_per_day() {
        let g = black_scholes_greeks(100.0, 100.0, 30.0 / 365.0, 0.05, 0.0, 0.25, OptionRight::Call);
        // A 30-day ATM option loses cents, not dollars, per day.
        assert!(g.theta > -0.25 && g.theta < 0.0, "theta = {}", g.theta);
    }

    #[test]
    fn test_d2_below_d1() {
        let g = black_scholes_greeks(100.0, 95.0, 0.5, 0.05, 0.0, 0.3, OptionRight::Call);
        assert!(g.d2 < g.d1);
        assert!((g.d1 - g.d2 - 0.3 * 0.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_vanna_sign_flips_with_moneyness() {
        let t = 90.0 / 365.0;
        // Deep ITM call: d2 well positive, vanna negative.
        let itm = black_scholes_greeks(130.0, 100.0, t, 0.05, 0.0, 0.3, OptionRight::Call);
        // Deep OTM call: d2 well negative, vanna positive.
        let otm = black_scholes_greeks(75.0, 100.0, t, 0.05, 0.0, 0.3, OptionRight::Call);

        assert!(itm.vanna < 0.0);
        assert!(otm.vanna > 0.0);
    }
}
