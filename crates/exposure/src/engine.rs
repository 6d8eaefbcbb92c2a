//! Chain-wide dealer exposure aggregation.
//!
//! Dealers are modeled as structurally short both calls and puts: per
//! contract GEX flips sign for calls, and DEX flips sign for both legs.
//! The DEX convention mirrors the upstream modeling choice and is kept
//! as documented rather than re-derived.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use gammaflow_core::{ExposureSnapshot, OptionRight};

use crate::greeks::black_scholes_greeks;
use crate::snapshot::ChainSnapshot;

/// Risk-free rate used when pricing chain contracts.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

/// Continuous dividend yield assumed for underlyings.
pub const DEFAULT_DIVIDEND_YIELD: f64 = 0.0;

/// Strike keys are cents so they can order and hash exactly.
fn strike_key(strike: f64) -> i64 {
    (strike * 100.0).round() as i64
}

fn key_strike(key: i64) -> f64 {
    key as f64 / 100.0
}

/// Computes dealer-perspective exposure metrics from chain snapshots.
#[derive(Debug, Clone)]
pub struct ExposureEngine {
    risk_free_rate: f64,
    dividend_yield: f64,
}

impl Default for ExposureEngine {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            dividend_yield: DEFAULT_DIVIDEND_YIELD,
        }
    }
}

impl ExposureEngine {
    /// Creates an engine with explicit pricing parameters.
    #[must_use]
    pub fn new(risk_free_rate: f64, dividend_yield: f64) -> Self {
        Self {
            risk_free_rate,
            dividend_yield,
        }
    }

    /// Aggregates one chain snapshot into an [`ExposureSnapshot`].
    ///
    /// Contracts with zero open interest, non-positive time to expiry, or
    /// non-positive IV are excluded from every aggregate.
    #[must_use]
    pub fn analyze(&self, chain: &ChainSnapshot, now: DateTime<Utc>) -> ExposureSnapshot {
        let spot = chain.spot_price;
        let today = now.date_naive();

        let mut net_gex = 0.0;
        let mut net_dex = 0.0;
        let mut net_vanna = 0.0;
        let mut net_charm = 0.0;
        let mut contracts_analyzed = 0u64;
        let mut total_call_oi = 0u64;
        let mut total_put_oi = 0u64;

        let mut call_oi_by_strike: BTreeMap<i64, u64> = BTreeMap::new();
        let mut put_oi_by_strike: BTreeMap<i64, u64> = BTreeMap::new();
        let mut gex_by_strike: BTreeMap<i64, f64> = BTreeMap::new();

        for contract in &chain.contracts {
            if contract.open_interest == 0 {
                continue;
            }

            let t_years = (contract.expiry - today).num_days() as f64 / 365.0;
            if t_years <= 0.0 || contract.iv <= 0.0 {
                continue;
            }

            let right = if contract.is_call {
                OptionRight::Call
            } else {
                OptionRight::Put
            };
            let greeks = black_scholes_greeks(
                spot,
                contract.strike,
                t_years,
                self.risk_free_rate,
                self.dividend_yield,
                contract.iv,
                right,
            );

            let oi = contract.open_interest as f64;

            // Dollar gamma per 1% spot move; dealers short calls.
            let gex_raw = greeks.gamma * oi * 100.0 * spot * spot * 0.01;
            let gex = if contract.is_call { -gex_raw } else { gex_raw };

            // Share-equivalent delta; short-dealer sign on both legs.
            let dex = -(greeks.delta * oi * 100.0);

            let vanna_raw = greeks.vanna * oi * 100.0;
            let vanna = if contract.is_call {
                -vanna_raw
            } else {
                vanna_raw
            };

            let charm_raw = greeks.charm * oi * 100.0;
            let charm = if contract.is_call {
                -charm_raw
            } else {
                charm_raw
            };

            net_gex += gex;
            net_dex += dex;
            net_vanna += vanna;
            net_charm += charm;
            contracts_analyzed += 1;

            let key = strike_key(contract.strike);
            *gex_by_strike.entry(key).or_insert(0.0) += gex;
            if contract.is_call {
                total_call_oi += contract.open_interest;
                *call_oi_by_strike.entry(key).or_insert(0) += contract.open_interest;
            } else {
                total_put_oi += contract.open_interest;
                *put_oi_by_strike.entry(key).or_insert(0) += contract.open_interest;
            }
        }

        let snapshot = ExposureSnapshot {
            symbol: chain.underlying.clone(),
            spot_price: spot,
            net_gamma_exposure: net_gex,
            net_delta_exposure: net_dex,
            net_vanna_exposure: net_vanna,
            net_charm,
            call_wall_strike: wall_strike(&call_oi_by_strike),
            put_wall_strike: wall_strike(&put_oi_by_strike),
            gamma_flip_level: gamma_flip(&gex_by_strike),
            contracts_analyzed,
            total_call_oi,
            total_put_oi,
            computed_at: now,
        };

        debug!(
            symbol = %snapshot.symbol,
            net_gex = snapshot.net_gamma_exposure,
            contracts = snapshot.contracts_analyzed,
            "Exposure computed"
        );

        snapshot
    }
}

/// Strike with maximum aggregated open interest. Iterating strikes in
/// ascending order with a strict comparison makes the lowest strike win
/// ties.
fn wall_strike(oi_by_strike: &BTreeMap<i64, u64>) -> Option<f64> {
    let mut best: Option<(i64, u64)> = None;
    for (&key, &oi) in oi_by_strike {
        if best.is_none_or(|(_, best_oi)| oi > best_oi) {
            best = Some((key, oi));
        }
    }
    best.map(|(key, _)| key_strike(key))
}

/// Spot level where cumulative dealer gamma changes sign: scan the
/// per-strike GEX cumulatively in ascending strike order and linearly
/// interpolate inside the first adjacent pair whose signs differ.
fn gamma_flip(gex_by_strike: &BTreeMap<i64, f64>) -> Option<f64> {
    if gex_by_strike.len() < 2 {
        return None;
    }

    let mut cumulative = Vec::with_capacity(gex_by_strike.len());
    let mut running = 0.0;
    for (&key, &gex) in gex_by_strike {
        running += gex;
        cumulative.push((key_strike(key), running));
    }

    for pair in cumulative.windows(2) {
        let (strike_lo, cum_lo) = pair[0];
        let (strike_hi, cum_hi) = pair[1];
        if cum_lo == 0.0 {
            return Some(strike_lo);
        }
        if cum_lo.signum() != cum_hi.signum() && cum_hi != 0.0 {
            let weight = cum_lo.abs() / (cum_lo.abs() + cum_hi.abs());
            return Some(strike_lo + (strike_hi - strike_lo) * weight);
        }
        if cum_hi == 0.0 {
            return Some(strike_hi);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ChainContract;
    use chrono::{NaiveDate, TimeZone};

    fn contract(
        strike: f64,
        is_call: bool,
        open_interest: u64,
        iv: f64,
        expiry: NaiveDate,
    ) -> ChainContract {
        let right = if is_call { "C" } else { "P" };
        ChainContract {
            symbol: format!("O:TEST241220{right}{:08}", (strike * 1000.0) as u64),
            strike,
            expiry,
            is_call,
            open_interest,
            iv,
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            bid: 1.0,
            ask: 1.2,
            last: 1.1,
            volume: 100,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 20, 15, 0, 0).unwrap()
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 20).unwrap()
    }

    // ==================== Aggregation Tests ====================

    #[test]
    fn test_walls_and_flip_for_mixed_chain() {
        let chain = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![
                contract(150.0, true, 15_000, 0.3, expiry()),
                contract(150.0, false, 10_000, 0.3, expiry()),
                contract(145.0, false, 4_000, 0.3, expiry()),
                contract(155.0, true, 5_000, 0.3, expiry()),
            ],
        };

        let snapshot = ExposureEngine::default().analyze(&chain, now());

        assert_eq!(snapshot.call_wall_strike, Some(150.0));
        assert_eq!(snapshot.put_wall_strike, Some(150.0));
        assert_eq!(snapshot.contracts_analyzed, 4);
        assert_eq!(snapshot.total_call_oi, 20_000);
        assert_eq!(snapshot.total_put_oi, 14_000);

        // Put gamma dominates the low strikes (+), call gamma the high
        // ones (-): the cumulative sum crosses zero somewhere inside.
        let flip = snapshot.gamma_flip_level.expect("expected a flip level");
        assert!(flip > 145.0 && flip < 155.0, "flip = {flip}");
    }

    #[test]
    fn test_no_flip_when_one_sided() {
        // All-put chain: cumulative GEX stays positive across strikes.
        let chain = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![
                contract(140.0, false, 5_000, 0.3, expiry()),
                contract(150.0, false, 5_000, 0.3, expiry()),
            ],
        };

        let snapshot = ExposureEngine::default().analyze(&chain, now());

        assert!(snapshot.gamma_flip_level.is_none());
        assert!(snapshot.net_gamma_exposure > 0.0);
        assert!(snapshot.call_wall_strike.is_none());
    }

    #[test]
    fn test_sign_conventions() {
        let calls_only = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![contract(150.0, true, 10_000, 0.3, expiry())],
        };
        let snap = ExposureEngine::default().analyze(&calls_only, now());

        // Dealer short calls: negative gamma, and the ATM call's positive
        // delta flips negative under the short-dealer DEX convention.
        assert!(snap.net_gamma_exposure < 0.0);
        assert!(snap.net_delta_exposure < 0.0);

        let puts_only = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![contract(150.0, false, 10_000, 0.3, expiry())],
        };
        let snap = ExposureEngine::default().analyze(&puts_only, now());

        // Put gamma keeps its sign; put delta is negative, so negating it
        // leaves DEX positive.
        assert!(snap.net_gamma_exposure > 0.0);
        assert!(snap.net_delta_exposure > 0.0);
    }

    // ==================== Exclusion Tests ====================

    #[test]
    fn test_zero_oi_and_expired_contracts_excluded() {
        let chain = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![
                contract(150.0, true, 0, 0.3, expiry()),
                contract(150.0, true, 1_000, 0.3, NaiveDate::from_ymd_opt(2024, 11, 20).unwrap()),
                contract(150.0, true, 1_000, 0.0, expiry()),
                contract(150.0, true, 1_000, 0.3, expiry()),
            ],
        };

        let snapshot = ExposureEngine::default().analyze(&chain, now());

        assert_eq!(snapshot.contracts_analyzed, 1);
        assert_eq!(snapshot.total_call_oi, 1_000);
    }

    #[test]
    fn test_empty_chain() {
        let chain = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![],
        };

        let snapshot = ExposureEngine::default().analyze(&chain, now());

        assert_eq!(snapshot.contracts_analyzed, 0);
        assert!(snapshot.gamma_flip_level.is_none());
        assert!(snapshot.call_wall_strike.is_none());
        assert!(snapshot.put_wall_strike.is_none());
        assert!(snapshot.net_gamma_exposure.abs() < f64::EPSILON);
    }

    // ==================== Wall Tie-Break Tests ====================

    #[test]
    fn test_wall_tie_prefers_lowest_strike() {
        let chain = ChainSnapshot {
            underlying: "TEST".to_string(),
            spot_price: 150.0,
            contracts: vec![
                contract(155.0, true, 5_000, 0.3, expiry()),
                contract(145.0, true, 5_000, 0.3, expiry()),
            ],
        };

        let snapshot = ExposureEngine::default().analyze(&chain, now());
        assert_eq!(snapshot.call_wall_strike, Some(145.0));
    }

    // ==================== Flip Interpolation Tests ====================

    #[test]
    fn test_flip_interpolates_by_magnitude() {
        // Hand-built per-strike GEX: cumulative +100 at 100, -300 at 110.
        let mut gex = BTreeMap::new();
        gex.insert(strike_key(100.0), 100.0);
        gex.insert(strike_key(110.0), -400.0);

        let flip = gamma_flip(&gex).unwrap();
        // |100| / (|100| + |300|) = 0.25 of the way from 100 to 110.
        assert!((flip - 102.5).abs() < 1e-9);
    }

    #[test]
    fn test_flip_requires_two_strikes() {
        let mut gex = BTreeMap::new();
        gex.insert(strike_key(100.0), -100.0);
        assert!(gamma_flip(&gex).is_none());
    }
}
