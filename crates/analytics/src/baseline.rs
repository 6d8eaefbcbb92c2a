//! Baseline estimation.
//!
//! Answers "how much notional is normal for this symbol at this time of
//! day" through a three-tier fallback: trailing bucket history, a derived
//! time-of-day curve, then a flat default. Results are cached for the
//! trading day and recomputed the moment the date rolls, even mid-process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::warn;

use gammaflow_core::clock;
use gammaflow_core::BaselineConfig;

use crate::store::BucketStore;

/// Where a baseline figure came from, in decreasing order of trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineSource {
    BucketHistory,
    Derived,
    Default,
}

/// Expected activity for one (symbol, session bucket).
#[derive(Debug, Clone, Serialize)]
pub struct Baseline {
    pub symbol: String,
    pub bucket_minutes: u32,
    pub expected_notional: f64,
    pub expected_print_count: f64,
    pub source: BaselineSource,
    /// In [0, 1]; grows with the number of observed history days.
    pub confidence: f64,
}

#[derive(Debug, Clone)]
struct CachedBaseline {
    baseline: Baseline,
    trade_date: NaiveDate,
}

/// Per-day cached baseline estimator over a bucket history store.
pub struct BaselineEstimator {
    store: Arc<dyn BucketStore>,
    config: BaselineConfig,
    multipliers: HashMap<u32, f64>,
    cache: Mutex<HashMap<(String, u32), CachedBaseline>>,
}

impl BaselineEstimator {
    /// Creates an estimator over the given history store.
    #[must_use]
    pub fn new(store: Arc<dyn BucketStore>, config: BaselineConfig) -> Self {
        let multipliers = config
            .multipliers
            .iter()
            .map(|m| (m.minutes, m.multiplier))
            .collect();
        Self {
            store,
            config,
            multipliers,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the baseline for a (symbol, session bucket) on a trade
    /// date. Cached per day; a store failure falls through to the derived
    /// tier rather than propagating.
    pub async fn baseline(
        &self,
        symbol: &str,
        bucket_minutes: u32,
        trade_date: NaiveDate,
    ) -> Baseline {
        let key = (symbol.to_string(), bucket_minutes);

        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(cached) = cache.get(&key) {
                if cached.trade_date == trade_date {
                    return cached.baseline.clone();
                }
            }
        }

        let baseline = self.compute(symbol, bucket_minutes, trade_date).await;

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(
            key,
            CachedBaseline {
                baseline: baseline.clone(),
                trade_date,
            },
        );
        baseline
    }

    /// Drops every cached entry.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    async fn compute(&self, symbol: &str, bucket_minutes: u32, trade_date: NaiveDate) -> Baseline {
        match self
            .store
            .bucket_history(
                symbol,
                bucket_minutes as i32,
                trade_date,
                i64::from(self.config.lookback_days),
            )
            .await
        {
            Ok(rows) if rows.len() >= self.config.min_observed_days as usize => {
                let days = rows.len();
                let notional_sum: f64 = rows
                    .iter()
                    .map(|r| r.notional_sum.to_f64().unwrap_or(0.0))
                    .sum();
                let print_sum: f64 = rows.iter().map(|r| r.print_count as f64).sum();

                return Baseline {
                    symbol: symbol.to_string(),
                    bucket_minutes,
                    expected_notional: notional_sum / days as f64,
                    expected_print_count: print_sum / days as f64,
                    source: BaselineSource::BucketHistory,
                    confidence: (days as f64 / f64::from(self.config.lookback_days)).min(1.0),
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(symbol, bucket_minutes, error = %e, "Bucket history unavailable, deriving baseline");
            }
        }

        self.derived(symbol, bucket_minutes)
    }

    fn derived(&self, symbol: &str, bucket_minutes: u32) -> Baseline {
        if self.config.daily_volume_reference > 0.0 {
            let multiplier = self
                .multipliers
                .get(&bucket_minutes)
                .copied()
                .unwrap_or(1.0);
            let expected = self.config.daily_volume_reference * multiplier
                / f64::from(clock::TRADING_MINUTES_PER_DAY);

            return Baseline {
                symbol: symbol.to_string(),
                bucket_minutes,
                expected_notional: expected,
                expected_print_count: 0.0,
                source: BaselineSource::Derived,
                confidence: 0.5,
            };
        }

        Baseline {
            symbol: symbol.to_string(),
            bucket_minutes,
            expected_notional: self.config.default_notional,
            expected_print_count: 0.0,
            source: BaselineSource::Default,
            confidence: 0.1,
        }
    }
}
