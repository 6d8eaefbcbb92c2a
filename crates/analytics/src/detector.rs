//! Anomaly detection over window stats.
//!
//! Compares live window notional against the baseline expectation and
//! emits a trigger on exceedance. Cooldown state is per symbol and
//! process-wide: it never expires early and is cleared only by an
//! explicit operator reset or a restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::DateTime;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, info};

use gammaflow_core::{clock, DetectorConfig, Trigger};

use crate::baseline::BaselineEstimator;
use crate::window::WindowStats;

/// Per-symbol unusual-activity detector.
pub struct AnomalyDetector {
    baseline: Arc<BaselineEstimator>,
    config: DetectorConfig,
    /// Symbol -> last trigger timestamp (ms).
    cooldowns: Mutex<HashMap<String, i64>>,
    triggers_emitted: AtomicU64,
}

impl AnomalyDetector {
    /// Creates a detector over the given baseline estimator.
    #[must_use]
    pub fn new(baseline: Arc<BaselineEstimator>, config: DetectorConfig) -> Self {
        Self {
            baseline,
            config,
            cooldowns: Mutex::new(HashMap::new()),
            triggers_emitted: AtomicU64::new(0),
        }
    }

    /// Checks one symbol's window stats against its baseline.
    ///
    /// No-op while the symbol is cooling down. Otherwise compares
    /// observed-over-expected notional against the configured multiplier
    /// and returns a trigger on exceedance, starting the cooldown.
    pub async fn check(&self, stats: &WindowStats, now_ms: i64) -> Option<Trigger> {
        if self.in_cooldown(&stats.symbol, now_ms) {
            return None;
        }

        let trade_date = clock::trade_date(now_ms);
        let bucket_minutes = clock::bucket_minutes(now_ms);

        let baseline = self
            .baseline
            .baseline(&stats.symbol, bucket_minutes, trade_date)
            .await;

        if baseline.expected_notional <= 0.0 {
            debug!(symbol = %stats.symbol, "Baseline expectation is zero, skipping");
            return None;
        }

        let observed = stats.total_notional.to_f64().unwrap_or(0.0);
        let ratio = observed / baseline.expected_notional;

        if ratio < self.config.notional_multiplier_threshold {
            return None;
        }

        self.start_cooldown(&stats.symbol, now_ms);
        self.triggers_emitted.fetch_add(1, Ordering::Relaxed);

        let trigger = Trigger {
            symbol: stats.symbol.clone(),
            trigger_ts: DateTime::from_timestamp_millis(now_ms).unwrap_or_default(),
            ratio_observed: ratio,
            notional_observed: stats.total_notional,
            baseline_notional: baseline.expected_notional,
            contract_count: stats.unique_contracts as u64,
            print_count: stats.trade_count,
            bucket_minutes,
            confidence: baseline.confidence,
        };

        info!(
            symbol = %trigger.symbol,
            ratio = trigger.ratio_observed,
            notional = %trigger.notional_observed,
            baseline = trigger.baseline_notional,
            source = ?baseline.source,
            "Unusual activity trigger"
        );

        Some(trigger)
    }

    /// Clears one symbol's cooldown. Operator action only.
    pub fn reset_cooldown(&self, symbol: &str) {
        self.cooldowns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(symbol);
    }

    /// Triggers emitted since startup.
    #[must_use]
    pub fn triggers_emitted(&self) -> u64 {
        self.triggers_emitted.load(Ordering::Relaxed)
    }

    fn in_cooldown(&self, symbol: &str, now_ms: i64) -> bool {
        let cooldowns = self.cooldowns.lock().unwrap_or_else(|e| e.into_inner());
        cooldowns
            .get(symbol)
            .is_some_and(|&last| now_ms - last < (self.config.cooldown_secs as i64) * 1_000)
    }

    fn start_cooldown(&self, symbol: &str, now_ms: i64) {
        self.cooldowns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(symbol.to_string(), now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BucketStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use gammaflow_core::BaselineConfig;
    use gammaflow_data::{BucketHistoryRow, FlowBucketRecord};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    // 2024-06-18 14:32:05 UTC = 10:32 Eastern.
    const NOW: i64 = 1_718_721_125_000;

    /// History store yielding a $100k-per-bucket baseline at full confidence.
    struct FlatHistory(i64);

    #[async_trait]
    impl BucketStore for FlatHistory {
        async fn upsert_batch(&self, _records: &[FlowBucketRecord]) -> Result<()> {
            Ok(())
        }

        async fn bucket_history(
            &self,
            _symbol: &str,
            _bucket_minutes: i32,
            before: NaiveDate,
            _limit: i64,
        ) -> Result<Vec<BucketHistoryRow>> {
            Ok((1..=20)
                .map(|i| BucketHistoryRow {
                    trade_date: before - chrono::Duration::days(i),
                    notional_sum: Decimal::from(self.0),
                    print_count: 200,
                })
                .collect())
        }
    }

    fn detector(baseline_notional: i64) -> AnomalyDetector {
        let estimator = BaselineEstimator::new(
            Arc::new(FlatHistory(baseline_notional)),
            BaselineConfig::default(),
        );
        AnomalyDetector::new(Arc::new(estimator), DetectorConfig::default())
    }

    fn window(symbol: &str, notional: Decimal, trades: u64, now: i64) -> WindowStats {
        WindowStats {
            symbol: symbol.to_string(),
            window_start_ms: now - 60_000,
            window_end_ms: now,
            trade_count: trades,
            total_notional: notional,
            total_contracts: trades * 10,
            unique_contracts: 12,
            min_price: dec!(1),
            max_price: dec!(5),
        }
    }

    // ==================== Trigger Tests ====================

    #[tokio::test]
    async fn test_burst_over_threshold_triggers_once() {
        let det = detector(100_000);

        // 150 prints, $500k against a $100k baseline: ratio 5.0.
        let stats = window("AAPL", dec!(500000), 150, NOW);
        let trigger = det.check(&stats, NOW).await.expect("expected a trigger");

        assert_eq!(trigger.symbol, "AAPL");
        assert!((trigger.ratio_observed - 5.0).abs() < 1e-9);
        assert_eq!(trigger.print_count, 150);
        assert!((trigger.baseline_notional - 100_000.0).abs() < 1e-6);
        assert!((trigger.confidence - 1.0).abs() < 1e-9);
        assert_eq!(det.triggers_emitted(), 1);

        // Identical burst 60s later sits inside the 300s cooldown.
        let again = det.check(&stats, NOW + 60_000).await;
        assert!(again.is_none());
        assert_eq!(det.triggers_emitted(), 1);
    }

    #[tokio::test]
    async fn test_below_threshold_is_quiet() {
        let det = detector(100_000);

        // Ratio 2.5 < 3.0 threshold.
        let stats = window("AAPL", dec!(250000), 80, NOW);
        assert!(det.check(&stats, NOW).await.is_none());
        assert_eq!(det.triggers_emitted(), 0);
    }

    #[tokio::test]
    async fn test_cooldown_expires_after_window() {
        let det = detector(100_000);
        let stats = window("AAPL", dec!(500000), 150, NOW);

        assert!(det.check(&stats, NOW).await.is_some());
        // 299s later: still cooling down.
        assert!(det.check(&stats, NOW + 299_000).await.is_none());
        // 301s later: eligible again.
        assert!(det.check(&stats, NOW + 301_000).await.is_some());
    }

    #[tokio::test]
    async fn test_cooldown_is_per_symbol() {
        let det = detector(100_000);

        assert!(det
            .check(&window("AAPL", dec!(500000), 150, NOW), NOW)
            .await
            .is_some());
        // A different symbol is unaffected by AAPL's cooldown.
        assert!(det
            .check(&window("TSLA", dec!(500000), 150, NOW), NOW)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_operator_reset_clears_cooldown() {
        let det = detector(100_000);
        let stats = window("AAPL", dec!(500000), 150, NOW);

        assert!(det.check(&stats, NOW).await.is_some());
        assert!(det.check(&stats, NOW + 1_000).await.is_none());

        det.reset_cooldown("AAPL");
        assert!(det.check(&stats, NOW + 2_000).await.is_some());
    }
}
