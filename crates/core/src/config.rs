//! Pipeline configuration.
//!
//! Every section has working defaults so a bare process comes up against
//! the public endpoints with conservative thresholds; `ConfigLoader`
//! merges TOML and environment overrides on top.

use serde::{Deserialize, Serialize};

use crate::clock;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub buckets: BucketConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/gammaflow".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub ws_url: String,
    pub api_key: String,
    /// Reconnect delays in seconds; the last value repeats.
    pub backoff_schedule_secs: Vec<u64>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://socket.polygon.io/options".to_string(),
            api_key: String::new(),
            backoff_schedule_secs: vec![1, 2, 5, 10, 30, 60],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    /// Snapshot requests allowed per minute.
    pub requests_per_minute: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.polygon.io".to_string(),
            api_key: String::new(),
            request_timeout_secs: 10,
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Sliding detection window length.
    pub window_secs: u64,
    /// How often expired entries are evicted.
    pub cleanup_interval_secs: u64,
    /// Age at which cached window stats are recomputed.
    pub stats_cache_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            cleanup_interval_secs: 10,
            stats_cache_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    /// How often accumulated buckets are flushed to storage.
    pub flush_interval_secs: u64,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
        }
    }
}

/// Time-of-day notional multiplier for one session bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BucketMultiplier {
    /// Bucket start, minutes since midnight Eastern.
    pub minutes: u32,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Trailing trading days of bucket history to average.
    pub lookback_days: u32,
    /// Observed days required before history is trusted.
    pub min_observed_days: u32,
    /// Reference daily notional used by the derived fallback.
    pub daily_volume_reference: f64,
    /// Constant fallback when nothing else is available.
    pub default_notional: f64,
    /// U-shaped intraday profile; buckets not listed default to 1.0.
    pub multipliers: Vec<BucketMultiplier>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        // Heavier near the open and close, quietest over lunch.
        let profile = [
            1.8, 1.4, 1.1, 0.9, 0.8, 0.6, 0.6, 0.6, 0.7, 0.9, 1.1, 1.4, 1.7,
        ];
        let multipliers = clock::session_buckets()
            .into_iter()
            .zip(profile)
            .map(|(minutes, multiplier)| BucketMultiplier {
                minutes,
                multiplier,
            })
            .collect();

        Self {
            lookback_days: 20,
            min_observed_days: 5,
            daily_volume_reference: 25_000_000.0,
            default_notional: 50_000.0,
            multipliers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Observed-over-baseline notional ratio that fires a trigger.
    pub notional_multiplier_threshold: f64,
    /// Per-symbol quiet period after a trigger.
    pub cooldown_secs: u64,
    /// How often the detection sweep runs.
    pub scan_interval_secs: u64,
    /// Symbols examined per sweep, ranked by window notional.
    pub scan_top_symbols: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            notional_multiplier_threshold: 3.0,
            cooldown_secs: 300,
            scan_interval_secs: 5,
            scan_top_symbols: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Triggers processed concurrently.
    pub max_concurrent: usize,
    pub snapshot_timeout_secs: u64,
    pub persist_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            snapshot_timeout_secs: 10,
            persist_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Detector score at which a phase is considered triggered.
    pub score_trigger: f64,
    /// Transition confidence that raises a high-priority alert.
    pub alert_confidence: f64,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            score_trigger: 0.5,
            alert_confidence: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();

        assert_eq!(config.window.window_secs, 60);
        assert_eq!(config.detector.cooldown_secs, 300);
        assert!((config.detector.notional_multiplier_threshold - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.orchestrator.max_concurrent, 5);
        assert_eq!(config.feed.backoff_schedule_secs, vec![1, 2, 5, 10, 30, 60]);
    }

    #[test]
    fn test_baseline_multipliers_cover_session() {
        let config = BaselineConfig::default();

        assert_eq!(config.multipliers.len(), 13);
        assert_eq!(config.multipliers[0].minutes, 570);
        assert_eq!(config.multipliers.last().unwrap().minutes, 930);

        // U-shape: open and close heavier than midday.
        let open = config.multipliers[0].multiplier;
        let midday = config.multipliers[6].multiplier;
        let close = config.multipliers.last().unwrap().multiplier;
        assert!(open > midday);
        assert!(close > midday);
    }

    #[test]
    fn test_config_deserializes_from_partial_toml() {
        use figment::providers::{Format, Toml};
        use figment::Figment;

        let toml = r#"
            [detector]
            notional_multiplier_threshold = 4.5
            cooldown_secs = 120
            scan_interval_secs = 5
            scan_top_symbols = 10
        "#;
        let config: AppConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert!((config.detector.notional_multiplier_threshold - 4.5).abs() < f64::EPSILON);
        assert_eq!(config.detector.cooldown_secs, 120);
        assert_eq!(config.window.window_secs, 60);
    }
}
