//! Read-only metrics surface.
//!
//! External alerting watches this snapshot; in particular, a rising
//! reconnect count with a stale last-message timestamp is how persistent
//! feed failures surface instead of a crash.

use serde::Serialize;

use gammaflow_feed::FeedStatsSnapshot;

/// Point-in-time view across every pipeline component.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub feed: FeedStatsSnapshot,

    /// Symbols with live entries in the sliding window.
    pub active_symbols: usize,
    /// Window entries evicted since startup.
    pub evicted_trades: u64,

    /// Buckets awaiting flush.
    pub pending_buckets: usize,
    pub bucket_flush_successes: u64,
    pub bucket_flush_failures: u64,

    /// Triggers emitted by the detector since startup.
    pub triggers_emitted: u64,
    /// Triggers run through the orchestrator.
    pub triggers_handled: u64,
    /// Orchestrator step failures across all triggers.
    pub orchestrator_step_failures: u64,

    pub phase_transitions: u64,
    pub phase_alerts: u64,
    pub phase_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_serialize() {
        let metrics = PipelineMetrics {
            triggers_emitted: 3,
            ..PipelineMetrics::default()
        };

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["triggers_emitted"], 3);
        assert!(json["feed"]["reconnections"].is_number());
    }
}
