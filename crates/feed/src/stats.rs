//! Liveness metrics for the ingestion client.
//!
//! Counters are atomics so the running feed task and metrics readers
//! share one handle without locking. External alerting watches
//! `reconnections` and `last_message_ms` going stale rather than the
//! process crashing.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Shared counters updated by the feed task on every message.
#[derive(Debug, Default)]
pub struct FeedStats {
    messages_received: AtomicU64,
    trades_parsed: AtomicU64,
    parse_errors: AtomicU64,
    reconnections: AtomicU64,
    max_lag_ms: AtomicI64,
    last_message_ms: AtomicI64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedStatsSnapshot {
    pub messages_received: u64,
    pub trades_parsed: u64,
    pub parse_errors: u64,
    pub reconnections: u64,
    /// Worst observed feed-to-process latency.
    pub max_lag_ms: i64,
    pub last_message_ms: i64,
}

impl FeedStats {
    /// Records receipt of any message frame.
    pub fn record_message(&self, now_ms: i64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.last_message_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Records a successfully decoded trade print and its feed latency.
    pub fn record_trade(&self, lag_ms: i64) {
        self.trades_parsed.fetch_add(1, Ordering::Relaxed);
        self.max_lag_ms.fetch_max(lag_ms, Ordering::Relaxed);
    }

    /// Records a dropped, undecodable message.
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a reconnect attempt.
    pub fn record_reconnect(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of trades parsed so far.
    #[must_use]
    pub fn trades_parsed(&self) -> u64 {
        self.trades_parsed.load(Ordering::Relaxed)
    }

    /// Takes a consistent-enough snapshot for the metrics surface.
    #[must_use]
    pub fn snapshot(&self) -> FeedStatsSnapshot {
        FeedStatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            trades_parsed: self.trades_parsed.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            max_lag_ms: self.max_lag_ms.load(Ordering::Relaxed),
            last_message_ms: self.last_message_ms.load(Ordering::Relaxed),
        }
    }
}
