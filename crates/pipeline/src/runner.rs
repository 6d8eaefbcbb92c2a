//! Pipeline assembly.
//!
//! Spawns the long-lived tasks: the feed loop, the fan-in that feeds
//! both aggregators, periodic eviction and bucket flushing, and the
//! detection sweep that hands triggers to the orchestrator. Every loop
//! honors the shared shutdown signal between sleeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use gammaflow_analytics::{
    AnomalyDetector, BaselineEstimator, BucketAggregator, BucketStore, RankMetric,
    WindowAggregator,
};
use gammaflow_core::clock;
use gammaflow_core::{AppConfig, PhaseTransition, TradePrint};
use gammaflow_exposure::SnapshotProvider;
use gammaflow_feed::{FeedClient, FeedStats};
use gammaflow_phase::PhaseEngine;

use crate::metrics::PipelineMetrics;
use crate::orchestrator::TriggerOrchestrator;
use crate::store::TriggerStore;

/// Trade channel depth between the feed task and the fan-in loop.
const TRADE_CHANNEL_CAPACITY: usize = 10_000;

/// How long shutdown waits for a task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// External collaborators the pipeline is wired against.
pub struct PipelineDeps {
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub bucket_store: Arc<dyn BucketStore>,
    pub trigger_store: Arc<dyn TriggerStore>,
    /// Downstream consumer of phase transitions.
    pub transition_tx: mpsc::Sender<PhaseTransition>,
}

/// A running pipeline instance.
///
/// All per-symbol state lives on this instance, so several independent
/// pipelines can coexist in one process (the tests do exactly that).
pub struct Pipeline {
    window: Arc<WindowAggregator>,
    buckets: Arc<BucketAggregator>,
    detector: Arc<AnomalyDetector>,
    orchestrator: Arc<TriggerOrchestrator>,
    phase_engine: Arc<PhaseEngine>,
    feed_stats: Arc<FeedStats>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Wires and spawns every pipeline task.
    #[must_use]
    pub fn spawn(config: AppConfig, deps: PipelineDeps) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let window = Arc::new(WindowAggregator::new(&config.window));
        let buckets = Arc::new(BucketAggregator::new());
        let estimator = Arc::new(BaselineEstimator::new(
            deps.bucket_store.clone(),
            config.baseline.clone(),
        ));
        let detector = Arc::new(AnomalyDetector::new(estimator, config.detector.clone()));
        let phase_engine = Arc::new(
            PhaseEngine::new(config.phase.clone()).with_transition_channel(deps.transition_tx),
        );
        let orchestrator = Arc::new(TriggerOrchestrator::new(
            config.orchestrator.clone(),
            deps.snapshots,
            deps.trigger_store,
            phase_engine.clone(),
        ));

        let feed = FeedClient::new(config.feed.clone());
        let feed_stats = feed.stats();

        let (trade_tx, trade_rx) = mpsc::channel::<TradePrint>(TRADE_CHANNEL_CAPACITY);
        let (flush_tx, flush_rx) = mpsc::channel::<()>(1);

        let mut tasks = Vec::new();
        tasks.push(spawn_feed(feed, trade_tx, shutdown_rx.clone()));
        tasks.push(spawn_fan_in(
            window.clone(),
            buckets.clone(),
            trade_rx,
            flush_tx,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_cleanup(
            window.clone(),
            config.window.cleanup_interval_secs,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_flush(
            buckets.clone(),
            deps.bucket_store,
            config.buckets.flush_interval_secs,
            flush_rx,
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_detection(
            window.clone(),
            detector.clone(),
            orchestrator.clone(),
            config.detector.scan_interval_secs,
            config.detector.scan_top_symbols,
            shutdown_rx,
        ));

        info!("Pipeline started");

        Self {
            window,
            buckets,
            detector,
            orchestrator,
            phase_engine,
            feed_stats,
            shutdown_tx,
            tasks,
        }
    }

    /// Assembles the read-only metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> PipelineMetrics {
        PipelineMetrics {
            feed: self.feed_stats.snapshot(),
            active_symbols: self.window.active_symbols(),
            evicted_trades: self.window.evicted_total(),
            pending_buckets: self.buckets.pending_buckets(),
            bucket_flush_successes: self.buckets.flush_successes(),
            bucket_flush_failures: self.buckets.flush_failures(),
            triggers_emitted: self.detector.triggers_emitted(),
            triggers_handled: self.orchestrator.handled_count(),
            orchestrator_step_failures: self.orchestrator.step_failure_count(),
            phase_transitions: self.phase_engine.transition_count(),
            phase_alerts: self.phase_engine.alert_count(),
            phase_rejections: self.phase_engine.rejected_count(),
        }
    }

    /// Clears one symbol's trigger cooldown. Operator action.
    pub fn reset_cooldown(&self, symbol: &str) {
        self.detector.reset_cooldown(symbol);
    }

    /// Signals shutdown and waits for the tasks, aborting stragglers
    /// after a bounded grace period.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);

        for mut task in self.tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Pipeline task did not stop in time, aborting");
                task.abort();
            }
        }

        info!("Pipeline stopped");
    }
}

fn spawn_feed(
    feed: FeedClient,
    trade_tx: mpsc::Sender<TradePrint>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = feed.run(trade_tx, shutdown).await {
            error!(error = %e, "Feed client stopped");
        }
    })
}

fn spawn_fan_in(
    window: Arc<WindowAggregator>,
    buckets: Arc<BucketAggregator>,
    mut trade_rx: mpsc::Receiver<TradePrint>,
    flush_tx: mpsc::Sender<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let print = tokio::select! {
                maybe = trade_rx.recv() => maybe,
                () = wait_shutdown(&mut shutdown) => break,
            };
            let Some(print) = print else { break };

            window.add_trade(&print);
            if buckets.add_trade(&print) {
                // Boundary crossed: nudge the flush loop. A full channel
                // means a flush is already queued.
                let _ = flush_tx.try_send(());
            }
        }
    })
}

fn spawn_cleanup(
    window: Arc<WindowAggregator>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    window.cleanup(clock::now_ms());
                }
                () = wait_shutdown(&mut shutdown) => break,
            }
        }
    })
}

fn spawn_flush(
    buckets: Arc<BucketAggregator>,
    store: Arc<dyn BucketStore>,
    interval_secs: u64,
    mut flush_rx: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        let mut nudges_open = true;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                nudge = flush_rx.recv(), if nudges_open => {
                    if nudge.is_none() {
                        // Fan-in is gone; keep flushing on the interval.
                        nudges_open = false;
                        continue;
                    }
                }
                () = wait_shutdown(&mut shutdown) => break,
            }
            // Failures keep the batch in memory; the next pass retries.
            let _ = buckets.flush(store.as_ref()).await;
        }

        // Final drain on the way out.
        let _ = buckets.flush(store.as_ref()).await;
    })
}

fn spawn_detection(
    window: Arc<WindowAggregator>,
    detector: Arc<AnomalyDetector>,
    orchestrator: Arc<TriggerOrchestrator>,
    interval_secs: u64,
    top_symbols: usize,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                () = wait_shutdown(&mut shutdown) => break,
            }

            let now_ms = clock::now_ms();
            for stats in window.top_symbols(top_symbols, RankMetric::Notional, now_ms) {
                if let Some(trigger) = detector.check(&stats, now_ms).await {
                    let orchestrator = orchestrator.clone();
                    // The semaphore inside bounds how many of these run.
                    tokio::spawn(async move {
                        orchestrator.handle(trigger).await;
                    });
                }
            }
        }
    })
}

async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if shutdown.changed().await.is_err() {
            return;
        }
        if *shutdown.borrow() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use gammaflow_data::{BucketHistoryRow, FlowBucketRecord};
    use gammaflow_data::{ExposureRecord, PhaseTransitionRecord, TriggerRecord};
    use gammaflow_exposure::{ChainSnapshot, SnapshotError};

    struct NullStore;

    #[async_trait]
    impl BucketStore for NullStore {
        async fn upsert_batch(&self, _records: &[FlowBucketRecord]) -> Result<()> {
            Ok(())
        }

        async fn bucket_history(
            &self,
            _symbol: &str,
            _bucket_minutes: i32,
            _before: NaiveDate,
            _limit: i64,
        ) -> Result<Vec<BucketHistoryRow>> {
            Ok(vec![])
        }
    }

    #[async_trait]
    impl crate::store::TriggerStore for NullStore {
        async fn persist_trigger(
            &self,
            _trigger: &TriggerRecord,
            _exposure: Option<&ExposureRecord>,
        ) -> Result<()> {
            Ok(())
        }

        async fn track_symbol(&self, _symbol: &str, _at: chrono::DateTime<chrono::Utc>) -> Result<()> {
            Ok(())
        }

        async fn persist_transition(
            &self,
            _record: &PhaseTransitionRecord,
            _high_priority: bool,
        ) -> Result<()> {
            Ok(())
        }
    }

    struct NoChain;

    #[async_trait]
    impl SnapshotProvider for NoChain {
        async fn fetch_snapshot(&self, _underlying: &str) -> Result<ChainSnapshot, SnapshotError> {
            Err(SnapshotError::Http("unavailable in tests".to_string()))
        }
    }

    fn deps() -> (PipelineDeps, mpsc::Receiver<PhaseTransition>) {
        let (tx, rx) = mpsc::channel(64);
        (
            PipelineDeps {
                snapshots: Arc::new(NoChain),
                bucket_store: Arc::new(NullStore),
                trigger_store: Arc::new(NullStore),
                transition_tx: tx,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn test_pipeline_starts_and_stops() {
        let (deps, _rx) = deps();
        let pipeline = Pipeline::spawn(AppConfig::default(), deps);

        let metrics = pipeline.metrics();
        assert_eq!(metrics.triggers_emitted, 0);
        assert_eq!(metrics.active_symbols, 0);

        pipeline.shutdown().await;
    }

    #[tokio::test]
    async fn test_independent_instances_share_nothing() {
        let (deps_a, _rx_a) = deps();
        let (deps_b, _rx_b) = deps();

        let a = Pipeline::spawn(AppConfig::default(), deps_a);
        let b = Pipeline::spawn(AppConfig::default(), deps_b);

        assert_eq!(a.metrics().active_symbols, 0);
        assert_eq!(b.metrics().active_symbols, 0);

        a.shutdown().await;
        b.shutdown().await;
    }
}
