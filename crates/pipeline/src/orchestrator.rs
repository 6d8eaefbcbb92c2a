//! Trigger fan-out.
//!
//! Each trigger runs through five steps under a bounded-concurrency
//! gate: fetch chain, compute exposure, persist, track the symbol,
//! evaluate the phase engine. Steps fail independently; a failure is
//! recorded in the outcome and later steps still run. No step retries
//! here; any retrying belongs to the wrapped clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use gammaflow_core::{ExposureSnapshot, OrchestratorConfig, PhaseTransition, Trigger};
use gammaflow_data::{ExposureRecord, PhaseTransitionRecord, TriggerRecord};
use gammaflow_exposure::{ExposureEngine, SnapshotProvider};
use gammaflow_phase::{PhaseEngine, PhaseInputs};

use crate::store::TriggerStore;

/// Per-step results of handling one trigger. A populated error field
/// means that step failed; every other step still ran.
#[derive(Debug, Default)]
pub struct TriggerOutcome {
    pub symbol: String,
    pub exposure: Option<ExposureSnapshot>,
    pub transition: Option<PhaseTransition>,
    pub chain_error: Option<String>,
    pub persist_error: Option<String>,
    pub tracking_error: Option<String>,
    pub transition_persist_error: Option<String>,
}

impl TriggerOutcome {
    /// True when every step that ran succeeded.
    #[must_use]
    pub fn fully_succeeded(&self) -> bool {
        self.chain_error.is_none()
            && self.persist_error.is_none()
            && self.tracking_error.is_none()
            && self.transition_persist_error.is_none()
    }
}

/// Bounded-concurrency trigger handler.
pub struct TriggerOrchestrator {
    config: OrchestratorConfig,
    semaphore: Arc<tokio::sync::Semaphore>,
    snapshots: Arc<dyn SnapshotProvider>,
    exposure_engine: ExposureEngine,
    store: Arc<dyn TriggerStore>,
    phase_engine: Arc<PhaseEngine>,
    /// Previous net vanna per symbol, for flip detection.
    last_vanna: Mutex<HashMap<String, f64>>,
    handled: AtomicU64,
    step_failures: AtomicU64,
}

impl TriggerOrchestrator {
    /// Creates an orchestrator over its collaborators.
    #[must_use]
    pub fn new(
        config: OrchestratorConfig,
        snapshots: Arc<dyn SnapshotProvider>,
        store: Arc<dyn TriggerStore>,
        phase_engine: Arc<PhaseEngine>,
    ) -> Self {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(config.max_concurrent.max(1)));
        Self {
            config,
            semaphore,
            snapshots,
            exposure_engine: ExposureEngine::default(),
            store,
            phase_engine,
            last_vanna: Mutex::new(HashMap::new()),
            handled: AtomicU64::new(0),
            step_failures: AtomicU64::new(0),
        }
    }

    /// Handles one trigger end to end.
    pub async fn handle(&self, trigger: Trigger) -> TriggerOutcome {
        let _permit = self.semaphore.acquire().await.ok();
        self.handled.fetch_add(1, Ordering::Relaxed);

        let mut outcome = TriggerOutcome {
            symbol: trigger.symbol.clone(),
            ..TriggerOutcome::default()
        };

        // (a) chain snapshot; a failure here only skips the exposure step.
        let snapshot_timeout = Duration::from_secs(self.config.snapshot_timeout_secs);
        let chain = match tokio::time::timeout(
            snapshot_timeout,
            self.snapshots.fetch_snapshot(&trigger.symbol),
        )
        .await
        {
            Ok(Ok(chain)) => Some(chain),
            Ok(Err(e)) => {
                outcome.chain_error = Some(e.to_string());
                None
            }
            Err(_) => {
                outcome.chain_error = Some("snapshot fetch timed out".to_string());
                None
            }
        };

        // (b) exposure, only with a chain in hand.
        outcome.exposure = chain
            .as_ref()
            .map(|c| self.exposure_engine.analyze(c, Utc::now()));

        // (c) persist trigger (+ exposure).
        let persist_timeout = Duration::from_secs(self.config.persist_timeout_secs);
        let trigger_record = TriggerRecord::from(&trigger);
        let exposure_record = outcome.exposure.as_ref().map(ExposureRecord::from);
        match tokio::time::timeout(
            persist_timeout,
            self.store
                .persist_trigger(&trigger_record, exposure_record.as_ref()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => outcome.persist_error = Some(e.to_string()),
            Err(_) => outcome.persist_error = Some("persist timed out".to_string()),
        }

        // (d) permanent tracking list.
        match tokio::time::timeout(
            persist_timeout,
            self.store.track_symbol(&trigger.symbol, trigger.trigger_ts),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => outcome.tracking_error = Some(e.to_string()),
            Err(_) => outcome.tracking_error = Some("tracking upsert timed out".to_string()),
        }

        // (e) phase evaluation and transition persistence.
        let inputs = self.phase_inputs(&trigger, outcome.exposure.as_ref());
        if let Some(transition) = self
            .phase_engine
            .evaluate(&trigger.symbol, &inputs, trigger.trigger_ts)
        {
            let record = PhaseTransitionRecord::from(&transition);
            let high_priority = transition.is_high_priority(self.phase_engine.alert_confidence());
            match tokio::time::timeout(
                persist_timeout,
                self.store.persist_transition(&record, high_priority),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => outcome.transition_persist_error = Some(e.to_string()),
                Err(_) => {
                    outcome.transition_persist_error = Some("transition persist timed out".to_string());
                }
            }
            outcome.transition = Some(transition);
        }

        for error in [
            &outcome.chain_error,
            &outcome.persist_error,
            &outcome.tracking_error,
            &outcome.transition_persist_error,
        ]
        .into_iter()
        .flatten()
        {
            self.step_failures.fetch_add(1, Ordering::Relaxed);
            warn!(symbol = %outcome.symbol, error = %error, "Trigger step failed");
        }

        info!(
            symbol = %outcome.symbol,
            ratio = trigger.ratio_observed,
            exposure = outcome.exposure.is_some(),
            transition = outcome.transition.is_some(),
            clean = outcome.fully_succeeded(),
            "Trigger handled"
        );

        outcome
    }

    /// Triggers handled since startup.
    #[must_use]
    pub fn handled_count(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Individual step failures since startup.
    #[must_use]
    pub fn step_failure_count(&self) -> u64 {
        self.step_failures.load(Ordering::Relaxed)
    }

    /// Builds the evaluation snapshot from what this trigger produced,
    /// remembering net vanna so the next evaluation sees a previous value.
    fn phase_inputs(&self, trigger: &Trigger, exposure: Option<&ExposureSnapshot>) -> PhaseInputs {
        let mut inputs = PhaseInputs::from_volume_ratio(trigger.ratio_observed);

        if let Some(exposure) = exposure {
            inputs.net_gex = Some(exposure.net_gamma_exposure);
            inputs.vanna = Some(exposure.net_vanna_exposure);

            let mut last = self.last_vanna.lock().unwrap_or_else(|e| e.into_inner());
            inputs.prev_vanna = last.insert(trigger.symbol.clone(), exposure.net_vanna_exposure);
        }

        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use gammaflow_core::PhaseConfig;
    use gammaflow_exposure::{ChainContract, ChainSnapshot, SnapshotError};
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;

    struct StubSnapshots {
        fail: bool,
    }

    #[async_trait]
    impl SnapshotProvider for StubSnapshots {
        async fn fetch_snapshot(&self, underlying: &str) -> Result<ChainSnapshot, SnapshotError> {
            if self.fail {
                return Err(SnapshotError::Http("connection refused".to_string()));
            }
            Ok(ChainSnapshot {
                underlying: underlying.to_string(),
                spot_price: 150.0,
                contracts: vec![ChainContract {
                    symbol: format!("O:{underlying}301220C00150000"),
                    strike: 150.0,
                    expiry: NaiveDate::from_ymd_opt(2030, 12, 20).unwrap(),
                    is_call: true,
                    open_interest: 10_000,
                    iv: 0.3,
                    delta: None,
                    gamma: None,
                    theta: None,
                    vega: None,
                    bid: 5.0,
                    ask: 5.2,
                    last: 5.1,
                    volume: 500,
                }],
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        fail_persist: bool,
        triggers: StdMutex<Vec<(TriggerRecord, bool)>>,
        tracked: StdMutex<Vec<String>>,
        transitions: StdMutex<Vec<(PhaseTransitionRecord, bool)>>,
    }

    #[async_trait]
    impl TriggerStore for MemoryStore {
        async fn persist_trigger(
            &self,
            trigger: &TriggerRecord,
            exposure: Option<&ExposureRecord>,
        ) -> Result<()> {
            if self.fail_persist {
                anyhow::bail!("database unavailable");
            }
            self.triggers
                .lock()
                .unwrap()
                .push((trigger.clone(), exposure.is_some()));
            Ok(())
        }

        async fn track_symbol(&self, symbol: &str, _at: chrono::DateTime<Utc>) -> Result<()> {
            self.tracked.lock().unwrap().push(symbol.to_string());
            Ok(())
        }

        async fn persist_transition(
            &self,
            record: &PhaseTransitionRecord,
            high_priority: bool,
        ) -> Result<()> {
            self.transitions
                .lock()
                .unwrap()
                .push((record.clone(), high_priority));
            Ok(())
        }
    }

    fn trigger(symbol: &str) -> Trigger {
        Trigger {
            symbol: symbol.to_string(),
            trigger_ts: Utc::now(),
            ratio_observed: 5.0,
            notional_observed: dec!(500000),
            baseline_notional: 100_000.0,
            contract_count: 20,
            print_count: 150,
            bucket_minutes: 630,
            confidence: 0.9,
        }
    }

    fn orchestrator(
        snapshots: StubSnapshots,
        store: Arc<MemoryStore>,
    ) -> TriggerOrchestrator {
        TriggerOrchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(snapshots),
            store,
            Arc::new(PhaseEngine::new(PhaseConfig::default())),
        )
    }

    // ==================== Happy Path Tests ====================

    #[tokio::test]
    async fn test_full_fanout() {
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(StubSnapshots { fail: false }, store.clone());

        let outcome = orch.handle(trigger("AAPL")).await;

        assert!(outcome.fully_succeeded());
        assert!(outcome.exposure.is_some());
        // Volume ratio 5.0 drives NONE -> SETUP.
        assert!(outcome.transition.is_some());

        let triggers = store.triggers.lock().unwrap();
        assert_eq!(triggers.len(), 1);
        assert!(triggers[0].1, "exposure should persist with the trigger");
        assert_eq!(store.tracked.lock().unwrap().as_slice(), ["AAPL"]);
        assert_eq!(store.transitions.lock().unwrap().len(), 1);
        assert_eq!(orch.handled_count(), 1);
        assert_eq!(orch.step_failure_count(), 0);
    }

    // ==================== Partial Failure Tests ====================

    #[tokio::test]
    async fn test_chain_failure_still_persists_and_tracks() {
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(StubSnapshots { fail: true }, store.clone());

        let outcome = orch.handle(trigger("AAPL")).await;

        assert!(outcome.chain_error.is_some());
        assert!(outcome.exposure.is_none());
        // Later steps ran regardless.
        let triggers = store.triggers.lock().unwrap();
        assert_eq!(triggers.len(), 1);
        assert!(!triggers[0].1, "no exposure persisted without a chain");
        assert_eq!(store.tracked.lock().unwrap().len(), 1);
        // Phase evaluation still happened on volume alone.
        assert!(outcome.transition.is_some());
    }

    #[tokio::test]
    async fn test_persist_failure_does_not_block_tracking() {
        let store = Arc::new(MemoryStore {
            fail_persist: true,
            ..MemoryStore::default()
        });
        let orch = orchestrator(StubSnapshots { fail: false }, store.clone());

        let outcome = orch.handle(trigger("AAPL")).await;

        assert!(outcome.persist_error.is_some());
        assert!(!outcome.fully_succeeded());
        assert_eq!(store.tracked.lock().unwrap().len(), 1);
        assert!(orch.step_failure_count() >= 1);
    }

    // ==================== Vanna Memory Tests ====================

    #[tokio::test]
    async fn test_prev_vanna_remembered_across_triggers() {
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(StubSnapshots { fail: false }, store);

        let first = orch.handle(trigger("AAPL")).await;
        assert!(first.exposure.is_some());

        // Second trigger: the inputs builder now has a previous vanna.
        let inputs = orch.phase_inputs(&trigger("AAPL"), first.exposure.as_ref());
        assert!(inputs.prev_vanna.is_some());
    }
}
