//! End-to-end wiring for the options flow pipeline.
//!
//! feed -> aggregators -> anomaly detector -> trigger orchestrator ->
//! exposure engine -> phase engine -> downstream transition channel.

pub mod metrics;
pub mod orchestrator;
pub mod runner;
pub mod store;

pub use metrics::PipelineMetrics;
pub use orchestrator::{TriggerOrchestrator, TriggerOutcome};
pub use runner::{Pipeline, PipelineDeps};
pub use store::{PgTriggerStore, TriggerStore};
