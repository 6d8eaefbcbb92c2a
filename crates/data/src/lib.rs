pub mod database;
pub mod models;
pub mod repositories;

pub use database::DatabaseClient;
pub use models::{
    BucketHistoryRow, ExposureRecord, FlowBucketRecord, PhaseTransitionRecord, TrackedSymbolRecord,
    TriggerRecord,
};
pub use repositories::{
    ExposureRepository, FlowBucketRepository, PhaseTransitionRepository, TrackedSymbolRepository,
    TriggerRepository,
};
