//! Repository layer, one struct per table.

mod exposure_repo;
mod flow_bucket_repo;
mod phase_repo;
mod tracked_symbol_repo;
mod trigger_repo;

pub use exposure_repo::ExposureRepository;
pub use flow_bucket_repo::FlowBucketRepository;
pub use phase_repo::PhaseTransitionRepository;
pub use tracked_symbol_repo::TrackedSymbolRepository;
pub use trigger_repo::TriggerRepository;
