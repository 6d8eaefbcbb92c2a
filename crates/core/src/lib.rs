pub mod clock;
pub mod config;
pub mod config_loader;
pub mod events;
pub mod occ;
pub mod trade;

pub use config::{
    AppConfig, BaselineConfig, BucketConfig, BucketMultiplier, ChainConfig, DatabaseConfig,
    DetectorConfig, FeedConfig, OrchestratorConfig, PhaseConfig, WindowConfig,
};
pub use config_loader::ConfigLoader;
pub use events::{ExposureSnapshot, Phase, PhaseTransition, Trigger};
pub use occ::{OccParseError, OccSymbol, OptionRight};
pub use trade::{TradePrint, CONTRACT_MULTIPLIER};
