//! Options analytics: per-contract greeks and chain-wide dealer exposure.

pub mod engine;
pub mod greeks;
pub mod snapshot;

pub use engine::ExposureEngine;
pub use greeks::{black_scholes_greeks, Greeks};
pub use snapshot::{
    ChainContract, ChainSnapshot, RestSnapshotClient, SnapshotError, SnapshotProvider,
    DEFAULT_IMPLIED_VOL,
};
