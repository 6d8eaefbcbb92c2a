//! In-memory aggregation and detection.
//!
//! Two aggregators see every print: a sliding window feeding live
//! detection and non-overlapping 30-minute buckets feeding the historical
//! baseline. The anomaly detector compares the two and emits triggers.

pub mod baseline;
pub mod bucket;
pub mod detector;
pub mod store;
pub mod window;

pub use baseline::{Baseline, BaselineEstimator, BaselineSource};
pub use bucket::BucketAggregator;
pub use detector::AnomalyDetector;
pub use store::BucketStore;
pub use window::{RankMetric, WindowAggregator, WindowStats};
