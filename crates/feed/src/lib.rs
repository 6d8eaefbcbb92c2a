//! Stream ingestion for the all-trades options feed.
//!
//! One long-lived task owns the websocket: it authenticates, subscribes to
//! every trade print, and republishes typed [`TradePrint`]s over a channel.
//! Transport failures are absorbed here with backoff; only authentication
//! failures surface to the process.
//!
//! [`TradePrint`]: gammaflow_core::TradePrint

pub mod client;
pub mod error;
pub mod message;
pub mod stats;

pub use client::{FeedClient, FeedEvent};
pub use error::FeedError;
pub use message::{FeedMessage, TradeEvent};
pub use stats::{FeedStats, FeedStatsSnapshot};
