//! Options-chain snapshot client.
//!
//! The snapshot API is an external collaborator: rate-limited, possibly
//! cached on its side. Decoding is strict and fails closed; the only
//! tolerated absence is implied volatility, which falls back to the
//! named default below.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use gammaflow_core::ChainConfig;

/// IV assigned to contracts the collaborator returns without one.
pub const DEFAULT_IMPLIED_VOL: f64 = 0.30;

/// Errors from the snapshot collaborator boundary.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Transport failure reaching the API.
    #[error("snapshot request failed: {0}")]
    Http(String),

    /// The request exceeded its deadline.
    #[error("snapshot request timed out: {0}")]
    Timeout(String),

    /// The API answered with an explicit error.
    #[error("snapshot API error: {0}")]
    Api(String),

    /// The payload did not decode into the expected shape.
    #[error("snapshot decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for SnapshotError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// One contract in a chain snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainContract {
    pub symbol: String,
    pub strike: f64,
    pub expiry: NaiveDate,
    pub is_call: bool,
    pub open_interest: u64,
    /// Implied volatility; absent values take [`DEFAULT_IMPLIED_VOL`].
    #[serde(default = "default_iv")]
    pub iv: f64,
    /// Vendor greeks, when the collaborator supplies them. The exposure
    /// engine recomputes its own regardless.
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub volume: u64,
}

fn default_iv() -> f64 {
    DEFAULT_IMPLIED_VOL
}

/// A full chain snapshot for one underlying.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSnapshot {
    pub underlying: String,
    pub spot_price: f64,
    pub contracts: Vec<ChainContract>,
}

/// Envelope the collaborator wraps snapshots in.
#[derive(Debug, Deserialize)]
struct SnapshotEnvelope {
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    snapshot: Option<ChainSnapshot>,
}

/// Source of chain snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Fetches the current chain snapshot for an underlying.
    ///
    /// # Errors
    /// Returns a `SnapshotError`; the orchestrator treats any failure as
    /// a skipped exposure step, never a fatal condition.
    async fn fetch_snapshot(&self, underlying: &str) -> Result<ChainSnapshot, SnapshotError>;
}

/// REST implementation of the snapshot collaborator.
pub struct RestSnapshotClient {
    http: reqwest::Client,
    config: ChainConfig,
    limiter: DefaultDirectRateLimiter,
}

impl RestSnapshotClient {
    /// Builds a client with the configured timeout and request rate cap.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ChainConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let per_minute =
            NonZeroU32::new(config.requests_per_minute.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_minute(per_minute));

        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    fn snapshot_url(&self, underlying: &str) -> String {
        format!(
            "{}/v1/chains/{}/snapshot",
            self.config.base_url.trim_end_matches('/'),
            underlying
        )
    }
}

#[async_trait]
impl SnapshotProvider for RestSnapshotClient {
    async fn fetch_snapshot(&self, underlying: &str) -> Result<ChainSnapshot, SnapshotError> {
        self.limiter.until_ready().await;

        let url = self.snapshot_url(underlying);
        debug!(underlying, %url, "Fetching chain snapshot");

        let response = self
            .http
            .get(&url)
            .query(&[("apiKey", self.config.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SnapshotError::Api(format!(
                "status {} for {}",
                response.status(),
                underlying
            )));
        }

        let envelope: SnapshotEnvelope = response
            .json()
            .await
            .map_err(|e| SnapshotError::Decode(e.to_string()))?;

        if !envelope.success {
            return Err(SnapshotError::Api(
                envelope.error.unwrap_or_else(|| "unspecified".to_string()),
            ));
        }

        envelope
            .snapshot
            .ok_or_else(|| SnapshotError::Decode("missing snapshot body".to_string()))
    }
}
