//! Trade print type emitted by the ingestion client.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Standard US equity option contract multiplier.
pub const CONTRACT_MULTIPLIER: u32 = 100;

/// A single option trade print from the upstream feed.
///
/// Ephemeral: produced by ingestion, consumed once by the aggregators,
/// never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePrint {
    /// Full contract ticker (e.g. `O:AAPL241220C00150000`).
    pub symbol: String,
    /// Underlying stock/ETF decoded from the ticker.
    pub underlying: String,
    pub price: Decimal,
    /// Contracts traded.
    pub size: u32,
    /// Exchange (SIP) timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Trade condition codes as delivered by the feed.
    pub conditions: Vec<i32>,
    /// Reporting exchange id.
    pub exchange: i32,
}

impl TradePrint {
    /// Dollar value of the print: price x size x contract multiplier.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * Decimal::from(self.size) * Decimal::from(CONTRACT_MULTIPLIER)
    }
}
