//! Wire messages for the options trade feed.
//!
//! The feed delivers JSON arrays of events tagged by `ev`. Only status
//! frames and trade prints are consumed; anything else is skipped by the
//! client without counting as a parse error.
//!
//! Trade event format:
//! ```json
//! [{"ev":"T","sym":"O:AAPL241220C00150000","p":2.15,"s":40,
//!   "t":1718721125000,"c":[233],"x":312}]
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;

use gammaflow_core::{OccSymbol, TradePrint};

/// A single event frame from the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "ev")]
pub enum FeedMessage {
    /// Connection lifecycle frames: `connected`, `auth_success`,
    /// `auth_failed`, ...
    #[serde(rename = "status")]
    Status {
        status: String,
        #[serde(default)]
        message: String,
    },

    /// An option trade print.
    #[serde(rename = "T")]
    Trade(TradeEvent),

    /// Event types this pipeline does not consume.
    #[serde(other)]
    Unsupported,
}

/// Raw trade event as delivered by the feed.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    /// Contract ticker.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Trade price.
    #[serde(rename = "p")]
    pub price: Decimal,
    /// Contracts traded.
    #[serde(rename = "s")]
    pub size: u32,
    /// SIP timestamp, milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    /// Condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,
    /// Reporting exchange id.
    #[serde(rename = "x", default)]
    pub exchange: i32,
}

impl TradeEvent {
    /// Converts to a typed print, decoding the underlying from the ticker.
    ///
    /// Returns `None` when the contract ticker does not decode; the caller
    /// counts those as parse errors.
    #[must_use]
    pub fn to_trade_print(&self) -> Option<TradePrint> {
        let occ = OccSymbol::parse(&self.symbol).ok()?;

        Some(TradePrint {
            symbol: self.symbol.clone(),
            underlying: occ.underlying,
            price: self.price,
            size: self.size,
            timestamp_ms: self.timestamp_ms,
            conditions: self.conditions.clone(),
            exchange: self.exchange,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ==================== Status Frame Tests ====================

    #[test]
    fn test_parse_status_frame() {
        let json = r#"{"ev":"status","status":"connected","message":"Connected Successfully"}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();

        match msg {
            FeedMessage::Status { status, message } => {
                assert_eq!(status, "connected");
                assert_eq!(message, "Connected Successfully");
            }
            other => panic!("expected status frame, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_status_without_message() {
        let json = r#"{"ev":"status","status":"auth_success"}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(msg, FeedMessage::Status { status, .. } if status == "auth_success"));
    }

    // ==================== Trade Frame Tests ====================

    #[test]
    fn test_parse_trade_frame() {
        let json = r#"{"ev":"T","sym":"O:AAPL241220C00150000","p":2.15,"s":40,"t":1718721125000,"c":[233],"x":312}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();

        let FeedMessage::Trade(event) = msg else {
            panic!("expected trade frame");
        };
        assert_eq!(event.symbol, "O:AAPL241220C00150000");
        assert_eq!(event.price, dec!(2.15));
        assert_eq!(event.size, 40);
        assert_eq!(event.conditions, vec![233]);
    }

    #[test]
    fn test_parse_trade_without_optional_fields() {
        let json = r#"{"ev":"T","sym":"O:SPY250117P00412500","p":1.02,"s":1,"t":1718721125000}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();

        let FeedMessage::Trade(event) = msg else {
            panic!("expected trade frame");
        };
        assert!(event.conditions.is_empty());
        assert_eq!(event.exchange, 0);
    }

    #[test]
    fn test_parse_event_array() {
        let json = r#"[{"ev":"status","status":"connected"},
                       {"ev":"T","sym":"O:AAPL241220C00150000","p":2.15,"s":40,"t":1718721125000}]"#;
        let messages: Vec<FeedMessage> = serde_json::from_str(json).unwrap();

        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], FeedMessage::Status { .. }));
        assert!(matches!(messages[1], FeedMessage::Trade(_)));
    }

    #[test]
    fn test_unknown_event_type_is_unsupported() {
        let json = r#"{"ev":"Q","sym":"O:AAPL241220C00150000"}"#;
        let msg: FeedMessage = serde_json::from_str(json).unwrap();

        assert!(matches!(msg, FeedMessage::Unsupported));
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_trade_event_to_print() {
        let event = TradeEvent {
            symbol: "O:NVDA250321C00880000".to_string(),
            price: dec!(12.40),
            size: 25,
            timestamp_ms: 1_718_721_125_000,
            conditions: vec![209],
            exchange: 303,
        };

        let print = event.to_trade_print().unwrap();

        assert_eq!(print.underlying, "NVDA");
        assert_eq!(print.notional(), dec!(31000));
    }

    #[test]
    fn test_undecodable_ticker_yields_none() {
        let event = TradeEvent {
            symbol: "garbage".to_string(),
            price: dec!(1),
            size: 1,
            timestamp_ms: 0,
            conditions: vec![],
            exchange: 0,
        };

        assert!(event.to_trade_print().is_none());
    }
}
