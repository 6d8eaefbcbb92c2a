//! OCC-style option symbol codec.
//!
//! The feed identifies contracts with a compact ticker of the form
//! `O:<UNDERLYING><YYMMDD><C|P><STRIKE>` where the strike is the price in
//! thousandths, zero-padded to eight digits (e.g. `O:AAPL241220C00150000`
//! is the AAPL 2024-12-20 150 call). Parsing and encoding are pure and
//! lossless for every strike granularity the format can represent.

use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Option ticker prefix used by the feed.
const TICKER_PREFIX: &str = "O:";

/// Digits of strike encoding (strike price in thousandths).
const STRIKE_DIGITS: usize = 8;

/// Digits of expiry encoding (YYMMDD).
const EXPIRY_DIGITS: usize = 6;

/// Errors raised while decoding an option ticker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OccParseError {
    /// Ticker is shorter than the fixed-width tail requires.
    #[error("ticker too short: {0}")]
    TooShort(String),

    /// Underlying portion is empty or contains invalid characters.
    #[error("invalid underlying in ticker: {0}")]
    InvalidUnderlying(String),

    /// Expiry digits do not form a real calendar date.
    #[error("invalid expiry in ticker: {0}")]
    InvalidExpiry(String),

    /// Right character is not `C` or `P`.
    #[error("invalid right '{right}' in ticker: {ticker}")]
    InvalidRight { right: char, ticker: String },

    /// Strike digits are not numeric.
    #[error("invalid strike in ticker: {0}")]
    InvalidStrike(String),
}

/// Contract right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Returns true for calls.
    #[must_use]
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call)
    }
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "C"),
            Self::Put => write!(f, "P"),
        }
    }
}

/// A decoded option contract identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccSymbol {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike: Decimal,
}

impl OccSymbol {
    /// Decodes a compact option ticker.
    ///
    /// # Errors
    /// Returns `OccParseError` when any fixed-width segment is malformed.
    pub fn parse(ticker: &str) -> Result<Self, OccParseError> {
        let body = ticker.strip_prefix(TICKER_PREFIX).unwrap_or(ticker);

        let tail_len = STRIKE_DIGITS + 1 + EXPIRY_DIGITS;
        if body.len() <= tail_len {
            return Err(OccParseError::TooShort(ticker.to_string()));
        }

        let (head, strike_part) = body.split_at(body.len() - STRIKE_DIGITS);
        let (head, right_part) = head.split_at(head.len() - 1);
        let (underlying, expiry_part) = head.split_at(head.len() - EXPIRY_DIGITS);

        if underlying.is_empty() || !underlying.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(OccParseError::InvalidUnderlying(ticker.to_string()));
        }

        let right = match right_part.chars().next() {
            Some('C') => OptionRight::Call,
            Some('P') => OptionRight::Put,
            Some(other) => {
                return Err(OccParseError::InvalidRight {
                    right: other,
                    ticker: ticker.to_string(),
                })
            }
            None => return Err(OccParseError::TooShort(ticker.to_string())),
        };

        let expiry = parse_expiry(expiry_part)
            .ok_or_else(|| OccParseError::InvalidExpiry(ticker.to_string()))?;

        let raw: i64 = strike_part
            .parse()
            .map_err(|_| OccParseError::InvalidStrike(ticker.to_string()))?;
        let strike = Decimal::new(raw, 3).normalize();

        Ok(Self {
            underlying: underlying.to_string(),
            expiry,
            right,
            strike,
        })
    }

    /// Encodes back into the compact ticker form. Exact inverse of `parse`.
    #[must_use]
    pub fn encode(&self) -> String {
        let millis = (self.strike * Decimal::from(1000))
            .round()
            .to_i64()
            .unwrap_or(0);
        format!(
            "{}{}{:02}{:02}{:02}{}{:08}",
            TICKER_PREFIX,
            self.underlying,
            self.expiry.year() % 100,
            self.expiry.month(),
            self.expiry.day(),
            self.right,
            millis
        )
    }
}

impl std::fmt::Display for OccSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}{} {}",
            self.underlying, self.strike, self.right, self.expiry
        )
    }
}

fn parse_expiry(digits: &str) -> Option<NaiveDate> {
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = digits[0..2].parse().ok()?;
    let mm: u32 = digits[2..4].parse().ok()?;
    let dd: u32 = digits[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}
