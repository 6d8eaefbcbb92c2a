//! Trading-calendar helpers.
//!
//! Bucket alignment and trade dates follow the US equity session, so all
//! conversions go through US/Eastern regardless of host timezone.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use chrono_tz::US::Eastern;

/// Regular session open, minutes since midnight Eastern (09:30).
pub const SESSION_OPEN_MINUTES: u32 = 570;

/// Regular session close, minutes since midnight Eastern (16:00).
pub const SESSION_CLOSE_MINUTES: u32 = 960;

/// Length of the regular session in minutes.
pub const TRADING_MINUTES_PER_DAY: u32 = SESSION_CLOSE_MINUTES - SESSION_OPEN_MINUTES;

/// Width of a historical aggregation bucket.
pub const BUCKET_WIDTH_MINUTES: u32 = 30;

fn eastern(timestamp_ms: i64) -> DateTime<chrono_tz::Tz> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .unwrap_or_default()
        .with_timezone(&Eastern)
}

/// Calendar trade date (Eastern) for a feed timestamp.
#[must_use]
pub fn trade_date(timestamp_ms: i64) -> NaiveDate {
    eastern(timestamp_ms).date_naive()
}

/// Bucket start for a feed timestamp: minutes since midnight Eastern,
/// floored to the bucket width.
#[must_use]
pub fn bucket_minutes(timestamp_ms: i64) -> u32 {
    let et = eastern(timestamp_ms);
    let minutes = et.hour() * 60 + et.minute();
    (minutes / BUCKET_WIDTH_MINUTES) * BUCKET_WIDTH_MINUTES
}

/// Current wall-clock time in milliseconds since the epoch.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Session bucket starts. Thirteen half-hour buckets, open to close.
#[must_use]
pub fn session_buckets() -> Vec<u32> {
    (SESSION_OPEN_MINUTES..SESSION_CLOSE_MINUTES)
        .step_by(BUCKET_WIDTH_MINUTES as usize)
        .collect()
}
