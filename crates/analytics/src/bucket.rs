//! Fixed-width bucket aggregation.
//!
//! Accumulates every print into non-overlapping 30-minute per-symbol
//! buckets and flushes them to storage as one additive batch. A failed
//! flush leaves everything in memory for the next attempt; the storage
//! upsert adds rather than overwrites, so partial-bucket flushes and
//! retried batches both stay correct.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use gammaflow_core::{clock, TradePrint};
use gammaflow_data::FlowBucketRecord;

use crate::store::BucketStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    symbol: String,
    trade_date: NaiveDate,
    bucket_minutes: u32,
}

#[derive(Debug, Default)]
struct Accumulator {
    print_count: u64,
    notional_sum: Decimal,
    contracts: HashSet<String>,
}

impl Accumulator {
    fn absorb(&mut self, other: Accumulator) {
        self.print_count += other.print_count;
        self.notional_sum += other.notional_sum;
        self.contracts.extend(other.contracts);
    }
}

#[derive(Debug, Default)]
struct BucketState {
    accumulators: HashMap<BucketKey, Accumulator>,
    /// Last bucket seen per symbol, for boundary-crossing detection.
    current: HashMap<String, (NaiveDate, u32)>,
}

/// Per-underlying 30-minute bucket aggregator.
#[derive(Default)]
pub struct BucketAggregator {
    state: Mutex<BucketState>,
    flush_successes: AtomicU64,
    flush_failures: AtomicU64,
}

impl BucketAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates a print. Returns `true` exactly when this print moved
    /// its symbol into a new bucket (calendar date change or a new
    /// 30-minute floor); repeated prints inside one bucket signal at most
    /// one crossing.
    pub fn add_trade(&self, print: &TradePrint) -> bool {
        let trade_date = clock::trade_date(print.timestamp_ms);
        let bucket_minutes = clock::bucket_minutes(print.timestamp_ms);

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let crossed = match state.current.get(&print.underlying) {
            Some(&(date, minutes)) => date != trade_date || minutes != bucket_minutes,
            None => false,
        };
        state
            .current
            .insert(print.underlying.clone(), (trade_date, bucket_minutes));

        let acc = state
            .accumulators
            .entry(BucketKey {
                symbol: print.underlying.clone(),
                trade_date,
                bucket_minutes,
            })
            .or_default();
        acc.print_count += 1;
        acc.notional_sum += print.notional();
        acc.contracts.insert(print.symbol.clone());

        crossed
    }

    /// Number of buckets currently held in memory.
    #[must_use]
    pub fn pending_buckets(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .accumulators
            .len()
    }

    /// Flushes all in-memory accumulators as one atomic batch.
    ///
    /// On success the flushed accumulators are gone from memory; on
    /// failure they are merged back (together with anything accumulated
    /// concurrently) and the whole batch retries next time.
    ///
    /// # Errors
    /// Returns the storage error after restoring the in-memory state.
    pub async fn flush<S: BucketStore + ?Sized>(&self, store: &S) -> anyhow::Result<usize> {
        let drained: HashMap<BucketKey, Accumulator> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut state.accumulators)
        };

        if drained.is_empty() {
            return Ok(0);
        }

        let records: Vec<FlowBucketRecord> = drained
            .iter()
            .map(|(key, acc)| FlowBucketRecord {
                symbol: key.symbol.clone(),
                trade_date: key.trade_date,
                bucket_minutes: key.bucket_minutes as i32,
                print_count: acc.print_count as i64,
                notional_sum: acc.notional_sum,
                unique_contracts: acc.contracts.len() as i64,
            })
            .collect();
        let count = records.len();

        match store.upsert_batch(&records).await {
            Ok(()) => {
                self.flush_successes.fetch_add(1, Ordering::Relaxed);
                debug!(buckets = count, "Flushed flow buckets");
                Ok(count)
            }
            Err(e) => {
                // Merge back so nothing accumulated since the drain is lost.
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                for (key, acc) in drained {
                    state.accumulators.entry(key).or_default().absorb(acc);
                }
                drop(state);

                self.flush_failures.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, buckets = count, "Bucket flush failed, retaining batch");
                Err(e)
            }
        }
    }

    /// Successful flush count.
    #[must_use]
    pub fn flush_successes(&self) -> u64 {
        self.flush_successes.load(Ordering::Relaxed)
    }

    /// Failed flush count.
    #[must_use]
    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }
}
