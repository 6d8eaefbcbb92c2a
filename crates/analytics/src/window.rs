//! Sliding-window aggregation per underlying.
//!
//! One mutex serializes every mutation; all operations are in-memory and
//! never touch I/O. Stats are recomputed on demand with a short-lived
//! cache, and a periodic cleanup bounds memory independent of query
//! volume.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::Serialize;

use gammaflow_core::{TradePrint, WindowConfig};

/// Aggregated view of one symbol's prints inside the sliding window.
///
/// Symbols with no prints in the window have no stats at all; a zeroed
/// struct is never produced.
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    pub symbol: String,
    pub window_start_ms: i64,
    pub window_end_ms: i64,
    pub trade_count: u64,
    pub total_notional: Decimal,
    /// Contracts traded (sum of sizes).
    pub total_contracts: u64,
    /// Distinct option contracts seen.
    pub unique_contracts: usize,
    pub min_price: Decimal,
    pub max_price: Decimal,
}

/// Ranking metric for `top_symbols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankMetric {
    Notional,
    TradeCount,
    ContractCount,
}

#[derive(Debug)]
struct WindowEntry {
    contract: String,
    price: Decimal,
    size: u32,
    notional: Decimal,
    ts_ms: i64,
}

#[derive(Debug, Default)]
struct SymbolWindow {
    /// Prints in feed-delivery order. Timestamps are monotone per symbol.
    entries: VecDeque<WindowEntry>,
    cached: Option<(i64, WindowStats)>,
}

/// Per-underlying sliding-window aggregator.
pub struct WindowAggregator {
    window_ms: i64,
    cache_ms: i64,
    windows: Mutex<HashMap<String, SymbolWindow>>,
    evicted: AtomicU64,
}

impl WindowAggregator {
    /// Creates an aggregator from the window configuration.
    #[must_use]
    pub fn new(config: &WindowConfig) -> Self {
        Self {
            window_ms: (config.window_secs as i64) * 1_000,
            cache_ms: config.stats_cache_ms as i64,
            windows: Mutex::new(HashMap::new()),
            evicted: AtomicU64::new(0),
        }
    }

    /// Appends a print to its symbol's log and invalidates cached stats.
    pub fn add_trade(&self, print: &TradePrint) {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.entry(print.underlying.clone()).or_default();

        window.entries.push_back(WindowEntry {
            contract: print.symbol.clone(),
            price: print.price,
            size: print.size,
            notional: print.notional(),
            ts_ms: print.timestamp_ms,
        });
        window.cached = None;
    }

    /// Returns window stats for a symbol, recomputing unless a cached
    /// value is fresh enough. Absent when the symbol has no prints in
    /// `[now - window, now]`.
    #[must_use]
    pub fn stats(&self, symbol: &str, now_ms: i64) -> Option<WindowStats> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let window = windows.get_mut(symbol)?;
        Self::stats_for(window, symbol, now_ms, self.window_ms, self.cache_ms)
    }

    /// Evicts entries older than the window across all symbols and drops
    /// symbols left empty. Returns how many entries were evicted.
    pub fn cleanup(&self, now_ms: i64) -> usize {
        let horizon = now_ms - self.window_ms;
        let mut evicted = 0;

        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.retain(|_, window| {
            while window
                .entries
                .front()
                .is_some_and(|entry| entry.ts_ms < horizon)
            {
                window.entries.pop_front();
                window.cached = None;
                evicted += 1;
            }
            !window.entries.is_empty()
        });
        drop(windows);

        self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Symbols ranked descending by the chosen metric, ties broken by
    /// symbol so the ordering is deterministic.
    #[must_use]
    pub fn top_symbols(&self, n: usize, metric: RankMetric, now_ms: i64) -> Vec<WindowStats> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        let mut ranked: Vec<WindowStats> = windows
            .iter_mut()
            .filter_map(|(symbol, window)| {
                Self::stats_for(window, symbol, now_ms, self.window_ms, self.cache_ms)
            })
            .collect();
        drop(windows);

        ranked.sort_by(|a, b| {
            let ord = match metric {
                RankMetric::Notional => b.total_notional.cmp(&a.total_notional),
                RankMetric::TradeCount => b.trade_count.cmp(&a.trade_count),
                RankMetric::ContractCount => b.total_contracts.cmp(&a.total_contracts),
            };
            ord.then_with(|| a.symbol.cmp(&b.symbol))
        });
        ranked.truncate(n);
        ranked
    }

    /// Number of symbols currently holding any entries.
    #[must_use]
    pub fn active_symbols(&self) -> usize {
        self.windows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Entries evicted since startup.
    #[must_use]
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn stats_for(
        window: &mut SymbolWindow,
        symbol: &str,
        now_ms: i64,
        window_ms: i64,
        cache_ms: i64,
    ) -> Option<WindowStats> {
        if let Some((computed_at, ref stats)) = window.cached {
            if now_ms - computed_at <= cache_ms {
                return Some(stats.clone());
            }
        }

        let start = now_ms - window_ms;
        let mut trade_count = 0u64;
        let mut total_notional = Decimal::ZERO;
        let mut total_contracts = 0u64;
        let mut contracts: HashSet<&str> = HashSet::new();
        let mut min_price: Option<Decimal> = None;
        let mut max_price: Option<Decimal> = None;

        for entry in &window.entries {
            if entry.ts_ms < start || entry.ts_ms > now_ms {
                continue;
            }
            trade_count += 1;
            total_notional += entry.notional;
            total_contracts += u64::from(entry.size);
            contracts.insert(entry.contract.as_str());
            min_price = Some(min_price.map_or(entry.price, |p| p.min(entry.price)));
            max_price = Some(max_price.map_or(entry.price, |p| p.max(entry.price)));
        }

        if trade_count == 0 {
            window.cached = None;
            return None;
        }

        let stats = WindowStats {
            symbol: symbol.to_string(),
            window_start_ms: start,
            window_end_ms: now_ms,
            trade_count,
            total_notional,
            total_contracts,
            unique_contracts: contracts.len(),
            min_price: min_price.unwrap_or_default(),
            max_price: max_price.unwrap_or_default(),
        };
        window.cached = Some((now_ms, stats.clone()));
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BASE: i64 = 1_700_000_000_000;

    fn print_at(underlying: &str, contract: &str, price: Decimal, size: u32, ts: i64) -> TradePrint {
        TradePrint {
            symbol: contract.to_string(),
            underlying: underlying.to_string(),
            price,
            size,
            timestamp_ms: ts,
            conditions: vec![],
            exchange: 0,
        }
    }

    fn aggregator() -> WindowAggregator {
        WindowAggregator::new(&WindowConfig::default())
    }

    // ==================== Stats Tests ====================

    #[test]
    fn test_stats_absent_without_trades() {
        let agg = aggregator();
        assert!(agg.stats("AAPL", BASE).is_none());
    }

    #[test]
    fn test_stats_counts_only_window_entries() {
        let agg = aggregator();

        // Two inside the 60s window, one 90s old.
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 10, BASE - 90_000));
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 10, BASE - 30_000));
        agg.add_trade(&print_at("AAPL", "O:AAPL241220P00140000", dec!(3), 5, BASE - 1_000));

        let stats = agg.stats("AAPL", BASE).unwrap();

        assert_eq!(stats.trade_count, 2);
        // 2*10*100 + 3*5*100
        assert_eq!(stats.total_notional, dec!(3500));
        assert_eq!(stats.total_contracts, 15);
        assert_eq!(stats.unique_contracts, 2);
        assert_eq!(stats.min_price, dec!(2));
        assert_eq!(stats.max_price, dec!(3));
    }

    #[test]
    fn test_stats_window_invariant() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE));

        let stats = agg.stats("AAPL", BASE).unwrap();
        assert_eq!(stats.window_end_ms - stats.window_start_ms, 60_000);
    }

    #[test]
    fn test_stats_absent_when_all_entries_expired() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE));

        // 2 minutes later the single print has aged out.
        assert!(agg.stats("AAPL", BASE + 120_000).is_none());
    }

    #[test]
    fn test_cache_invalidated_by_new_trade() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE));

        let first = agg.stats("AAPL", BASE).unwrap();
        assert_eq!(first.trade_count, 1);

        // Same query instant, new print: cache must not serve stale count.
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE));
        let second = agg.stats("AAPL", BASE).unwrap();
        assert_eq!(second.trade_count, 2);
    }

    #[test]
    fn test_cache_served_within_freshness_bound() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE));

        let first = agg.stats("AAPL", BASE).unwrap();
        // 500ms later, no new trades: same window bounds prove the cache hit.
        let second = agg.stats("AAPL", BASE + 500).unwrap();
        assert_eq!(first.window_end_ms, second.window_end_ms);

        // 2s later the cache is stale and the window slides.
        let third = agg.stats("AAPL", BASE + 2_000).unwrap();
        assert_eq!(third.window_end_ms, BASE + 2_000);
    }

    // ==================== Cleanup Tests ====================

    #[test]
    fn test_cleanup_evicts_and_drops_empty_symbols() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(2), 1, BASE - 90_000));
        agg.add_trade(&print_at("TSLA", "O:TSLA241220C00200000", dec!(5), 2, BASE - 10_000));

        assert_eq!(agg.active_symbols(), 2);

        let evicted = agg.cleanup(BASE);
        assert_eq!(evicted, 1);
        assert_eq!(agg.active_symbols(), 1);
        assert_eq!(agg.evicted_total(), 1);
        assert!(agg.stats("AAPL", BASE).is_none());
        assert!(agg.stats("TSLA", BASE).is_some());
    }

    // ==================== Ranking Tests ====================

    #[test]
    fn test_top_symbols_by_notional() {
        let agg = aggregator();
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(1), 10, BASE)); // 1,000
        agg.add_trade(&print_at("TSLA", "O:TSLA241220C00200000", dec!(5), 10, BASE)); // 5,000
        agg.add_trade(&print_at("NVDA", "O:NVDA250321C00880000", dec!(3), 10, BASE)); // 3,000

        let ranked = agg.top_symbols(2, RankMetric::Notional, BASE);

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].symbol, "TSLA");
        assert_eq!(ranked[1].symbol, "NVDA");
    }

    #[test]
    fn test_top_symbols_ties_break_by_symbol() {
        let agg = aggregator();
        agg.add_trade(&print_at("TSLA", "O:TSLA241220C00200000", dec!(1), 10, BASE));
        agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(1), 10, BASE));

        let ranked = agg.top_symbols(10, RankMetric::Notional, BASE);

        assert_eq!(ranked[0].symbol, "AAPL");
        assert_eq!(ranked[1].symbol, "TSLA");
    }

    #[test]
    fn test_top_symbols_by_trade_count() {
        let agg = aggregator();
        for _ in 0..3 {
            agg.add_trade(&print_at("AAPL", "O:AAPL241220C00150000", dec!(1), 1, BASE));
        }
        agg.add_trade(&print_at("TSLA", "O:TSLA241220C00200000", dec!(50), 100, BASE));

        let ranked = agg.top_symbols(1, RankMetric::TradeCount, BASE);
        assert_eq!(ranked[0].symbol, "AAPL");
    }
}
