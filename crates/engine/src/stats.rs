//! Lightweight counters, grounded on the original's `StatsLogger`.
//!
//! The original periodically logs memory and throughput counters; we keep
//! the counters (atomics, no background thread needed since `tracing`
//! already owns log transport) and log a summary line every
//! `MEMORY_LOG_INTERVAL`-equivalent number of resolves.

use std::sync::atomic::{AtomicU64, Ordering};

/// How many `resolve` calls between summary log lines, matching the
/// original's `MEMORY_LOG_INTERVAL = 15`.
const LOG_INTERVAL: u64 = 15;

/// Process-wide resolve/acquire/move counters.
#[derive(Default)]
pub struct Stats {
    resolves: AtomicU64,
    cache_hits: AtomicU64,
    acquired: AtomicU64,
    moved: AtomicU64,
    timed_out: AtomicU64,
}

impl Stats {
    /// A fresh, zeroed counter set.
    pub fn new() -> Self {
        Stats::default()
    }

    /// Record one `resolve` call; logs a summary every [`LOG_INTERVAL`]
    /// calls.
    pub fn record_resolve(&self, cached: usize, acquired: usize, moved: usize, timed_out: usize) {
        self.cache_hits.fetch_add(cached as u64, Ordering::Relaxed);
        self.acquired.fetch_add(acquired as u64, Ordering::Relaxed);
        self.moved.fetch_add(moved as u64, Ordering::Relaxed);
        self.timed_out.fetch_add(timed_out as u64, Ordering::Relaxed);
        let total = self.resolves.fetch_add(1, Ordering::Relaxed) + 1;
        if total % LOG_INTERVAL == 0 {
            tracing::info!(
                resolves = total,
                cache_hits = self.cache_hits.load(Ordering::Relaxed),
                acquired = self.acquired.load(Ordering::Relaxed),
                moved = self.moved.load(Ordering::Relaxed),
                timed_out = self.timed_out.load(Ordering::Relaxed),
                "resolve stats"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::new();
        stats.record_resolve(1, 2, 3, 0);
        stats.record_resolve(1, 0, 0, 1);
        assert_eq!(stats.cache_hits.load(Ordering::Relaxed), 2);
        assert_eq!(stats.acquired.load(Ordering::Relaxed), 2);
        assert_eq!(stats.moved.load(Ordering::Relaxed), 3);
        assert_eq!(stats.timed_out.load(Ordering::Relaxed), 1);
    }
}
