//! Subsystem counters.
//!
//! [`MssMetrics`] is a point-in-time report assembled by
//! [`Mss::metrics`](crate::Mss::metrics) from the engine's cumulative
//! counters, the registry and the region allocator.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters updated on the commit path.
#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub(crate) snapshots: AtomicU64,
    pub(crate) fills: AtomicU64,
    pub(crate) bytes_committed: AtomicU64,
    pub(crate) rejected_calls: AtomicU64,
    pub(crate) gamma_created: AtomicU64,
    pub(crate) deltas_emitted: AtomicU64,
    pub(crate) deltas_dropped: AtomicU64,
}

impl EngineCounters {
    pub(crate) fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn read(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Usage report for one subsystem instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MssMetrics {
    /// Successful `snapshot` calls.
    pub snapshots: u64,
    /// Successful `fill_gamma` calls.
    pub fills: u64,
    /// Bytes copied into gamma buffers.
    pub bytes_committed: u64,
    /// Calls rejected by validation or lookup.
    pub rejected_calls: u64,
    /// Gamma buffers created lazily.
    pub gamma_created: u64,
    /// Registered active buffers.
    pub live_buffers: usize,
    /// Raw regions outstanding.
    pub raw_regions: usize,
    /// Bytes currently held from the region provider.
    pub region_bytes_live: usize,
    /// Highest `region_bytes_live` observed.
    pub region_bytes_peak: usize,
    /// Deltas handed to the housekeeping queue.
    pub deltas_emitted: u64,
    /// Deltas discarded because the queue was full.
    pub deltas_dropped: u64,
}

impl MssMetrics {
    pub(crate) fn from_counters(c: &EngineCounters) -> Self {
        Self {
            snapshots: EngineCounters::read(&c.snapshots),
            fills: EngineCounters::read(&c.fills),
            bytes_committed: EngineCounters::read(&c.bytes_committed),
            rejected_calls: EngineCounters::read(&c.rejected_calls),
            gamma_created: EngineCounters::read(&c.gamma_created),
            deltas_emitted: EngineCounters::read(&c.deltas_emitted),
            deltas_dropped: EngineCounters::read(&c.deltas_dropped),
            ..Self::default()
        }
    }
}
