//! C-compatible subsystem counters.

use mss_engine::MssMetrics;

/// Counters reported by `mss_metrics`.
///
/// Fixed-width fields for ABI portability.
#[repr(C)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MssCounters {
    /// Successful snapshots.
    pub snapshots: u64,
    /// Successful gamma fills.
    pub fills: u64,
    /// Bytes copied into gamma buffers.
    pub bytes_committed: u64,
    /// Calls rejected by validation or lookup.
    pub rejected_calls: u64,
    /// Gamma buffers created.
    pub gamma_created: u64,
    /// Registered active buffers.
    pub live_buffers: u64,
    /// Raw regions outstanding.
    pub raw_regions: u64,
    /// Bytes held from the region pool.
    pub region_bytes_live: u64,
    /// Peak of `region_bytes_live`.
    pub region_bytes_peak: u64,
    /// Deltas queued for the housekeeping worker.
    pub deltas_emitted: u64,
    /// Deltas dropped on a full queue.
    pub deltas_dropped: u64,
}

const _: () = assert!(std::mem::size_of::<MssCounters>() == 88);
const _: () = assert!(std::mem::align_of::<MssCounters>() == 8);

impl MssCounters {
    pub(crate) fn from_rust(m: &MssMetrics) -> Self {
        Self {
            snapshots: m.snapshots,
            fills: m.fills,
            bytes_committed: m.bytes_committed,
            rejected_calls: m.rejected_calls,
            gamma_created: m.gamma_created,
            live_buffers: m.live_buffers as u64,
            raw_regions: m.raw_regions as u64,
            region_bytes_live: m.region_bytes_live as u64,
            region_bytes_peak: m.region_bytes_peak as u64,
            deltas_emitted: m.deltas_emitted,
            deltas_dropped: m.deltas_dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_widen_usize_fields() {
        let m = MssMetrics {
            live_buffers: 3,
            region_bytes_peak: 8192,
            snapshots: 5,
            ..MssMetrics::default()
        };
        let c = MssCounters::from_rust(&m);
        assert_eq!(c.live_buffers, 3);
        assert_eq!(c.region_bytes_peak, 8192);
        assert_eq!(c.snapshots, 5);
    }
}
