//! Benchmark profiles for the memory snapshot subsystem.
//!
//! - [`bench_subsystem`]: an unpinned engine with default page size
//! - [`strided_segments`]: every `stride`-th page, one page per segment
//! - [`dirty_pages`]: a deterministic dirty set driven by a seed

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use mss_core::{Segment, SegmentList};
use mss_engine::{EngineConfig, Mss};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Page size used by every profile.
pub const BENCH_PAGE: usize = EngineConfig::DEFAULT_PAGE_SIZE;

/// Start a subsystem on core 0 with delta capture as requested.
pub fn bench_subsystem(capture_deltas: bool) -> Mss {
    let config = EngineConfig {
        capture_deltas,
        ..EngineConfig::new("0").unwrap()
    };
    Mss::init(config).unwrap()
}

/// One single-page segment for every `stride`-th page of `pages`.
pub fn strided_segments(pages: u64, stride: u64) -> SegmentList {
    (0..pages)
        .step_by(stride.max(1) as usize)
        .map(|p| Segment::new(p, 1))
        .collect()
}

/// A dirty-page list covering roughly `percent` of `pages`.
///
/// Pages are drawn from a `ChaCha8Rng` seeded with `seed`, then coalesced
/// through a bitmap so adjacent dirty pages form one segment.
pub fn dirty_pages(pages: u64, percent: u32, seed: u64) -> SegmentList {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut bitmap = vec![0u64; pages.div_ceil(64) as usize];
    for page in 0..pages {
        if rng.random_range(0..100u32) < percent {
            bitmap[(page / 64) as usize] |= 1 << (page % 64);
        }
    }
    SegmentList::from_dirty_bitmap(&bitmap, pages)
}
