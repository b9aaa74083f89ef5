//! Test fixtures for memory snapshot subsystem development.
//!
//! Byte-pattern helpers, segment shorthands, a [`RecordingSink`] that
//! keeps every delta it is given, and a capped region pool for driving
//! `OutOfMemory` paths.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{capped_pool, RecordingSink};

use std::sync::Once;

use mss_core::SegmentList;

/// Page size used throughout the test suites.
pub const PAGE: usize = 1024;

/// Build a segment list from `(page_offset, page_count)` pairs.
pub fn segs(pairs: &[(u64, u64)]) -> SegmentList {
    SegmentList::from(pairs)
}

/// Deterministic, position-dependent bytes: `seed` mixed with the index.
///
/// Different seeds give different content on every page, so copies from
/// the wrong offset are caught.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ ((i >> 8) as u8))
        .collect()
}

/// Byte range of page span `(offset, count)` at [`PAGE`] size.
pub fn page_bytes(offset: u64, count: u64) -> std::ops::Range<usize> {
    let start = offset as usize * PAGE;
    start..start + count as usize * PAGE
}

/// Install a test-writer subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}
