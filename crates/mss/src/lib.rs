//! MSS: a memory snapshot subsystem for long-lived packet-processing buffers.
//!
//! This is the top-level facade crate that re-exports the public API from
//! the `mss-*` sub-crates. Applications that link from C use `mss-ffi`
//! instead.
//!
//! # Quick start
//!
//! ```rust
//! use mss::prelude::*;
//!
//! let mss = Mss::init(EngineConfig::new("0-3")?)?;
//! let buf = mss.allocate(4096, 64)?;
//!
//! // Pages 0 and 1 are dirty; commit only those.
//! mss.with_active(buf, |bytes| bytes[..2048].fill(0xAA))?;
//! let receipt = mss.snapshot(buf, &SegmentList::from(&[(0u64, 2u64)][..]))?;
//! assert_eq!(receipt.version, 1);
//!
//! // Recover from gamma after a fault.
//! let (pages, _) = mss.read_gamma(buf, &SegmentList::from(&[(0u64, 4u64)][..]))?;
//! assert!(pages[..2048].iter().all(|&b| b == 0xAA));
//!
//! mss.free(buf)?;
//! mss.shutdown()?;
//! # Ok::<(), MssError>(())
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `mss-core` | Segments, geometry, handles, deltas, errors |
//! | [`arena`] | `mss-arena` | Region providers and the allocation adapter |
//! | [`engine`] | `mss-engine` | The `Mss` subsystem, config and housekeeping |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Segments, page geometry, handles, deltas and errors (`mss-core`).
pub use mss_core as types;

/// Region providers and the allocation adapter (`mss-arena`).
///
/// Implement [`arena::RegionProvider`] to back buffers with a hugepage or
/// NUMA-local pool instead of the process heap.
pub use mss_arena as arena;

/// The snapshot subsystem itself (`mss-engine`).
pub use mss_engine as engine;

/// Common imports for typical MSS usage.
///
/// ```rust
/// use mss::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use mss_core::{BufferId, CommitOrigin, DeltaSink, Segment, SegmentList, SnapshotDelta};

    // Errors
    pub use mss_core::{MssError, SegmentError};

    // Regions
    pub use mss_arena::{HeapProvider, RegionProvider};

    // Engine
    pub use mss_engine::{
        CommitReceipt, EngineConfig, Mss, MssBuilder, MssMetrics, RawRegion, ShutdownReport,
    };
}
