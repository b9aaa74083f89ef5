//! Snapshot engine for the memory snapshot subsystem.
//!
//! Provides [`Mss`], the context object that owns the buffer registry,
//! the region allocator and the housekeeping worker. Applications
//! allocate active buffers through it, mutate them freely, and commit
//! selected page ranges into each buffer's gamma shadow with
//! [`Mss::snapshot`] (from the active bytes) or [`Mss::fill_gamma`] (from a
//! caller-supplied image).
//!
//! # Example
//!
//! ```
//! use mss_core::SegmentList;
//! use mss_engine::{EngineConfig, Mss};
//!
//! let mss = Mss::init(EngineConfig::new("0-3")?)?;
//! let buf = mss.allocate(4096, 64)?;
//! mss.with_active(buf, |bytes| bytes[..2048].fill(0xAA))?;
//! mss.snapshot(buf, &SegmentList::from(&[(0u64, 2u64)][..]))?;
//! let (gamma, _version) = mss.read_gamma(buf, &SegmentList::from(&[(0u64, 3u64)][..]))?;
//! assert!(gamma[..2048].iter().all(|&b| b == 0xAA));
//! assert!(gamma[2048..].iter().all(|&b| b == 0));
//! mss.free(buf)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod affinity;
pub mod config;
mod entry;
pub mod housekeeping;
pub mod metrics;
mod registry;
pub mod snapshot;
pub mod subsystem;

pub use config::{ConfigError, CoreSpec, EngineConfig};
pub use housekeeping::LogSink;
pub use metrics::MssMetrics;
pub use snapshot::CommitReceipt;
pub use subsystem::{BufferInfo, Mss, MssBuilder, RawRegion, ShutdownReport};
