//! Region allocation adapter for the memory snapshot subsystem.
//!
//! Sits between the engine and whatever supplies large aligned memory
//! (a hugepage pool, a NUMA-aware allocator, or the process heap).
//! This crate is one of two that may contain `unsafe` code (along with
//! `mss-ffi`); it is confined to `raw.rs` and `region.rs`.
//!
//! # Architecture
//!
//! ```text
//! RegionAllocator (adapter)
//! ├── Arc<dyn RegionProvider>   (external pool; HeapProvider by default)
//! ├── raw table: address → RegionBlock   (unmanaged allocations)
//! └── RegionCounters            (live / peak bytes, shared with blocks)
//! ```
//!
//! A [`RegionBlock`] owns its memory and returns it to the provider when
//! dropped, so freeing is ownership-driven everywhere except the raw path,
//! where the adapter holds blocks on the caller's behalf until
//! [`RegionAllocator::raw_free`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod allocator;
pub mod error;
pub mod provider;
mod raw;
pub mod region;

pub use allocator::{raw_align, RegionAllocator, RegionStats, DEFAULT_RAW_ALIGN};
pub use error::RegionError;
pub use provider::{HeapProvider, RegionProvider};
pub use region::RegionBlock;
