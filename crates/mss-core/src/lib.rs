//! Core types for the memory snapshot subsystem.
//!
//! Defines the vocabulary shared by every other `mss-*` crate: page-indexed
//! [`Segment`]s and [`SegmentList`]s, the [`PageGeometry`] that validates them
//! against a buffer, the opaque [`BufferId`] handle, the delta records handed
//! to the housekeeping worker, and the error taxonomy.
//!
//! This crate contains no `unsafe` code.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod delta;
pub mod error;
pub mod geometry;
pub mod id;
pub mod segment;

pub use delta::{CommitOrigin, DeltaSink, SnapshotDelta};
pub use error::{MssError, SegmentError};
pub use geometry::{ByteRange, PageGeometry, ValidatedRanges};
pub use id::BufferId;
pub use segment::{Segment, SegmentList};
