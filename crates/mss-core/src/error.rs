//! Error types for the memory snapshot subsystem.
//!
//! [`SegmentError`] is produced by segment validation. [`MssError`] is the
//! umbrella error returned by every engine operation; its variants map
//! one-to-one onto the C status codes in `mss-ffi`.

use std::error::Error;
use std::fmt;

use crate::id::BufferId;
use crate::segment::Segment;

/// Why a segment list was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SegmentError {
    /// A segment with `page_count == 0`.
    ZeroLength {
        /// Position of the segment in the caller's list.
        index: usize,
    },
    /// A segment that runs past the buffer's last page.
    OutOfBounds {
        /// Position of the segment in the caller's list.
        index: usize,
        /// The offending segment.
        segment: Segment,
        /// Number of pages in the buffer.
        page_capacity: u64,
    },
    /// Two segments in the same list share a page.
    Overlap {
        /// Lower list index of the overlapping pair.
        first: usize,
        /// Higher list index of the overlapping pair.
        second: usize,
    },
    /// A fill source shorter than the furthest byte the segments address.
    SourceTooShort {
        /// Bytes the segments require.
        required: usize,
        /// Bytes the caller supplied.
        actual: usize,
    },
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroLength { index } => write!(f, "segment {index} has zero pages"),
            Self::OutOfBounds {
                index,
                segment,
                page_capacity,
            } => write!(
                f,
                "segment {index} {segment} exceeds buffer of {page_capacity} pages"
            ),
            Self::Overlap { first, second } => {
                write!(f, "segments {first} and {second} overlap")
            }
            Self::SourceTooShort { required, actual } => write!(
                f,
                "source holds {actual} bytes, segments require {required}"
            ),
        }
    }
}

impl Error for SegmentError {}

/// Errors returned by subsystem operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MssError {
    /// The handle does not name a live buffer (never allocated or freed).
    NotFound {
        /// The unresolved handle.
        buffer: BufferId,
    },
    /// The address is not the base of any live buffer or raw region.
    UnknownAddress {
        /// The unresolved address.
        address: usize,
    },
    /// A segment was zero-length, out of bounds, or the source was short.
    InvalidRange(SegmentError),
    /// Two segments in one list overlap.
    Overlap {
        /// Lower list index of the overlapping pair.
        first: usize,
        /// Higher list index of the overlapping pair.
        second: usize,
    },
    /// The region provider could not satisfy an allocation.
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
        /// Alignment requested.
        align: usize,
    },
    /// An argument was null, zero, or not a power of two.
    InvalidArgument {
        /// What was wrong.
        reason: String,
    },
    /// Subsystem initialisation failed (bad core spec, thread, affinity).
    InitFailure {
        /// Description of the failure.
        reason: String,
    },
    /// `init` was called while a subsystem is already live.
    AlreadyInitialized,
    /// The subsystem is not initialised or has been shut down.
    NotInitialized,
    /// Internal failure, e.g. a lock poisoned by a panicking thread.
    Internal {
        /// Description of the failure.
        reason: String,
    },
}

impl MssError {
    /// Whether this error came from segment validation.
    ///
    /// Validation errors are raised before any byte is copied.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidRange(_) | Self::Overlap { .. })
    }
}

impl fmt::Display for MssError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { buffer } => write!(f, "buffer {buffer} not found"),
            Self::UnknownAddress { address } => {
                write!(f, "address {address:#x} is not a registered buffer")
            }
            Self::InvalidRange(e) => write!(f, "invalid range: {e}"),
            Self::Overlap { first, second } => {
                write!(f, "segments {first} and {second} overlap")
            }
            Self::OutOfMemory { requested, align } => write!(
                f,
                "out of memory: requested {requested} bytes aligned to {align}"
            ),
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::InitFailure { reason } => write!(f, "init failed: {reason}"),
            Self::AlreadyInitialized => write!(f, "subsystem already initialised"),
            Self::NotInitialized => write!(f, "subsystem not initialised"),
            Self::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

impl Error for MssError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRange(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SegmentError> for MssError {
    fn from(e: SegmentError) -> Self {
        match e {
            SegmentError::Overlap { first, second } => Self::Overlap { first, second },
            other => Self::InvalidRange(other),
        }
    }
}
