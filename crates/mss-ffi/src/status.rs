//! C-compatible status codes.
//!
//! [`MssStatus`] is a `repr(i32)` enum; `Ok` is 0 and every failure is
//! negative. Values are ABI-stable across releases.

use mss_core::MssError;

/// Status code returned by every `mss_*` function that returns `int32_t`.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MssStatus {
    /// Success.
    Ok = 0,
    /// Pointer is not a live buffer or raw region of this subsystem.
    NotFound = -1,
    /// A segment is zero-length or out of bounds, or the source is short.
    InvalidRange = -2,
    /// Two segments in one list overlap.
    Overlap = -3,
    /// The region pool is exhausted.
    OutOfMemory = -4,
    /// Core list rejected, worker could not start or be bound.
    InitFailure = -5,
    /// `mss_init` called while a subsystem is live.
    AlreadyInitialized = -6,
    /// No live subsystem.
    NotInitialized = -7,
    /// Internal failure, e.g. a lock poisoned by an earlier panic.
    IoFailure = -8,
    /// A pointer argument is null or a numeric argument is unusable.
    InvalidArgument = -9,
    /// A Rust panic was caught at the boundary.
    Panicked = -128,
}

impl From<&MssError> for MssStatus {
    fn from(e: &MssError) -> Self {
        match e {
            MssError::NotFound { .. } | MssError::UnknownAddress { .. } => MssStatus::NotFound,
            MssError::InvalidRange(_) => MssStatus::InvalidRange,
            MssError::Overlap { .. } => MssStatus::Overlap,
            MssError::OutOfMemory { .. } => MssStatus::OutOfMemory,
            MssError::InvalidArgument { .. } => MssStatus::InvalidArgument,
            MssError::InitFailure { .. } => MssStatus::InitFailure,
            MssError::AlreadyInitialized => MssStatus::AlreadyInitialized,
            MssError::NotInitialized => MssStatus::NotInitialized,
            MssError::Internal { .. } => MssStatus::IoFailure,
        }
    }
}

impl From<Result<(), MssError>> for MssStatus {
    fn from(r: Result<(), MssError>) -> Self {
        match r {
            Ok(()) => MssStatus::Ok,
            Err(e) => MssStatus::from(&e),
        }
    }
}
