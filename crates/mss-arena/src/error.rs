//! Region allocation error types.

use std::error::Error;
use std::fmt;

use mss_core::MssError;

/// Errors from the region allocation adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionError {
    /// Size is zero, alignment is not a power of two, or the rounded size
    /// overflows.
    InvalidLayout {
        /// Requested size in bytes.
        size: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// The provider has no memory left for this request.
    OutOfMemory {
        /// Requested size in bytes.
        requested: usize,
        /// Requested alignment in bytes.
        align: usize,
    },
    /// The adapter was closed by subsystem shutdown.
    Closed,
    /// `raw_free` on an address the adapter did not hand out (or already
    /// took back).
    UnknownRegion {
        /// The unrecognised address.
        address: usize,
    },
    /// The raw-region table lock was poisoned by a panicking thread.
    Poisoned,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLayout { size, align } => {
                write!(f, "invalid layout: size {size}, align {align}")
            }
            Self::OutOfMemory { requested, align } => {
                write!(
                    f,
                    "region provider exhausted: requested {requested} bytes aligned to {align}"
                )
            }
            Self::Closed => write!(f, "region allocator is closed"),
            Self::UnknownRegion { address } => {
                write!(f, "no raw region at {address:#x}")
            }
            Self::Poisoned => write!(f, "raw region table poisoned"),
        }
    }
}

impl Error for RegionError {}

impl From<RegionError> for MssError {
    fn from(e: RegionError) -> Self {
        match e {
            RegionError::InvalidLayout { size, align } => MssError::InvalidArgument {
                reason: format!("size {size} / align {align} is not a valid layout"),
            },
            RegionError::OutOfMemory { requested, align } => {
                MssError::OutOfMemory { requested, align }
            }
            RegionError::Closed => MssError::NotInitialized,
            RegionError::UnknownRegion { address } => MssError::UnknownAddress { address },
            RegionError::Poisoned => MssError::Internal {
                reason: "raw region table poisoned".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_memory_keeps_request() {
        let e: MssError = RegionError::OutOfMemory {
            requested: 4096,
            align: 64,
        }
        .into();
        assert_eq!(
            e,
            MssError::OutOfMemory {
                requested: 4096,
                align: 64
            }
        );
    }

    #[test]
    fn closed_maps_to_not_initialized() {
        assert_eq!(MssError::from(RegionError::Closed), MssError::NotInitialized);
    }

    #[test]
    fn unknown_region_maps_to_unknown_address() {
        assert_eq!(
            MssError::from(RegionError::UnknownRegion { address: 0x1000 }),
            MssError::UnknownAddress { address: 0x1000 }
        );
    }
}
