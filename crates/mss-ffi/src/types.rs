//! C-compatible argument structs.

use mss_core::{Segment, SegmentList};
use mss_engine::{ConfigError, EngineConfig};

use crate::status::MssStatus;

/// A run of whole pages: `(page_offset, page_count)`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MssSegment {
    /// First page of the run.
    pub page_offset: u64,
    /// Number of pages; must be non-zero.
    pub page_count: u64,
}

const _: () = assert!(std::mem::size_of::<MssSegment>() == 16);

impl From<MssSegment> for Segment {
    fn from(s: MssSegment) -> Self {
        Segment::new(s.page_offset, s.page_count)
    }
}

/// Optional settings for `mss_init_with_config`. Zero fields take defaults.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MssConfig {
    /// Page size in bytes; 0 selects 1024.
    pub page_size: u64,
    /// Housekeeping queue depth; 0 selects 64.
    pub delta_queue_depth: u32,
    /// Non-zero binds the housekeeping worker to the first listed core.
    pub pin_threads: u8,
    /// Non-zero records an XOR delta for every commit.
    pub capture_deltas: u8,
}

impl MssConfig {
    pub(crate) fn apply(&self, config: &mut EngineConfig) -> Result<(), ConfigError> {
        if self.page_size != 0 {
            config.page_size =
                usize::try_from(self.page_size).map_err(|_| ConfigError::InvalidPageSize {
                    value: usize::MAX,
                })?;
        }
        if self.delta_queue_depth != 0 {
            config.delta_queue_depth = self.delta_queue_depth as usize;
        }
        config.pin_threads = self.pin_threads != 0;
        config.capture_deltas = self.capture_deltas != 0;
        Ok(())
    }
}

/// Copy a C segment array into a [`SegmentList`].
///
/// # Safety
///
/// When `count > 0`, `ptr` must point to `count` readable `MssSegment`s.
#[allow(unsafe_code)]
pub(crate) unsafe fn segment_list(
    ptr: *const MssSegment,
    count: usize,
) -> Result<SegmentList, MssStatus> {
    if count == 0 {
        return Ok(SegmentList::new());
    }
    if ptr.is_null() {
        return Err(MssStatus::InvalidArgument);
    }
    // SAFETY: non-null and valid for `count` elements per caller contract.
    let raw = unsafe { std::slice::from_raw_parts(ptr, count) };
    Ok(raw.iter().copied().map(Segment::from).collect())
}
