//! Page geometry and segment validation.
//!
//! [`PageGeometry`] is the only place segments are checked against a
//! buffer. A successful [`validate`](PageGeometry::validate) returns
//! [`ValidatedRanges`], and the copy paths only accept that type, so a
//! byte is never moved on behalf of an unchecked request.

use smallvec::SmallVec;

use crate::error::SegmentError;
use crate::segment::{Segment, SegmentList};

/// Smallest page size accepted by [`PageGeometry::new`].
pub const MIN_PAGE_SIZE: usize = 64;

/// A byte-addressed range inside a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ByteRange {
    /// Byte offset from the buffer base.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl ByteRange {
    /// One past the last byte.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// The range as a `Range<usize>` for slicing.
    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

/// Page layout of a buffer: page size and number of whole pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGeometry {
    page_size: usize,
    page_count: u64,
}

impl PageGeometry {
    /// Geometry of `page_count` pages of `page_size` bytes.
    ///
    /// Returns `None` if `page_size` is not a power of two, is below
    /// [`MIN_PAGE_SIZE`], or the total byte length overflows `usize`.
    pub fn new(page_size: usize, page_count: u64) -> Option<Self> {
        if !page_size.is_power_of_two() || page_size < MIN_PAGE_SIZE {
            return None;
        }
        let pages = usize::try_from(page_count).ok()?;
        pages.checked_mul(page_size)?;
        Some(Self {
            page_size,
            page_count,
        })
    }

    /// Smallest geometry of whole pages holding at least `byte_len` bytes.
    pub fn covering(byte_len: usize, page_size: usize) -> Option<Self> {
        if page_size == 0 {
            return None;
        }
        let pages = byte_len.div_ceil(page_size);
        Self::new(page_size, pages as u64)
    }

    /// Page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages.
    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    /// Total size in bytes (`page_size * page_count`).
    pub fn byte_len(&self) -> usize {
        self.page_size * self.page_count as usize
    }

    /// Byte range of an already-bounds-checked segment.
    fn byte_range(&self, segment: Segment) -> ByteRange {
        ByteRange {
            offset: segment.page_offset as usize * self.page_size,
            len: segment.page_count as usize * self.page_size,
        }
    }

    /// Check a segment list against this geometry.
    ///
    /// Rejects, in this order: zero-length segments and segments that run
    /// past the last page (reported for the first offending index), then
    /// any pair of overlapping segments. A segment ending exactly at
    /// `page_count` is in bounds.
    pub fn validate(&self, segments: &SegmentList) -> Result<ValidatedRanges, SegmentError> {
        for (index, segment) in segments.iter().enumerate() {
            if segment.page_count == 0 {
                return Err(SegmentError::ZeroLength { index });
            }
            match segment.end() {
                Some(end) if end <= self.page_count => {}
                _ => {
                    return Err(SegmentError::OutOfBounds {
                        index,
                        segment: *segment,
                        page_capacity: self.page_count,
                    })
                }
            }
        }

        let mut order: SmallVec<[usize; 8]> = (0..segments.len()).collect();
        let list = segments.as_slice();
        order.sort_unstable_by_key(|&i| (list[i].page_offset, i));

        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if list[a].overlaps(&list[b]) {
                return Err(SegmentError::Overlap {
                    first: a.min(b),
                    second: a.max(b),
                });
            }
        }

        Ok(ValidatedRanges {
            ranges: order.iter().map(|&i| self.byte_range(list[i])).collect(),
            caller_order: segments.iter().map(|&s| self.byte_range(s)).collect(),
        })
    }
}

/// Byte ranges of a segment list that passed [`PageGeometry::validate`].
///
/// Ranges are pairwise disjoint and inside the buffer. They are kept both
/// sorted by offset (for applying copies) and in caller order (for reads
/// that return bytes in the order requested).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedRanges {
    ranges: SmallVec<[ByteRange; 8]>,
    caller_order: SmallVec<[ByteRange; 8]>,
}

impl ValidatedRanges {
    /// Ranges sorted by ascending offset.
    pub fn sorted(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Ranges in the order the caller listed the segments.
    pub fn in_caller_order(&self) -> &[ByteRange] {
        &self.caller_order
    }

    /// Whether there is nothing to copy.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total bytes covered.
    pub fn total_bytes(&self) -> usize {
        self.ranges.iter().map(|r| r.len).sum()
    }

    /// One past the furthest byte touched, or 0 when empty.
    pub fn extent(&self) -> usize {
        self.ranges.last().map_or(0, |r| r.end())
    }
}
