//! Page-indexed segments and segment lists.
//!
//! A [`Segment`] names a contiguous run of pages inside one buffer. A
//! [`SegmentList`] is the ordered set of runs touched by one snapshot or
//! fill call. Neither type knows the buffer it will be applied to; bounds
//! and overlap are checked by [`PageGeometry::validate`](crate::PageGeometry::validate).

use std::fmt;

use smallvec::SmallVec;

/// A contiguous run of `page_count` pages starting at `page_offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Segment {
    /// First page of the run.
    pub page_offset: u64,
    /// Number of pages in the run. Must be non-zero to be valid.
    pub page_count: u64,
}

impl Segment {
    /// Create a segment covering `page_count` pages from `page_offset`.
    pub const fn new(page_offset: u64, page_count: u64) -> Self {
        Self {
            page_offset,
            page_count,
        }
    }

    /// One past the last page, or `None` if the end overflows `u64`.
    pub fn end(&self) -> Option<u64> {
        self.page_offset.checked_add(self.page_count)
    }

    /// Whether the two runs share at least one page.
    ///
    /// Zero-length segments overlap nothing.
    pub fn overlaps(&self, other: &Segment) -> bool {
        if self.page_count == 0 || other.page_count == 0 {
            return false;
        }
        let self_end = self.end().unwrap_or(u64::MAX);
        let other_end = other.end().unwrap_or(u64::MAX);
        self.page_offset < other_end && other.page_offset < self_end
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_offset, self.page_count)
    }
}

impl From<(u64, u64)> for Segment {
    fn from((page_offset, page_count): (u64, u64)) -> Self {
        Self::new(page_offset, page_count)
    }
}

/// Ordered list of segments touched by one operation.
///
/// Order is preserved exactly as given; the engine sorts a validated copy
/// internally when it needs to. Most calls touch a handful of runs, so up
/// to eight are stored inline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentList {
    segments: SmallVec<[Segment; 8]>,
}

impl SegmentList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment.
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    /// Number of segments in the list.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Iterate segments in caller order.
    pub fn iter(&self) -> std::slice::Iter<'_, Segment> {
        self.segments.iter()
    }

    /// The segments as a slice, in caller order.
    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    /// Sum of `page_count` over all segments (saturating).
    pub fn total_pages(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.page_count))
    }

    /// Coalesce a dirty-page bitmap into the minimal list of runs.
    ///
    /// Bit `j` of `words[i]` marks page `i * 64 + j` dirty. Bits at or
    /// beyond `page_capacity` are ignored. Adjacent dirty pages are merged
    /// into one segment, so the result is sorted and non-overlapping.
    pub fn from_dirty_bitmap(words: &[u64], page_capacity: u64) -> Self {
        let mut list = Self::new();
        let mut run_start: Option<u64> = None;

        for (i, &word) in words.iter().enumerate() {
            let base = i as u64 * 64;
            if base >= page_capacity {
                break;
            }
            // Fast paths for whole words.
            if word == 0 {
                if let Some(start) = run_start.take() {
                    list.push(Segment::new(start, base - start));
                }
                continue;
            }
            if word == u64::MAX && base + 64 <= page_capacity {
                run_start.get_or_insert(base);
                continue;
            }
            for j in 0..64u64 {
                let page = base + j;
                if page >= page_capacity {
                    break;
                }
                let dirty = (word >> j) & 1 == 1;
                match (dirty, run_start) {
                    (true, None) => run_start = Some(page),
                    (false, Some(start)) => {
                        list.push(Segment::new(start, page - start));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        if let Some(start) = run_start {
            let end = (words.len() as u64 * 64).min(page_capacity);
            list.push(Segment::new(start, end - start));
        }
        list
    }
}

impl FromIterator<Segment> for SegmentList {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self {
            segments: iter.into_iter().collect(),
        }
    }
}

impl From<Vec<Segment>> for SegmentList {
    fn from(v: Vec<Segment>) -> Self {
        Self {
            segments: SmallVec::from_vec(v),
        }
    }
}

impl From<&[(u64, u64)]> for SegmentList {
    fn from(pairs: &[(u64, u64)]) -> Self {
        pairs.iter().copied().map(Segment::from).collect()
    }
}

impl<'a> IntoIterator for &'a SegmentList {
    type Item = &'a Segment;
    type IntoIter = std::slice::Iter<'a, Segment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_detects_overflow() {
        assert_eq!(Segment::new(10, 5).end(), Some(15));
        assert_eq!(Segment::new(u64::MAX, 1).end(), None);
    }

    #[test]
    fn overlap_is_symmetric_and_excludes_adjacent() {
        let a = Segment::new(0, 4);
        let b = Segment::new(3, 2);
        let c = Segment::new(4, 2);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn zero_length_overlaps_nothing() {
        let a = Segment::new(0, 10);
        let z = Segment::new(5, 0);
        assert!(!a.overlaps(&z));
    }

    #[test]
    fn list_preserves_caller_order() {
        let list: SegmentList = [(4, 1), (0, 2)].as_slice().into();
        assert_eq!(list.as_slice()[0], Segment::new(4, 1));
        assert_eq!(list.as_slice()[1], Segment::new(0, 2));
        assert_eq!(list.total_pages(), 3);
    }

    #[test]
    fn bitmap_empty_gives_empty_list() {
        assert!(SegmentList::from_dirty_bitmap(&[0, 0], 128).is_empty());
    }

    #[test]
    fn bitmap_single_runs() {
        // Pages 1,2,3 and 6 dirty.
        let list = SegmentList::from_dirty_bitmap(&[0b0100_1110], 64);
        assert_eq!(
            list.as_slice(),
            &[Segment::new(1, 3), Segment::new(6, 1)]
        );
    }

    #[test]
    fn bitmap_run_spans_word_boundary() {
        // Page 63 and pages 64..66 dirty -> one run of 4.
        let words = [1u64 << 63, 0b111];
        let list = SegmentList::from_dirty_bitmap(&words, 128);
        assert_eq!(list.as_slice(), &[Segment::new(63, 4)]);
    }

    #[test]
    fn bitmap_full_words_merge() {
        let words = [u64::MAX, u64::MAX, 0];
        let list = SegmentList::from_dirty_bitmap(&words, 192);
        assert_eq!(list.as_slice(), &[Segment::new(0, 128)]);
    }

    #[test]
    fn bitmap_ignores_bits_beyond_capacity() {
        let list = SegmentList::from_dirty_bitmap(&[u64::MAX], 10);
        assert_eq!(list.as_slice(), &[Segment::new(0, 10)]);
    }

    #[test]
    fn bitmap_trailing_run_closes_at_capacity() {
        let words = [0, u64::MAX];
        let list = SegmentList::from_dirty_bitmap(&words, 100);
        assert_eq!(list.as_slice(), &[Segment::new(64, 36)]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn bitmap_segments_cover_exactly_the_dirty_pages(
                words in proptest::collection::vec(any::<u64>(), 0..6),
                capacity in 0u64..400,
            ) {
                let list = SegmentList::from_dirty_bitmap(&words, capacity);

                let mut expected = Vec::new();
                for page in 0..capacity.min(words.len() as u64 * 64) {
                    let word = words[(page / 64) as usize];
                    if (word >> (page % 64)) & 1 == 1 {
                        expected.push(page);
                    }
                }

                let mut covered = Vec::new();
                for seg in &list {
                    prop_assert!(seg.page_count > 0);
                    covered.extend(seg.page_offset..seg.page_offset + seg.page_count);
                }
                prop_assert_eq!(covered, expected);

                // Runs are maximal: no two segments touch.
                for pair in list.as_slice().windows(2) {
                    prop_assert!(pair[0].page_offset + pair[0].page_count < pair[1].page_offset);
                }
            }
        }
    }
}
