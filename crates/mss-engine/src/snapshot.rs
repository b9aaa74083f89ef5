//! The commit state machine shared by `snapshot` and `fill_gamma`.
//!
//! A commit runs entirely under the entry's gamma lock: the lazy
//! `Unassociated -> Associated` transition, every per-range copy and the
//! version bump. Gamma readers take the same lock, so they observe a
//! commit either completely or not at all.

use mss_arena::RegionAllocator;
use mss_core::{BufferId, CommitOrigin, MssError, SnapshotDelta, ValidatedRanges};
use tracing::trace;

use crate::entry::{BufferEntry, GammaState};

/// Where the committed bytes come from.
pub(crate) enum CommitSource<'a> {
    /// The buffer's own active content at call time.
    Active,
    /// A caller-supplied image indexed like the buffer.
    Image(&'a [u8]),
}

impl CommitSource<'_> {
    fn origin(&self) -> CommitOrigin {
        match self {
            Self::Active => CommitOrigin::Snapshot,
            Self::Image(_) => CommitOrigin::Fill,
        }
    }
}

/// Outcome of a successful `snapshot` or `fill_gamma`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitReceipt {
    /// The buffer whose gamma was written.
    pub buffer: BufferId,
    /// Gamma version after the commit. Unchanged for an empty list.
    pub version: u64,
    /// Segments applied.
    pub segments: usize,
    /// Bytes copied into gamma.
    pub bytes: usize,
    /// Whether this commit created the gamma buffer.
    pub gamma_created: bool,
}

#[derive(Debug)]
pub(crate) struct Commit {
    pub(crate) receipt: CommitReceipt,
    pub(crate) delta: Option<SnapshotDelta>,
}

/// Apply validated ranges from `source` into the entry's gamma.
///
/// `ranges` must come from `entry.geometry().validate(..)` and an image
/// source must cover `ranges.extent()`.
pub(crate) fn commit(
    entry: &BufferEntry,
    ranges: &ValidatedRanges,
    source: CommitSource<'_>,
    allocator: &RegionAllocator,
    capture: bool,
) -> Result<Commit, MssError> {
    let id = entry.id();
    let mut gamma = entry.lock_gamma()?;

    let unassociated = match *gamma {
        GammaState::Released => return Err(MssError::NotFound { buffer: id }),
        GammaState::Unassociated => true,
        GammaState::Associated { .. } => false,
    };
    let mut gamma_created = false;
    if unassociated {
        if ranges.is_empty() {
            return Ok(Commit {
                receipt: CommitReceipt {
                    buffer: id,
                    version: 0,
                    segments: 0,
                    bytes: 0,
                    gamma_created: false,
                },
                delta: None,
            });
        }
        let block = allocator.allocate("gamma", entry.geometry().byte_len(), entry.align())?;
        *gamma = GammaState::Associated { block, version: 0 };
        gamma_created = true;
    }

    let GammaState::Associated { block, version } = &mut *gamma else {
        return Err(MssError::Internal {
            reason: format!("gamma of {id} not associated after creation"),
        });
    };

    if ranges.is_empty() {
        return Ok(Commit {
            receipt: CommitReceipt {
                buffer: id,
                version: *version,
                segments: 0,
                bytes: 0,
                gamma_created,
            },
            delta: None,
        });
    }

    let origin = source.origin();
    let mut xor = if capture {
        Vec::with_capacity(ranges.total_bytes())
    } else {
        Vec::new()
    };
    let dst = block.as_mut_slice();

    for range in ranges.sorted() {
        let target = &mut dst[range.as_range()];
        let record = capture.then_some(&mut xor);
        match &source {
            CommitSource::Image(image) => {
                apply(target, record, |t| t.copy_from_slice(&image[range.as_range()]));
            }
            CommitSource::Active => {
                let active = entry.lock_active();
                let Some(active) = active.as_ref() else {
                    return Err(MssError::NotFound { buffer: id });
                };
                // Raw-pointer writers may race this read; no slice is formed.
                apply(target, record, |t| active.read_into(range.offset, t));
            }
        }
        trace!(buffer = %id, offset = range.offset, len = range.len, "segment applied");
    }

    *version += 1;
    let receipt = CommitReceipt {
        buffer: id,
        version: *version,
        segments: ranges.sorted().len(),
        bytes: ranges.total_bytes(),
        gamma_created,
    };
    let delta = capture.then(|| SnapshotDelta {
        buffer: id,
        origin,
        version: *version,
        ranges: ranges.sorted().to_vec(),
        xor,
    });
    Ok(Commit { receipt, delta })
}

/// Overwrite `dst` with `fill`, recording `old ^ new` when asked.
fn apply(dst: &mut [u8], xor: Option<&mut Vec<u8>>, fill: impl FnOnce(&mut [u8])) {
    let Some(xor) = xor else {
        fill(dst);
        return;
    };
    let mark = xor.len();
    xor.extend_from_slice(dst);
    fill(dst);
    for (x, new) in xor[mark..].iter_mut().zip(dst.iter()) {
        *x ^= new;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mss_arena::HeapProvider;
    use mss_core::{PageGeometry, SegmentList};
    use std::sync::Arc;

    fn setup(pages: u64) -> (RegionAllocator, BufferEntry) {
        let alloc = RegionAllocator::new(Arc::new(HeapProvider::new()));
        let geometry = PageGeometry::new(1024, pages).unwrap();
        let block = alloc.allocate("active", geometry.byte_len(), 1024).unwrap();
        let entry = BufferEntry::new(BufferId::new(0, 0), geometry, geometry.byte_len(), block);
        (alloc, entry)
    }

    fn ranges(entry: &BufferEntry, pairs: &[(u64, u64)]) -> ValidatedRanges {
        entry.geometry().validate(&SegmentList::from(pairs)).unwrap()
    }

    #[test]
    fn first_commit_creates_gamma_and_copies_active() {
        let (alloc, entry) = setup(4);
        entry.with_active(|b| b[..2048].fill(0xAA)).unwrap();

        let listed = ranges(&entry, &[(0, 2)]);
        let commit = commit(&entry, &listed, CommitSource::Active, &alloc, false).unwrap();
        assert!(commit.receipt.gamma_created);
        assert_eq!(commit.receipt.version, 1);
        assert_eq!(commit.receipt.bytes, 2048);
        assert!(commit.delta.is_none());

        entry
            .with_gamma(|g, v| {
                let g = g.unwrap();
                assert_eq!(v, 1);
                assert!(g[..2048].iter().all(|&b| b == 0xAA));
                assert!(g[2048..].iter().all(|&b| b == 0));
            })
            .unwrap();
    }

    #[test]
    fn empty_list_leaves_gamma_unassociated() {
        let (alloc, entry) = setup(2);
        let listed = ranges(&entry, &[]);
        let commit = commit(&entry, &listed, CommitSource::Active, &alloc, true).unwrap();
        assert_eq!(commit.receipt.version, 0);
        assert!(!commit.receipt.gamma_created);
        assert!(commit.delta.is_none());
        assert!(entry.with_gamma(|g, _| g.is_none()).unwrap());
    }

    #[test]
    fn image_commit_records_xor_against_previous_gamma() {
        let (alloc, entry) = setup(2);
        let first = vec![0x0Fu8; 2048];
        let both = ranges(&entry, &[(0, 2)]);
        commit(&entry, &both, CommitSource::Image(&first), &alloc, false).unwrap();

        let second = vec![0xFFu8; 2048];
        let upper = ranges(&entry, &[(1, 1)]);
        let done = commit(&entry, &upper, CommitSource::Image(&second), &alloc, true).unwrap();
        let delta = done.delta.unwrap();
        assert_eq!(delta.origin, CommitOrigin::Fill);
        assert_eq!(delta.version, 2);
        assert_eq!(delta.xor, vec![0xF0; 1024]);

        let mut replay = first.clone();
        delta.apply_to(&mut replay);
        entry.with_gamma(|g, _| assert_eq!(g.unwrap(), &replay[..])).unwrap();
    }

    #[test]
    fn active_commit_records_xor_and_replays() {
        let (alloc, entry) = setup(3);
        entry.with_active(|b| b.fill(0x11)).unwrap();
        let all = ranges(&entry, &[(0, 3)]);
        commit(&entry, &all, CommitSource::Active, &alloc, false).unwrap();
        let before = entry.with_gamma(|g, _| g.unwrap().to_vec()).unwrap();

        entry.with_active(|b| b[1024..2048].fill(0x33)).unwrap();
        let middle = ranges(&entry, &[(1, 1), (2, 1)]);
        let done = commit(&entry, &middle, CommitSource::Active, &alloc, true).unwrap();
        let delta = done.delta.unwrap();
        assert_eq!(delta.origin, CommitOrigin::Snapshot);
        assert_eq!(&delta.xor[..1024], &[0x22; 1024][..]);
        assert!(delta.xor[1024..].iter().all(|&b| b == 0));

        let mut replay = before;
        delta.apply_to(&mut replay);
        entry.with_gamma(|g, _| assert_eq!(g.unwrap(), &replay[..])).unwrap();
    }

    #[test]
    fn gamma_allocation_failure_keeps_entry_unassociated() {
        let alloc = RegionAllocator::new(Arc::new(HeapProvider::with_limit(2048)));
        let geometry = PageGeometry::new(1024, 2).unwrap();
        let block = alloc.allocate("active", 2048, 1024).unwrap();
        let entry = BufferEntry::new(BufferId::new(0, 0), geometry, 2048, block);

        let err = commit(&entry, &ranges(&entry, &[(0, 1)]), CommitSource::Active, &alloc, false)
            .unwrap_err();
        assert!(matches!(err, MssError::OutOfMemory { .. }));
        assert!(entry.with_gamma(|g, _| g.is_none()).unwrap());
    }

    #[test]
    fn released_entry_is_not_found() {
        let (alloc, entry) = setup(2);
        entry.release();
        let err = commit(&entry, &ranges(&entry, &[(0, 1)]), CommitSource::Active, &alloc, false)
            .unwrap_err();
        assert_eq!(err, MssError::NotFound { buffer: entry.id() });
    }
}
