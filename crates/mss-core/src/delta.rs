//! Commit deltas handed to the housekeeping worker.
//!
//! When delta capture is enabled, each successful commit into a gamma
//! buffer produces one [`SnapshotDelta`]: the XOR of the incoming bytes
//! against the gamma content they replaced, for every applied range.
//! A consumer holding the previous gamma state can reconstruct the new one
//! by XOR-ing the delta back in.

use crate::geometry::ByteRange;
use crate::id::BufferId;

/// Which write path produced a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommitOrigin {
    /// `snapshot`: bytes copied from the active buffer.
    Snapshot,
    /// `fill_gamma`: bytes copied from a caller-supplied source.
    Fill,
}

/// XOR delta of one commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotDelta {
    /// Buffer whose gamma was updated.
    pub buffer: BufferId,
    /// Write path that produced the commit.
    pub origin: CommitOrigin,
    /// Gamma version after the commit.
    pub version: u64,
    /// Applied ranges, sorted by offset.
    pub ranges: Vec<ByteRange>,
    /// `new ^ old` for each range, concatenated in `ranges` order.
    pub xor: Vec<u8>,
}

impl SnapshotDelta {
    /// Number of bytes that actually changed.
    pub fn changed_bytes(&self) -> usize {
        self.xor.iter().filter(|&&b| b != 0).count()
    }

    /// Apply this delta to a copy of the previous gamma content.
    ///
    /// # Panics
    ///
    /// Panics if `target` is shorter than the furthest range.
    pub fn apply_to(&self, target: &mut [u8]) {
        let mut cursor = 0;
        for range in &self.ranges {
            let xor = &self.xor[cursor..cursor + range.len];
            for (dst, x) in target[range.as_range()].iter_mut().zip(xor) {
                *dst ^= x;
            }
            cursor += range.len;
        }
    }
}

/// Consumer of commit deltas, run on the housekeeping worker thread.
///
/// Implementations are the hand-off point to replication or persistence
/// collaborators. `deliver` is called in commit order per buffer.
pub trait DeltaSink: Send {
    /// Receive one delta.
    fn deliver(&mut self, delta: SnapshotDelta);
}
