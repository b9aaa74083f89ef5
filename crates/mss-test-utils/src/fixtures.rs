//! Collaborator fixtures.
//!
//! - [`RecordingSink`]: a delta sink whose deliveries stay inspectable
//!   from the test thread.
//! - [`capped_pool`]: a heap provider that refuses to exceed a byte budget.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mss_arena::{HeapProvider, RegionProvider};
use mss_core::{DeltaSink, SnapshotDelta};

/// Records every delivered delta.
///
/// Clones share storage: hand one clone to the subsystem and keep the
/// other to inspect.
#[derive(Clone, Default)]
pub struct RecordingSink {
    deltas: Arc<Mutex<Vec<SnapshotDelta>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything delivered so far.
    pub fn deltas(&self) -> Vec<SnapshotDelta> {
        self.deltas.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.deltas.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Poll until at least `n` deltas arrived or `timeout` passes.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.len() >= n {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        self.len() >= n
    }
}

impl DeltaSink for RecordingSink {
    fn deliver(&mut self, delta: SnapshotDelta) {
        if let Ok(mut deltas) = self.deltas.lock() {
            deltas.push(delta);
        }
    }
}

/// A region provider limited to `bytes` outstanding.
pub fn capped_pool(bytes: usize) -> Arc<dyn RegionProvider> {
    Arc::new(HeapProvider::with_limit(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mss_core::{BufferId, CommitOrigin};

    #[test]
    fn clones_share_recordings() {
        let sink = RecordingSink::new();
        let mut handed_out = sink.clone();
        handed_out.deliver(SnapshotDelta {
            buffer: BufferId::new(1, 0),
            origin: CommitOrigin::Fill,
            version: 1,
            ranges: Vec::new(),
            xor: Vec::new(),
        });
        assert_eq!(sink.len(), 1);
        assert!(sink.wait_for(1, Duration::from_millis(10)));
        assert_eq!(sink.deltas()[0].origin, CommitOrigin::Fill);
    }

    #[test]
    fn capped_pool_names_itself() {
        let pool = capped_pool(4096);
        assert!(!pool.name().is_empty());
    }
}
