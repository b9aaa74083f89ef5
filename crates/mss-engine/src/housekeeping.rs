//! Background housekeeping worker.
//!
//! Commits hand their XOR deltas to a single named worker thread over a
//! bounded crossbeam channel. The worker forwards each delta to the
//! configured [`DeltaSink`] in arrival order. Submission never blocks a
//! commit: a full queue drops the delta and the caller counts it.

use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender, TrySendError};
use mss_core::{DeltaSink, SnapshotDelta};
use tracing::{debug, warn};

use crate::affinity::pin_current_thread;
use crate::config::ConfigError;

enum Message {
    Delta(SnapshotDelta),
    Stop,
}

/// Default sink: logs a one-line summary per delta.
#[derive(Debug, Default)]
pub struct LogSink;

impl DeltaSink for LogSink {
    fn deliver(&mut self, delta: SnapshotDelta) {
        debug!(
            buffer = %delta.buffer,
            origin = ?delta.origin,
            version = delta.version,
            ranges = delta.ranges.len(),
            changed = delta.changed_bytes(),
            "delta committed"
        );
    }
}

/// Outcome of [`Housekeeper::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Submit {
    Queued,
    QueueFull,
    Stopped,
}

pub(crate) struct Housekeeper {
    tx: Sender<Message>,
    worker: Mutex<Option<JoinHandle<u64>>>,
}

impl Housekeeper {
    /// Spawn the worker, optionally bound to `pin_core`.
    ///
    /// Returns once the worker has started and, when pinning was
    /// requested, bound itself.
    pub(crate) fn spawn(
        mut sink: Box<dyn DeltaSink>,
        queue_depth: usize,
        pin_core: Option<usize>,
    ) -> Result<Self, ConfigError> {
        let (tx, rx) = bounded::<Message>(queue_depth);
        let (ready_tx, ready_rx) = bounded::<Result<(), ConfigError>>(1);

        let worker = thread::Builder::new()
            .name("mss-housekeeping".into())
            .spawn(move || {
                let pinned = pin_core.map_or(Ok(()), pin_current_thread);
                let failed = pinned.is_err();
                let _ = ready_tx.send(pinned);
                if failed {
                    return 0;
                }
                let mut delivered = 0u64;
                for message in rx {
                    match message {
                        Message::Delta(delta) => {
                            sink.deliver(delta);
                            delivered += 1;
                        }
                        Message::Stop => break,
                    }
                }
                delivered
            })
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(ConfigError::ThreadSpawnFailed {
                reason: "housekeeping worker exited during start-up".into(),
            })
        });
        if let Err(e) = started {
            let _ = worker.join();
            return Err(e);
        }

        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub(crate) fn submit(&self, delta: SnapshotDelta) -> Submit {
        match self.tx.try_send(Message::Delta(delta)) {
            Ok(()) => Submit::Queued,
            Err(TrySendError::Full(_)) => Submit::QueueFull,
            Err(TrySendError::Disconnected(_)) => Submit::Stopped,
        }
    }

    /// Drain queued deltas, stop the worker and return how many it delivered.
    ///
    /// Later calls return 0.
    pub(crate) fn stop(&self) -> u64 {
        let worker = match self.worker.lock() {
            Ok(mut w) => w.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(worker) = worker else {
            return 0;
        };
        // Blocks only while the worker drains a full queue.
        let _ = self.tx.send(Message::Stop);
        match worker.join() {
            Ok(delivered) => delivered,
            Err(_) => {
                warn!("housekeeping worker panicked; delivered count lost");
                0
            }
        }
    }
}
