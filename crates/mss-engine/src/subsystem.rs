//! The `Mss` context object and its lifecycle.
//!
//! An [`Mss`] is one live subsystem: a region allocator, a buffer
//! registry and a housekeeping worker. It is built by [`MssBuilder`],
//! used from any number of threads through `&self`, and torn down by
//! [`Mss::shutdown`] or on drop.
//!
//! # Concurrency
//!
//! Calls on different buffers never contend beyond the brief registry
//! lookup. For one buffer, `snapshot`, `fill_gamma`, `read_gamma` and
//! `with_gamma` are serialized by that buffer's gamma lock, so a gamma
//! reader sees each commit entirely or not at all.
//!
//! The engine does not serialize ordinary writes to the active buffer
//! against `snapshot`. Writers going through [`Mss::with_active`] hold the
//! active lock, which `snapshot` also takes per segment, so each segment
//! is copied untorn. Writers using the raw [`Mss::active_ptr`] must quiesce
//! themselves before calling `snapshot` if tearing matters.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mss_arena::{raw_align, HeapProvider, RegionAllocator, RegionBlock, RegionProvider};
use mss_core::{
    BufferId, CommitOrigin, DeltaSink, MssError, PageGeometry, SegmentError, SegmentList,
    ValidatedRanges,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::entry::BufferEntry;
use crate::housekeeping::{Housekeeper, LogSink, Submit};
use crate::metrics::{EngineCounters, MssMetrics};
use crate::registry::Registry;
use crate::snapshot::{self, CommitReceipt, CommitSource};

// ── Lifecycle ────────────────────────────────────────────────────

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Report from [`Mss::shutdown`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Active buffers still registered at shutdown, released with their gamma.
    pub buffers_released: usize,
    /// Raw regions still outstanding at shutdown.
    pub raw_regions_released: usize,
    /// Deltas the housekeeping worker delivered over the subsystem's life.
    pub deltas_delivered: u64,
    /// Wall-clock time spent in the shutdown sequence.
    pub total_ms: u64,
}

/// Layout of one registered active buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferInfo {
    /// Handle of the buffer.
    pub id: BufferId,
    /// Base address of the active buffer.
    pub address: usize,
    /// Size passed to `allocate`.
    pub requested_len: usize,
    /// Effective alignment.
    pub align: usize,
    /// Page layout; `geometry.byte_len()` is the allocated size.
    pub geometry: PageGeometry,
}

// ── Builder ──────────────────────────────────────────────────────

/// Builder for an [`Mss`].
pub struct MssBuilder {
    config: EngineConfig,
    provider: Option<Arc<dyn RegionProvider>>,
    sink: Option<Box<dyn DeltaSink>>,
}

impl MssBuilder {
    /// Start from a configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            provider: None,
            sink: None,
        }
    }

    /// Draw memory from `provider` instead of the process heap.
    pub fn provider(mut self, provider: Arc<dyn RegionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Deliver commit deltas to `sink` instead of the log.
    pub fn delta_sink(mut self, sink: impl DeltaSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Validate the configuration, bind the worker and start the subsystem.
    ///
    /// Every failure is reported as [`MssError::InitFailure`].
    pub fn init(self) -> Result<Mss, MssError> {
        let Self {
            config,
            provider,
            sink,
        } = self;
        config.validate()?;

        let provider = provider.unwrap_or_else(|| Arc::new(HeapProvider::new()));
        let allocator = RegionAllocator::new(provider);
        let sink = sink.unwrap_or_else(|| Box::new(LogSink));
        let pin_core = config.pin_threads.then(|| config.worker_cores.primary());
        let housekeeper = Housekeeper::spawn(sink, config.delta_queue_depth, pin_core)?;

        info!(
            cores = %config.worker_cores,
            page_size = config.page_size,
            provider = allocator.provider_name(),
            capture_deltas = config.capture_deltas,
            pinned = config.pin_threads,
            "memory snapshot subsystem initialised"
        );

        Ok(Mss {
            config,
            allocator,
            registry: Registry::new(),
            housekeeper,
            counters: EngineCounters::default(),
            state: AtomicU8::new(RUNNING),
        })
    }
}

// ── Mss ──────────────────────────────────────────────────────────

/// A live memory snapshot subsystem.
pub struct Mss {
    config: EngineConfig,
    allocator: RegionAllocator,
    registry: Registry,
    housekeeper: Housekeeper,
    counters: EngineCounters,
    state: AtomicU8,
}

impl Mss {
    /// Start a subsystem with the heap provider and the logging delta sink.
    pub fn init(config: EngineConfig) -> Result<Self, MssError> {
        MssBuilder::new(config).init()
    }

    /// The configuration this instance was started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the subsystem accepts operations.
    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn ensure_running(&self) -> Result<(), MssError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(MssError::NotInitialized)
        }
    }

    fn reject<T>(&self, err: MssError) -> Result<T, MssError> {
        EngineCounters::bump(&self.counters.rejected_calls, 1);
        Err(err)
    }

    fn entry(&self, id: BufferId) -> Result<Arc<BufferEntry>, MssError> {
        self.ensure_running()?;
        self.registry.lookup(id).or_else(|e| self.reject(e))
    }

    // ── Allocation ───────────────────────────────────────────────

    /// Allocate and register an active buffer of at least `size` bytes.
    ///
    /// The size is rounded up to whole pages and the alignment raised to
    /// the page size. An `align` of 0 means page alignment. The buffer is
    /// zero-filled.
    pub fn allocate(&self, size: usize, align: usize) -> Result<BufferId, MssError> {
        self.ensure_running()?;
        if size == 0 {
            return Err(MssError::InvalidArgument {
                reason: "size must be non-zero".into(),
            });
        }
        if align != 0 && !align.is_power_of_two() {
            return Err(MssError::InvalidArgument {
                reason: format!("alignment {align} is not a power of two"),
            });
        }
        let geometry = PageGeometry::covering(size, self.config.page_size).ok_or_else(|| {
            MssError::InvalidArgument {
                reason: format!("size {size} overflows the address space"),
            }
        })?;
        let align = align.max(self.config.page_size);
        let block = self.allocator.allocate("active", geometry.byte_len(), align)?;
        let entry = self
            .registry
            .register(|id| BufferEntry::new(id, geometry, size, block))?;
        debug!(
            buffer = %entry.id(),
            address = entry.address(),
            size,
            pages = geometry.page_count(),
            align,
            "active buffer allocated"
        );
        Ok(entry.id())
    }

    /// Unregister a buffer and release its active and gamma memory.
    ///
    /// A second free of the same handle reports `NotFound`.
    pub fn free(&self, id: BufferId) -> Result<(), MssError> {
        self.ensure_running()?;
        let entry = match self.registry.unregister(id) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(buffer = %id, "free of unknown or already freed buffer");
                return self.reject(e);
            }
        };
        entry.release();
        debug!(buffer = %id, "active buffer freed");
        Ok(())
    }

    /// Allocate an unmanaged region with no gamma shadow.
    ///
    /// The region is held until [`raw_free`](Self::raw_free) or shutdown.
    /// An `align` of 0 selects [`mss_arena::DEFAULT_RAW_ALIGN`].
    pub fn raw_allocate(
        &self,
        label: &str,
        size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, MssError> {
        self.ensure_running()?;
        Ok(self.allocator.raw_allocate(label, size, align)?)
    }

    /// Allocate an unmanaged region owned by the returned guard.
    ///
    /// The region is freed when the guard drops. Unlike
    /// [`raw_allocate`](Self::raw_allocate) it is not counted in
    /// `raw_regions` and shutdown leaves it to its owner.
    pub fn raw_region(
        &self,
        label: &str,
        size: usize,
        align: usize,
    ) -> Result<RawRegion<'_>, MssError> {
        self.ensure_running()?;
        let block = self.allocator.allocate(label, size, raw_align(align))?;
        Ok(RawRegion {
            block,
            _mss: PhantomData,
        })
    }

    /// Release a region returned by [`raw_allocate`](Self::raw_allocate).
    pub fn raw_free(&self, ptr: NonNull<u8>) -> Result<(), MssError> {
        self.ensure_running()?;
        match self.allocator.raw_free(ptr.as_ptr() as usize) {
            Ok(_) => Ok(()),
            Err(e) => self.reject(e.into()),
        }
    }

    /// Find the buffer whose active base address is `address`.
    pub fn resolve(&self, address: usize) -> Result<BufferId, MssError> {
        self.ensure_running()?;
        self.registry.lookup_address(address).or_else(|e| self.reject(e))
    }

    // ── Commits ──────────────────────────────────────────────────

    fn validate(
        &self,
        entry: &BufferEntry,
        segments: &SegmentList,
    ) -> Result<ValidatedRanges, MssError> {
        entry
            .geometry()
            .validate(segments)
            .or_else(|e| self.reject(e.into()))
    }

    fn record(&self, origin: CommitOrigin, commit: snapshot::Commit) -> CommitReceipt {
        let counter = match origin {
            CommitOrigin::Snapshot => &self.counters.snapshots,
            CommitOrigin::Fill => &self.counters.fills,
        };
        EngineCounters::bump(counter, 1);
        EngineCounters::bump(&self.counters.bytes_committed, commit.receipt.bytes as u64);
        if commit.receipt.gamma_created {
            EngineCounters::bump(&self.counters.gamma_created, 1);
        }
        if let Some(delta) = commit.delta {
            match self.housekeeper.submit(delta) {
                Submit::Queued => EngineCounters::bump(&self.counters.deltas_emitted, 1),
                Submit::QueueFull | Submit::Stopped => {
                    EngineCounters::bump(&self.counters.deltas_dropped, 1);
                    warn!(
                        buffer = %commit.receipt.buffer,
                        version = commit.receipt.version,
                        "delta dropped"
                    );
                }
            }
        }
        debug!(
            buffer = %commit.receipt.buffer,
            ?origin,
            version = commit.receipt.version,
            segments = commit.receipt.segments,
            bytes = commit.receipt.bytes,
            "gamma committed"
        );
        commit.receipt
    }

    /// Copy the listed segments of the active buffer into its gamma.
    ///
    /// The gamma buffer is created on the first non-empty call. Invalid or
    /// overlapping segments are rejected before any byte is copied.
    pub fn snapshot(
        &self,
        id: BufferId,
        segments: &SegmentList,
    ) -> Result<CommitReceipt, MssError> {
        let entry = self.entry(id)?;
        let ranges = self.validate(&entry, segments)?;
        let commit = snapshot::commit(
            &entry,
            &ranges,
            CommitSource::Active,
            &self.allocator,
            self.config.capture_deltas,
        )
        .or_else(|e| self.reject(e))?;
        Ok(self.record(CommitOrigin::Snapshot, commit))
    }

    /// Copy the listed segments of `data` into the buffer's gamma.
    ///
    /// `data` is indexed like the buffer: segment bytes are read from the
    /// same offsets they are written to. It must reach at least the end of
    /// the furthest segment.
    pub fn fill_gamma(
        &self,
        id: BufferId,
        data: &[u8],
        segments: &SegmentList,
    ) -> Result<CommitReceipt, MssError> {
        let entry = self.entry(id)?;
        let ranges = self.validate(&entry, segments)?;
        if data.len() < ranges.extent() {
            return self.reject(
                SegmentError::SourceTooShort {
                    required: ranges.extent(),
                    actual: data.len(),
                }
                .into(),
            );
        }
        let commit = snapshot::commit(
            &entry,
            &ranges,
            CommitSource::Image(data),
            &self.allocator,
            self.config.capture_deltas,
        )
        .or_else(|e| self.reject(e))?;
        Ok(self.record(CommitOrigin::Fill, commit))
    }

    // ── Access ───────────────────────────────────────────────────

    /// Layout of a registered buffer.
    pub fn info(&self, id: BufferId) -> Result<BufferInfo, MssError> {
        let entry = self.entry(id)?;
        Ok(BufferInfo {
            id,
            address: entry.address(),
            requested_len: entry.requested_len(),
            align: entry.align(),
            geometry: entry.geometry(),
        })
    }

    /// Raw base pointer of the active buffer.
    ///
    /// Writes through this pointer bypass the active lock; see the module
    /// docs. The pointer is dangling once the buffer is freed.
    pub fn active_ptr(&self, id: BufferId) -> Result<NonNull<u8>, MssError> {
        let ptr = self.entry(id)?.active_ptr()?;
        NonNull::new(ptr).ok_or(MssError::Internal {
            reason: "active block has a null base".into(),
        })
    }

    /// Run `f` over the active bytes under the buffer's active lock.
    ///
    /// `f` must not call back into this subsystem for the same buffer.
    pub fn with_active<R>(
        &self,
        id: BufferId,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, MssError> {
        self.entry(id)?.with_active(f)
    }

    /// Run `f` over the gamma bytes and version under the gamma lock.
    ///
    /// `f` receives `None` and version 0 before the first commit.
    pub fn with_gamma<R>(
        &self,
        id: BufferId,
        f: impl FnOnce(Option<&[u8]>, u64) -> R,
    ) -> Result<R, MssError> {
        self.entry(id)?.with_gamma(f)
    }

    /// Read gamma bytes of the listed segments, concatenated in list order.
    ///
    /// Returns the bytes and the gamma version they belong to.
    pub fn read_gamma(
        &self,
        id: BufferId,
        segments: &SegmentList,
    ) -> Result<(Vec<u8>, u64), MssError> {
        let entry = self.entry(id)?;
        let ranges = self.validate(&entry, segments)?;
        entry.read_gamma(&ranges)
    }

    /// Number of commits applied to the buffer's gamma.
    pub fn gamma_version(&self, id: BufferId) -> Result<u64, MssError> {
        self.with_gamma(id, |_, version| version)
    }

    /// Registered active buffers.
    pub fn live_buffers(&self) -> usize {
        self.registry.len()
    }

    /// Current counters.
    pub fn metrics(&self) -> MssMetrics {
        let regions = self.allocator.stats();
        MssMetrics {
            live_buffers: self.registry.len(),
            raw_regions: regions.raw_regions,
            region_bytes_live: regions.live_bytes,
            region_bytes_peak: regions.peak_bytes,
            ..MssMetrics::from_counters(&self.counters)
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Release every buffer and raw region and stop the worker.
    ///
    /// Buffers the application never freed are released silently. After
    /// shutdown every operation reports `NotInitialized`, including a
    /// second `shutdown`.
    pub fn shutdown(&self) -> Result<ShutdownReport, MssError> {
        if self
            .state
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(MssError::NotInitialized);
        }
        let start = Instant::now();

        let entries = self.registry.drain();
        let buffers_released = entries.iter().filter(|e| e.release()).count();
        drop(entries);

        let raw_regions_released = self.allocator.release_raw();
        self.allocator.close();
        let deltas_delivered = self.housekeeper.stop();

        self.state.store(SHUT_DOWN, Ordering::Release);
        let report = ShutdownReport {
            buffers_released,
            raw_regions_released,
            deltas_delivered,
            total_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            buffers = report.buffers_released,
            raw_regions = report.raw_regions_released,
            deltas = report.deltas_delivered,
            total_ms = report.total_ms,
            "memory snapshot subsystem shut down"
        );
        Ok(report)
    }
}

// ── RawRegion ────────────────────────────────────────────────────

/// An unmanaged region returned by [`Mss::raw_region`].
///
/// Dereferences to the region's bytes and frees them on drop.
pub struct RawRegion<'mss> {
    block: RegionBlock,
    _mss: PhantomData<&'mss Mss>,
}

impl RawRegion<'_> {
    /// Base pointer of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.block.as_ptr()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// Always false; regions are never empty.
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Label given at allocation.
    pub fn label(&self) -> &str {
        self.block.label()
    }

    /// The region's bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.block.as_slice()
    }

    /// The region's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.block.as_mut_slice()
    }
}

impl std::ops::Deref for RawRegion<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::ops::DerefMut for RawRegion<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl std::fmt::Debug for RawRegion<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RawRegion").field(&self.block).finish()
    }
}

impl Drop for Mss {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.shutdown();
        }
    }
}

impl std::fmt::Debug for Mss {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mss")
            .field("cores", &self.config.worker_cores.to_string())
            .field("page_size", &self.config.page_size)
            .field("live_buffers", &self.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}
