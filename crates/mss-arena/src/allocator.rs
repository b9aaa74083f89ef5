//! The region allocation adapter.
//!
//! [`RegionAllocator`] validates layouts, draws memory from a provider,
//! keeps usage counters and holds unmanaged ("raw") regions keyed by
//! address until the caller frees them.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::error::RegionError;
use crate::provider::RegionProvider;
use crate::region::RegionBlock;

/// Alignment of a raw region requested with `align == 0`: one cache line.
pub const DEFAULT_RAW_ALIGN: usize = 64;

/// Live usage counters, shared between the adapter and its blocks.
#[derive(Debug, Default)]
pub(crate) struct RegionCounters {
    live_blocks: AtomicUsize,
    live_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    total_allocations: AtomicU64,
    failed_allocations: AtomicU64,
}

impl RegionCounters {
    fn record_alloc(&self, size: usize) {
        self.live_blocks.fetch_add(1, Ordering::Relaxed);
        let now = self.live_bytes.fetch_add(size, Ordering::AcqRel) + size;
        self.peak_bytes.fetch_max(now, Ordering::AcqRel);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, size: usize) {
        self.live_blocks.fetch_sub(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(size, Ordering::AcqRel);
    }
}

/// Point-in-time usage report from [`RegionAllocator::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionStats {
    /// Blocks currently outstanding (managed and raw).
    pub live_blocks: usize,
    /// Bytes currently outstanding.
    pub live_bytes: usize,
    /// Highest value `live_bytes` has reached.
    pub peak_bytes: usize,
    /// Successful allocations since creation.
    pub total_allocations: u64,
    /// Allocations refused by the provider.
    pub failed_allocations: u64,
    /// Raw regions currently held by the adapter.
    pub raw_regions: usize,
}

/// Adapter over a [`RegionProvider`].
///
/// Usable from any thread. After [`close`](Self::close) every allocation
/// fails with [`RegionError::Closed`]; blocks already handed out stay
/// valid until dropped.
pub struct RegionAllocator {
    provider: Arc<dyn RegionProvider>,
    counters: Arc<RegionCounters>,
    raw: Mutex<IndexMap<usize, RegionBlock>>,
    closed: AtomicBool,
}

impl RegionAllocator {
    /// Create an adapter drawing from `provider`.
    pub fn new(provider: Arc<dyn RegionProvider>) -> Self {
        Self {
            provider,
            counters: Arc::new(RegionCounters::default()),
            raw: Mutex::new(IndexMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Allocate a zero-filled block of `size` bytes aligned to `align`.
    ///
    /// `align` must be a power of two and `size` non-zero.
    pub fn allocate(
        &self,
        label: &str,
        size: usize,
        align: usize,
    ) -> Result<RegionBlock, RegionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RegionError::Closed);
        }
        if size == 0 {
            return Err(RegionError::InvalidLayout { size, align });
        }
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| RegionError::InvalidLayout { size, align })?;

        let Some(ptr) = self.provider.allocate(layout) else {
            self.counters.failed_allocations.fetch_add(1, Ordering::Relaxed);
            warn!(
                label,
                size,
                align,
                provider = self.provider.name(),
                "region allocation failed"
            );
            return Err(RegionError::OutOfMemory {
                requested: size,
                align,
            });
        };
        self.counters.record_alloc(size);
        debug!(label, size, align, address = ptr.as_ptr() as usize, "allocated region");
        Ok(RegionBlock::new(
            ptr,
            layout,
            label,
            Arc::clone(&self.provider),
            Arc::clone(&self.counters),
        ))
    }

    /// Allocate an unmanaged region and keep it until [`raw_free`](Self::raw_free).
    ///
    /// Raw regions bypass the snapshot registry; they have no gamma shadow.
    /// An `align` of 0 selects [`DEFAULT_RAW_ALIGN`].
    pub fn raw_allocate(
        &self,
        label: &str,
        size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, RegionError> {
        let block = self.allocate(label, size, raw_align(align))?;
        let ptr = block.as_non_null();
        let mut raw = self.raw.lock().map_err(|_| RegionError::Poisoned)?;
        raw.insert(block.address(), block);
        Ok(ptr)
    }

    /// Release a raw region by its base address. Returns its size.
    pub fn raw_free(&self, address: usize) -> Result<usize, RegionError> {
        let block = self
            .raw
            .lock()
            .map_err(|_| RegionError::Poisoned)?
            .shift_remove(&address);
        match block {
            Some(block) => Ok(block.len()),
            None => {
                warn!(address, "raw_free of unknown region");
                Err(RegionError::UnknownRegion { address })
            }
        }
    }

    /// Release every raw region still held, in allocation order.
    ///
    /// Returns how many were released.
    pub fn release_raw(&self) -> usize {
        let drained: Vec<RegionBlock> = match self.raw.lock() {
            Ok(mut raw) => raw.drain(..).map(|(_, b)| b).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).map(|(_, b)| b).collect(),
        };
        let count = drained.len();
        drop(drained);
        count
    }

    /// Refuse all further allocations.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current usage counters.
    pub fn stats(&self) -> RegionStats {
        RegionStats {
            live_blocks: self.counters.live_blocks.load(Ordering::Relaxed),
            live_bytes: self.counters.live_bytes.load(Ordering::Acquire),
            peak_bytes: self.counters.peak_bytes.load(Ordering::Acquire),
            total_allocations: self.counters.total_allocations.load(Ordering::Relaxed),
            failed_allocations: self.counters.failed_allocations.load(Ordering::Relaxed),
            raw_regions: self.raw.lock().map(|r| r.len()).unwrap_or(0),
        }
    }
}

/// Resolve a caller-supplied raw alignment, mapping 0 to the default.
pub fn raw_align(align: usize) -> usize {
    if align == 0 {
        DEFAULT_RAW_ALIGN
    } else {
        align
    }
}
