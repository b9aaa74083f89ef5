//! Per-buffer registry entries.
//!
//! An entry owns the active block and, once associated, its gamma
//! shadow. Two locks guard it: `gamma` serializes every commit and gamma
//! read for the buffer, `active` guards lock-respecting access to the
//! active bytes. When both are taken, `gamma` is taken first.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use mss_arena::RegionBlock;
use mss_core::{BufferId, MssError, PageGeometry, ValidatedRanges};

/// Association state of a buffer's gamma shadow.
pub(crate) enum GammaState {
    /// No snapshot or fill has touched the buffer yet.
    Unassociated,
    /// Gamma exists; `version` counts successful commits.
    Associated { block: RegionBlock, version: u64 },
    /// The buffer was freed; every further operation reports `NotFound`.
    Released,
}

/// Registry record for one active buffer.
pub(crate) struct BufferEntry {
    id: BufferId,
    geometry: PageGeometry,
    requested_len: usize,
    align: usize,
    address: usize,
    active: Mutex<Option<RegionBlock>>,
    gamma: Mutex<GammaState>,
}

impl BufferEntry {
    pub(crate) fn new(
        id: BufferId,
        geometry: PageGeometry,
        requested_len: usize,
        active: RegionBlock,
    ) -> Self {
        Self {
            id,
            geometry,
            requested_len,
            align: active.align(),
            address: active.address(),
            active: Mutex::new(Some(active)),
            gamma: Mutex::new(GammaState::Unassociated),
        }
    }

    pub(crate) fn id(&self) -> BufferId {
        self.id
    }

    pub(crate) fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub(crate) fn requested_len(&self) -> usize {
        self.requested_len
    }

    pub(crate) fn align(&self) -> usize {
        self.align
    }

    pub(crate) fn address(&self) -> usize {
        self.address
    }

    pub(crate) fn lock_gamma(&self) -> Result<MutexGuard<'_, GammaState>, MssError> {
        self.gamma.lock().map_err(|_| MssError::Internal {
            reason: format!("gamma lock of {} poisoned", self.id),
        })
    }

    /// The active lock guards plain bytes; a panicking writer leaves them
    /// valid, so poisoning is ignored.
    pub(crate) fn lock_active(&self) -> MutexGuard<'_, Option<RegionBlock>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Base pointer of the active buffer, or `NotFound` once released.
    pub(crate) fn active_ptr(&self) -> Result<*mut u8, MssError> {
        self.lock_active()
            .as_ref()
            .map(RegionBlock::as_ptr)
            .ok_or(MssError::NotFound { buffer: self.id })
    }

    /// Run `f` over the active bytes under the active lock.
    pub(crate) fn with_active<R>(
        &self,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, MssError> {
        let mut guard = self.lock_active();
        let block = guard.as_mut().ok_or(MssError::NotFound { buffer: self.id })?;
        Ok(f(block.as_mut_slice()))
    }

    /// Run `f` over the gamma bytes (`None` when unassociated) and version.
    pub(crate) fn with_gamma<R>(
        &self,
        f: impl FnOnce(Option<&[u8]>, u64) -> R,
    ) -> Result<R, MssError> {
        let guard = self.lock_gamma()?;
        match &*guard {
            GammaState::Released => Err(MssError::NotFound { buffer: self.id }),
            GammaState::Unassociated => Ok(f(None, 0)),
            GammaState::Associated { block, version } => Ok(f(Some(block.as_slice()), *version)),
        }
    }

    /// Copy gamma bytes of `ranges`, concatenated in caller order.
    ///
    /// Unassociated gamma reads as zeros.
    pub(crate) fn read_gamma(&self, ranges: &ValidatedRanges) -> Result<(Vec<u8>, u64), MssError> {
        let guard = self.lock_gamma()?;
        match &*guard {
            GammaState::Released => Err(MssError::NotFound { buffer: self.id }),
            GammaState::Unassociated => Ok((vec![0; ranges.total_bytes()], 0)),
            GammaState::Associated { block, version } => {
                let src = block.as_slice();
                let mut out = Vec::with_capacity(ranges.total_bytes());
                for range in ranges.in_caller_order() {
                    out.extend_from_slice(&src[range.as_range()]);
                }
                Ok((out, *version))
            }
        }
    }

    /// Release gamma and active memory. Returns `false` if already released.
    pub(crate) fn release(&self) -> bool {
        let mut gamma = self.gamma.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*gamma, GammaState::Released) {
            return false;
        }
        *gamma = GammaState::Released;
        drop(gamma);
        self.lock_active().take();
        true
    }
}

impl fmt::Debug for BufferEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferEntry")
            .field("id", &self.id)
            .field("address", &format_args!("{:#x}", self.address))
            .field("pages", &self.geometry.page_count())
            .field("align", &self.align)
            .finish_non_exhaustive()
    }
}
