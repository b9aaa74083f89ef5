//! Owned, aligned memory regions.

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::allocator::RegionCounters;
use crate::provider::RegionProvider;

/// An aligned, zero-initialised block obtained from a [`RegionProvider`].
///
/// The block owns its memory and returns it to the provider on drop.
/// Slices handed out by [`as_slice`](Self::as_slice) and
/// [`as_mut_slice`](Self::as_mut_slice) follow normal borrow rules; code
/// that also writes through [`as_ptr`](Self::as_ptr) (the C ABI) must not
/// do so while a slice borrow is live.
pub struct RegionBlock {
    ptr: NonNull<u8>,
    layout: Layout,
    label: String,
    provider: Arc<dyn RegionProvider>,
    counters: Arc<RegionCounters>,
}

// SAFETY: the block uniquely owns its allocation; the provider is
// Send + Sync, and the counters are atomics.
unsafe impl Send for RegionBlock {}
// SAFETY: shared access only yields `&[u8]`; mutation requires `&mut self`.
unsafe impl Sync for RegionBlock {}

impl RegionBlock {
    pub(crate) fn new(
        ptr: NonNull<u8>,
        layout: Layout,
        label: &str,
        provider: Arc<dyn RegionProvider>,
        counters: Arc<RegionCounters>,
    ) -> Self {
        Self {
            ptr,
            layout,
            label: label.to_owned(),
            provider,
            counters,
        }
    }

    /// Base pointer of the block.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Base pointer as a non-null pointer.
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Base address, used as a lookup key.
    pub fn address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.layout.size()
    }

    /// Whether the block has zero length. Never true for provider blocks.
    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Alignment in bytes.
    pub fn align(&self) -> usize {
        self.layout.align()
    }

    /// Label given at allocation.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The whole block as bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() initialised bytes for the
        // lifetime of self; the provider zero-filled it.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Reads through the raw pointer without forming a shared slice, so
    /// the copy is sound while a foreign writer holds [`as_ptr`](Self::as_ptr).
    /// The bytes seen under such a race are unspecified.
    ///
    /// # Panics
    ///
    /// If `offset + dst.len()` exceeds the block.
    pub fn read_into(&self, offset: usize, dst: &mut [u8]) {
        let end = offset.checked_add(dst.len());
        assert!(
            end.is_some_and(|end| end <= self.len()),
            "read of {} bytes at {offset} past block of {}",
            dst.len(),
            self.len()
        );
        // SAFETY: the source range lies inside the allocation (checked
        // above) and `dst` is a distinct Rust allocation.
        unsafe {
            let src = self.ptr.as_ptr().add(offset);
            std::ptr::copy_nonoverlapping(src, dst.as_mut_ptr(), dst.len());
        }
    }

    /// The whole block as mutable bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and &mut self guarantees no other Rust borrow.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for RegionBlock {
    fn drop(&mut self) {
        tracing::trace!(
            label = %self.label,
            address = self.address(),
            len = self.len(),
            "releasing region"
        );
        // SAFETY: ptr came from provider.allocate(layout) and is released
        // exactly once, here.
        unsafe { self.provider.release(self.ptr, self.layout) };
        self.counters.record_release(self.layout.size());
    }
}

impl fmt::Debug for RegionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionBlock")
            .field("address", &format_args!("{:#x}", self.address()))
            .field("len", &self.len())
            .field("align", &self.align())
            .field("label", &self.label)
            .finish()
    }
}
