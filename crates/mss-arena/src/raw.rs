//! Low-level primitives for region memory.
//!
//! The only place in this crate that calls the global allocator directly.
//! Every function here has a `# Safety` contract; callers in `provider.rs`
//! uphold it by pairing each allocation with exactly one release of the
//! same layout.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Allocate zero-filled memory for `layout`.
///
/// Returns `None` when the allocator reports exhaustion or `layout` has
/// zero size.
pub(crate) fn alloc_zeroed(layout: Layout) -> Option<NonNull<u8>> {
    if layout.size() == 0 {
        return None;
    }
    // SAFETY: layout has non-zero size (checked above).
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    NonNull::new(ptr)
}

/// Return memory obtained from [`alloc_zeroed`].
///
/// # Safety
///
/// `ptr` must come from `alloc_zeroed(layout)` with this exact `layout`
/// and must not have been released already.
pub(crate) unsafe fn dealloc(ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: forwarded from the caller's contract.
    unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
}
