//! Memory providers behind the region adapter.
//!
//! A [`RegionProvider`] is the external pool the adapter draws from: in
//! production a hugepage or NUMA-aware allocator, in tests and by default
//! the process heap via [`HeapProvider`].

#![allow(unsafe_code)]

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::raw;

/// Source of large aligned memory.
///
/// Implementations must be thread-safe: the adapter calls them from any
/// application thread and from subsystem shutdown.
pub trait RegionProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Allocate zero-filled memory for `layout`, or `None` if exhausted.
    ///
    /// `layout` always has non-zero size.
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Return memory to the provider.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `self.allocate(layout)` with this
    /// exact `layout`, and must not be used or released again afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Provider backed by the global allocator, with an optional byte cap.
///
/// The cap models a fixed-size pool (e.g. the hugepages reserved at boot):
/// once `limit` bytes are outstanding, further requests fail until memory
/// is released.
#[derive(Debug, Default)]
pub struct HeapProvider {
    limit: Option<usize>,
    in_use: AtomicUsize,
}

impl HeapProvider {
    /// Uncapped heap provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heap provider that refuses to hand out more than `limit` bytes at once.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Bytes currently handed out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    fn reserve(&self, size: usize) -> bool {
        let Some(limit) = self.limit else {
            self.in_use.fetch_add(size, Ordering::AcqRel);
            return true;
        };
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|&total| total <= limit)
            })
            .is_ok()
    }
}

impl RegionProvider for HeapProvider {
    fn name(&self) -> &str {
        "heap"
    }

    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
        if !self.reserve(layout.size()) {
            return None;
        }
        let ptr = raw::alloc_zeroed(layout);
        if ptr.is_none() {
            self.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
        }
        ptr
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees ptr came from allocate(layout),
        // which obtained it from raw::alloc_zeroed(layout).
        unsafe { raw::dealloc(ptr, layout) };
        self.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 64).unwrap()
    }

    #[test]
    fn uncapped_tracks_usage() {
        let p = HeapProvider::new();
        let ptr = p.allocate(layout(1024)).unwrap();
        assert_eq!(p.in_use(), 1024);
        // SAFETY: allocated above with the same layout.
        unsafe { p.release(ptr, layout(1024)) };
        assert_eq!(p.in_use(), 0);
    }

    #[test]
    fn cap_refuses_excess_and_recovers_after_release() {
        let p = HeapProvider::with_limit(2048);
        let a = p.allocate(layout(1024)).unwrap();
        let b = p.allocate(layout(1024)).unwrap();
        assert!(p.allocate(layout(64)).is_none());
        // SAFETY: allocated above with the same layout.
        unsafe { p.release(a, layout(1024)) };
        let c = p.allocate(layout(512)).unwrap();
        assert_eq!(p.in_use(), 1536);
        // SAFETY: allocated above with the same layouts.
        unsafe {
            p.release(b, layout(1024));
            p.release(c, layout(512));
        }
    }
}
