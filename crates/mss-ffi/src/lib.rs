//! C ABI for the memory snapshot subsystem.
//!
//! Exposes one process-wide subsystem through `mss_init` / `mss_shutdown`
//! and pointer-based buffer operations that resolve active buffers by
//! base address. Every entry point runs inside a panic guard and reports
//! failures as negative [`MssStatus`] codes; pointer-returning functions
//! return null instead. The C header `include/mss.h` is generated by
//! cbindgen at build time.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

/// Run `$body` under `catch_unwind`, mapping a panic to `$on_panic`
/// (by default the `Panicked` status).
macro_rules! ffi_guard {
    ($body:block) => {
        ffi_guard!($crate::status::MssStatus::Panicked as i32, $body)
    };
    ($on_panic:expr, $body:block) => {
        match ::std::panic::catch_unwind(::std::panic::AssertUnwindSafe(|| $body)) {
            Ok(value) => value,
            Err(_) => $on_panic,
        }
    };
}

/// Lock a mutex, returning the `IoFailure` status from the enclosing
/// guard body if it is poisoned.
macro_rules! ffi_lock {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(_) => return $crate::status::MssStatus::IoFailure as i32,
        }
    };
}

pub mod api;
pub mod metrics;
pub mod status;
pub mod types;

pub use status::MssStatus;
pub use types::{MssConfig, MssSegment};

#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
