//! Process-wide subsystem and the `mss_*` entry points.
//!
//! One [`Mss`] lives in `SUBSYSTEM` between `mss_init` and `mss_shutdown`.
//! The global lock is held only to clone the `Arc`; operations then run
//! concurrently on the shared instance. Active buffers are named by the
//! base pointer `mss_malloc` returned and resolved through the engine's
//! address index.

use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::{Arc, Mutex};

use mss_core::{BufferId, MssError, SegmentList};
use mss_engine::{EngineConfig, Mss};

use crate::metrics::MssCounters;
use crate::status::MssStatus;
use crate::types::{segment_list, MssConfig, MssSegment};

static SUBSYSTEM: Mutex<Option<Arc<Mss>>> = Mutex::new(None);

fn current() -> Result<Arc<Mss>, MssStatus> {
    SUBSYSTEM
        .lock()
        .map_err(|_| MssStatus::IoFailure)?
        .clone()
        .ok_or(MssStatus::NotInitialized)
}

fn status(e: &MssError) -> i32 {
    MssStatus::from(e) as i32
}

/// Resolve an active-buffer pointer to its handle.
fn buffer(mss: &Mss, active: *const c_void) -> Result<BufferId, MssStatus> {
    if active.is_null() {
        return Err(MssStatus::InvalidArgument);
    }
    mss.resolve(active as usize).map_err(|e| MssStatus::from(&e))
}

/// Resolve the subsystem, the buffer and the segment array in one step.
///
/// # Safety
///
/// `segments` must satisfy [`segment_list`].
#[allow(unsafe_code)]
unsafe fn prepare(
    active: *const c_void,
    segments: *const MssSegment,
    count: usize,
) -> Result<(Arc<Mss>, BufferId, SegmentList), MssStatus> {
    let mss = current()?;
    let id = buffer(&mss, active)?;
    // SAFETY: forwarded caller contract.
    let list = unsafe { segment_list(segments, count)? };
    Ok((mss, id, list))
}

fn start(core_spec: *const c_char, extra: Option<&MssConfig>) -> i32 {
    if core_spec.is_null() {
        return MssStatus::InvalidArgument as i32;
    }
    #[allow(unsafe_code)]
    // SAFETY: non-null; caller passes a NUL-terminated string.
    let spec = match unsafe { CStr::from_ptr(core_spec) }.to_str() {
        Ok(s) => s,
        Err(_) => return MssStatus::InvalidArgument as i32,
    };

    let mut slot = ffi_lock!(SUBSYSTEM);
    if slot.is_some() {
        return MssStatus::AlreadyInitialized as i32;
    }
    let mut config = match EngineConfig::new(spec) {
        Ok(c) => c,
        Err(e) => return status(&e.into()),
    };
    if let Some(extra) = extra {
        if let Err(e) = extra.apply(&mut config) {
            return status(&e.into());
        }
    }
    match Mss::init(config) {
        Ok(mss) => {
            *slot = Some(Arc::new(mss));
            MssStatus::Ok as i32
        }
        Err(e) => status(&e),
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────

/// Start the subsystem on the worker cores named by `core_spec`
/// (e.g. `"0-3"` or `"0,2,4-6"`) with default settings.
///
/// The core list is validated but no thread is bound to it: binding is
/// opt-in through `pin_threads` in [`mss_init_with_config`].
///
/// Returns `MSS_STATUS_ALREADY_INITIALIZED` if a subsystem is live.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_init(core_spec: *const c_char) -> i32 {
    ffi_guard!({ start(core_spec, None) })
}

/// Like [`mss_init`], with explicit settings. `config` may be null.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_init_with_config(
    core_spec: *const c_char,
    config: *const MssConfig,
) -> i32 {
    ffi_guard!({
        // SAFETY: null or a valid MssConfig per caller contract.
        let extra = unsafe { config.as_ref() };
        start(core_spec, extra)
    })
}

/// Release every buffer, gamma and raw region and stop the worker.
///
/// Returns `MSS_STATUS_NOT_INITIALIZED` if no subsystem is live.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_shutdown() -> i32 {
    ffi_guard!({
        let taken = ffi_lock!(SUBSYSTEM).take();
        match taken {
            Some(mss) => match mss.shutdown() {
                Ok(_) => MssStatus::Ok as i32,
                Err(e) => status(&e),
            },
            None => MssStatus::NotInitialized as i32,
        }
    })
}

// ── Allocation ───────────────────────────────────────────────────────

/// Allocate a zero-filled active buffer of at least `size` bytes.
///
/// The result is aligned to `max(align, page_size)`; `align` 0 means page
/// alignment. Returns null on any failure.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_malloc(size: usize, align: usize) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), {
        let Ok(mss) = current() else {
            return ptr::null_mut();
        };
        match mss.allocate(size, align).and_then(|id| mss.active_ptr(id)) {
            Ok(p) => p.as_ptr().cast(),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Free an active buffer and its gamma.
///
/// A pointer that is not a live active buffer, including one already
/// freed, yields `MSS_STATUS_NOT_FOUND`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_free(active: *mut c_void) -> i32 {
    ffi_guard!({
        let mss = match current() {
            Ok(m) => m,
            Err(s) => return s as i32,
        };
        let id = match buffer(&mss, active) {
            Ok(id) => id,
            Err(s) => return s as i32,
        };
        MssStatus::from(mss.free(id)) as i32
    })
}

/// Allocate an unmanaged region. `label` may be null.
///
/// `align` 0 selects cache-line alignment, as `rte_malloc` does.
///
/// Raw regions have no gamma and are not addressable by the snapshot
/// functions. Returns null on any failure.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_rte_malloc(
    label: *const c_char,
    size: usize,
    align: u32,
) -> *mut c_void {
    ffi_guard!(ptr::null_mut(), {
        let Ok(mss) = current() else {
            return ptr::null_mut();
        };
        let label = if label.is_null() {
            "raw".into()
        } else {
            // SAFETY: non-null; caller passes a NUL-terminated string.
            unsafe { CStr::from_ptr(label) }.to_string_lossy()
        };
        match mss.raw_allocate(&label, size, align as usize) {
            Ok(p) => p.as_ptr().cast(),
            Err(_) => ptr::null_mut(),
        }
    })
}

/// Free a region returned by [`mss_rte_malloc`].
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_rte_free(region: *mut c_void) -> i32 {
    ffi_guard!({
        let mss = match current() {
            Ok(m) => m,
            Err(s) => return s as i32,
        };
        let Some(region) = ptr::NonNull::new(region.cast::<u8>()) else {
            return MssStatus::InvalidArgument as i32;
        };
        MssStatus::from(mss.raw_free(region)) as i32
    })
}

// ── Commits ──────────────────────────────────────────────────────────

/// Copy the listed pages of `active` into its gamma buffer.
///
/// `segments` may be null when `count` is 0; the call then only checks
/// that `active` is live.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_snapshot(
    active: *mut c_void,
    segments: *const MssSegment,
    count: usize,
) -> i32 {
    ffi_guard!({
        // SAFETY: segments/count per caller contract.
        let (mss, id, list) = match unsafe { prepare(active, segments, count) } {
            Ok(v) => v,
            Err(s) => return s as i32,
        };
        match mss.snapshot(id, &list) {
            Ok(_) => MssStatus::Ok as i32,
            Err(e) => status(&e),
        }
    })
}

/// Copy the listed pages of `data` into the gamma of `active`.
///
/// `data` is laid out like the buffer and must be readable up to the end
/// of the furthest listed page.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_fill_gamma(
    active: *mut c_void,
    data: *const c_void,
    segments: *const MssSegment,
    count: usize,
) -> i32 {
    ffi_guard!({
        // SAFETY: segments/count per caller contract.
        let (mss, id, list) = match unsafe { prepare(active, segments, count) } {
            Ok(v) => v,
            Err(s) => return s as i32,
        };
        let extent = match mss
            .info(id)
            .and_then(|info| info.geometry.validate(&list).map_err(MssError::from))
        {
            Ok(ranges) => ranges.extent(),
            Err(e) => return status(&e),
        };
        if extent > 0 && data.is_null() {
            return MssStatus::InvalidArgument as i32;
        }
        let image: &[u8] = if extent == 0 {
            &[]
        } else {
            // SAFETY: non-null and readable for `extent` bytes per caller contract.
            unsafe { std::slice::from_raw_parts(data.cast::<u8>(), extent) }
        };
        match mss.fill_gamma(id, image, &list) {
            Ok(_) => MssStatus::Ok as i32,
            Err(e) => status(&e),
        }
    })
}

// ── Recovery reads ───────────────────────────────────────────────────

/// Copy the gamma bytes of the listed pages into `out`, in list order.
///
/// `out_len` must be at least the total size of the listed pages. Pages
/// never committed read as zero.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_read_gamma(
    active: *mut c_void,
    segments: *const MssSegment,
    count: usize,
    out: *mut u8,
    out_len: usize,
) -> i32 {
    ffi_guard!({
        // SAFETY: segments/count per caller contract.
        let (mss, id, list) = match unsafe { prepare(active, segments, count) } {
            Ok(v) => v,
            Err(s) => return s as i32,
        };
        let bytes = match mss.read_gamma(id, &list) {
            Ok((bytes, _)) => bytes,
            Err(e) => return status(&e),
        };
        if bytes.is_empty() {
            return MssStatus::Ok as i32;
        }
        if out.is_null() || out_len < bytes.len() {
            return MssStatus::InvalidArgument as i32;
        }
        // SAFETY: out is writable for out_len >= bytes.len() bytes and
        // cannot alias the freshly allocated `bytes`.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), out, bytes.len()) };
        MssStatus::Ok as i32
    })
}

/// Write the gamma version of `active` (0 before the first commit).
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_gamma_version(active: *mut c_void, version_out: *mut u64) -> i32 {
    ffi_guard!({
        if version_out.is_null() {
            return MssStatus::InvalidArgument as i32;
        }
        let mss = match current() {
            Ok(m) => m,
            Err(s) => return s as i32,
        };
        let version = match buffer(&mss, active).and_then(|id| {
            mss.gamma_version(id).map_err(|e| MssStatus::from(&e))
        }) {
            Ok(v) => v,
            Err(s) => return s as i32,
        };
        // SAFETY: non-null and writable per caller contract.
        unsafe { *version_out = version };
        MssStatus::Ok as i32
    })
}

/// Write the subsystem counters to `out`.
#[no_mangle]
#[allow(unsafe_code)]
pub extern "C" fn mss_metrics(out: *mut MssCounters) -> i32 {
    ffi_guard!({
        if out.is_null() {
            return MssStatus::InvalidArgument as i32;
        }
        let mss = match current() {
            Ok(m) => m,
            Err(s) => return s as i32,
        };
        let counters = MssCounters::from_rust(&mss.metrics());
        // SAFETY: non-null and writable per caller contract.
        unsafe { *out = counters };
        MssStatus::Ok as i32
    })
}
