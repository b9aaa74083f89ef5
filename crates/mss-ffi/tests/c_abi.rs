//! Integration test: the C entry points driven from several threads, as a
//! packet-processing host would call them.

use std::ffi::{c_void, CString};
use std::ptr;
use std::sync::Mutex;
use std::thread;

use mss_ffi::api::{
    mss_free, mss_gamma_version, mss_init, mss_malloc, mss_metrics, mss_read_gamma,
    mss_shutdown, mss_snapshot,
};
use mss_ffi::metrics::MssCounters;
use mss_ffi::{MssSegment, MssStatus};
use mss_test_utils::{init_tracing, PAGE};

static SERIAL: Mutex<()> = Mutex::new(());

fn with_subsystem(f: impl FnOnce()) {
    let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
    init_tracing();
    let _ = mss_shutdown();
    let spec = CString::new("0-3").unwrap();
    assert_eq!(mss_init(spec.as_ptr()), MssStatus::Ok as i32);
    f();
    assert_eq!(mss_shutdown(), MssStatus::Ok as i32);
}

#[test]
fn worker_threads_share_the_process_subsystem() {
    with_subsystem(|| {
        let workers: Vec<_> = (0..4u8)
            .map(|w| {
                thread::spawn(move || {
                    let a = mss_malloc(8 * PAGE, 64);
                    assert!(!a.is_null());
                    let segs = [MssSegment {
                        page_offset: 0,
                        page_count: 8,
                    }];
                    for round in 0..25u8 {
                        let value = w.wrapping_mul(32).wrapping_add(round);
                        unsafe { ptr::write_bytes(a.cast::<u8>(), value, 8 * PAGE) };
                        assert_eq!(mss_snapshot(a, segs.as_ptr(), 1), 0);
                    }
                    let mut out = vec![0u8; 8 * PAGE];
                    assert_eq!(mss_read_gamma(a, segs.as_ptr(), 1, out.as_mut_ptr(), out.len()), 0);
                    let last = w.wrapping_mul(32).wrapping_add(24);
                    assert!(out.iter().all(|&b| b == last));

                    let mut version = 0;
                    assert_eq!(mss_gamma_version(a, &mut version), 0);
                    assert_eq!(version, 25);
                    assert_eq!(mss_free(a), 0);
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut counters = MssCounters::default();
        assert_eq!(mss_metrics(&mut counters), 0);
        assert_eq!(counters.snapshots, 100);
        assert_eq!(counters.live_buffers, 0);
        assert_eq!(counters.region_bytes_live, 0);
    });
}

#[test]
fn freed_pointer_is_not_found_everywhere() {
    with_subsystem(|| {
        let a = mss_malloc(2 * PAGE, 64);
        let segs = [MssSegment {
            page_offset: 0,
            page_count: 1,
        }];
        assert_eq!(mss_free(a), 0);

        let not_found = MssStatus::NotFound as i32;
        let mut out = [0u8; PAGE];
        let mut version = 0;
        assert_eq!(mss_snapshot(a, segs.as_ptr(), 1), not_found);
        assert_eq!(mss_read_gamma(a, segs.as_ptr(), 1, out.as_mut_ptr(), PAGE), not_found);
        assert_eq!(mss_gamma_version(a, &mut version), not_found);
        assert_eq!(mss_free(a), not_found);
        assert_eq!(mss_free(ptr::null_mut::<c_void>()), MssStatus::InvalidArgument as i32);
    });
}

#[test]
fn shutdown_invalidates_outstanding_pointers() {
    let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
    let _ = mss_shutdown();
    let spec = CString::new("0").unwrap();
    assert_eq!(mss_init(spec.as_ptr()), 0);
    let a = mss_malloc(PAGE, 64);
    assert!(!a.is_null());
    assert_eq!(mss_shutdown(), 0);

    assert_eq!(mss_free(a), MssStatus::NotInitialized as i32);
    assert_eq!(mss_shutdown(), MssStatus::NotInitialized as i32);

    // A fresh subsystem can be started afterwards.
    assert_eq!(mss_init(spec.as_ptr()), 0);
    assert_eq!(mss_shutdown(), 0);
}
