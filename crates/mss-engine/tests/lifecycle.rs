//! Integration test: initialisation, delta capture, pool exhaustion and
//! shutdown.

use std::time::Duration;

use mss_core::{CommitOrigin, MssError};
use mss_engine::{ConfigError, EngineConfig, Mss, MssBuilder};
use mss_test_utils::{capped_pool, init_tracing, page_bytes, pattern, segs, RecordingSink, PAGE};

fn config() -> EngineConfig {
    init_tracing();
    EngineConfig::new("0").unwrap()
}

#[test]
fn malformed_core_specs_fail_init() {
    for spec in ["", "a-b", "3-1", "0,0"] {
        assert!(EngineConfig::new(spec).is_err(), "{spec:?} accepted");
    }
    let bad = EngineConfig {
        page_size: 100,
        ..config()
    };
    assert!(matches!(Mss::init(bad), Err(MssError::InitFailure { .. })));
}

#[test]
fn config_error_text_reaches_init_failure() {
    let err: MssError = EngineConfig::new("x").unwrap_err().into();
    match err {
        MssError::InitFailure { reason } => assert!(reason.contains("\"x\"")),
        other => panic!("expected InitFailure, got {other:?}"),
    }
    assert_eq!(
        EngineConfig::new("1-0").unwrap_err(),
        ConfigError::InvalidCoreSpec { token: "1-0".into() }
    );
}

#[test]
fn oversized_core_ranges_fail_fast() {
    let started = std::time::Instant::now();
    let err: MssError = EngineConfig::new("0-4294967295").unwrap_err().into();
    assert!(matches!(err, MssError::InitFailure { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(
        EngineConfig::new("100000").unwrap_err(),
        ConfigError::CoreOutOfRange { core: 100000 }
    );
}

#[cfg(target_os = "linux")]
#[test]
fn pinning_to_an_offline_core_fails_init() {
    // Highest id a cpu_set_t can hold; no test host has it online.
    let config = EngineConfig {
        pin_threads: true,
        ..EngineConfig::new("1023").unwrap()
    };
    assert!(matches!(Mss::init(config), Err(MssError::InitFailure { .. })));
}

#[test]
fn deltas_reach_the_sink_and_replay_gamma() {
    let sink = RecordingSink::new();
    let mss = MssBuilder::new(EngineConfig {
        capture_deltas: true,
        ..config()
    })
    .delta_sink(sink.clone())
    .init()
    .unwrap();

    let a = mss.allocate(4 * PAGE, 64).unwrap();
    let first = pattern(4 * PAGE, 10);
    mss.with_active(a, |bytes| bytes.copy_from_slice(&first)).unwrap();
    mss.snapshot(a, &segs(&[(0, 4)])).unwrap();
    let image = pattern(4 * PAGE, 77);
    mss.fill_gamma(a, &image, &segs(&[(3, 1), (1, 1)])).unwrap();

    assert!(sink.wait_for(2, Duration::from_secs(5)));
    let deltas = sink.deltas();
    assert_eq!(deltas[0].origin, CommitOrigin::Snapshot);
    assert_eq!(deltas[1].origin, CommitOrigin::Fill);
    assert_eq!(deltas[1].version, 2);
    let offsets: Vec<usize> = deltas[1].ranges.iter().map(|r| r.offset).collect();
    assert_eq!(offsets, vec![PAGE, 3 * PAGE]);

    let mut replica = vec![0u8; 4 * PAGE];
    for delta in &deltas {
        delta.apply_to(&mut replica);
    }
    mss.with_gamma(a, |g, _| assert_eq!(g.unwrap(), &replica[..])).unwrap();

    let metrics = mss.metrics();
    assert_eq!(metrics.deltas_emitted, 2);
    assert_eq!(metrics.deltas_dropped, 0);

    let report = mss.shutdown().unwrap();
    assert_eq!(report.deltas_delivered, 2);
}

#[test]
fn capture_disabled_emits_nothing() {
    let sink = RecordingSink::new();
    let mss = MssBuilder::new(config()).delta_sink(sink.clone()).init().unwrap();
    let a = mss.allocate(PAGE, 64).unwrap();
    mss.snapshot(a, &segs(&[(0, 1)])).unwrap();
    assert_eq!(mss.shutdown().unwrap().deltas_delivered, 0);
    assert!(sink.is_empty());
}

#[test]
fn exhausted_pool_reports_out_of_memory() {
    let mss = MssBuilder::new(config())
        .provider(capped_pool(4 * PAGE))
        .init()
        .unwrap();

    let a = mss.allocate(3 * PAGE, 64).unwrap();
    assert!(matches!(
        mss.allocate(2 * PAGE, 64),
        Err(MssError::OutOfMemory { .. })
    ));

    // Gamma needs another three pages; the pool has one.
    mss.with_active(a, |bytes| bytes[page_bytes(0, 1)].fill(1)).unwrap();
    assert!(matches!(
        mss.snapshot(a, &segs(&[(0, 1)])),
        Err(MssError::OutOfMemory { .. })
    ));
    assert!(mss.with_gamma(a, |g, _| g.is_none()).unwrap());

    mss.free(a).unwrap();
    let b = mss.allocate(2 * PAGE, 64).unwrap();
    mss.snapshot(b, &segs(&[(0, 2)])).unwrap();
    assert_eq!(mss.metrics().region_bytes_live, 4 * PAGE);
}

#[test]
fn shutdown_releases_unfreed_buffers_and_raw_regions() {
    let mss = Mss::init(config()).unwrap();
    let a = mss.allocate(2 * PAGE, 64).unwrap();
    let b = mss.allocate(PAGE, 64).unwrap();
    mss.snapshot(a, &segs(&[(0, 2)])).unwrap();
    mss.free(b).unwrap();
    let raw = mss.raw_allocate("mbuf-pool", 512, 64).unwrap();
    mss.raw_allocate("ring", 256, 128).unwrap();
    mss.raw_free(raw).unwrap();

    let report = mss.shutdown().unwrap();
    assert_eq!(report.buffers_released, 1);
    assert_eq!(report.raw_regions_released, 1);

    let m = mss.metrics();
    assert_eq!((m.live_buffers, m.raw_regions, m.region_bytes_live), (0, 0, 0));
    assert!(!mss.is_running());
    assert_eq!(mss.free(a).unwrap_err(), MssError::NotInitialized);
    assert_eq!(
        mss.raw_allocate("late", 64, 64).unwrap_err(),
        MssError::NotInitialized
    );
}

#[test]
fn drop_without_shutdown_returns_memory() {
    let pool = capped_pool(2 * PAGE);
    for _ in 0..3 {
        let mss = MssBuilder::new(config())
            .provider(pool.clone())
            .init()
            .unwrap();
        let a = mss.allocate(PAGE, 64).unwrap();
        mss.snapshot(a, &segs(&[(0, 1)])).unwrap();
        // Dropped here with the buffer and its gamma still live.
    }
}

#[test]
fn independent_instances_coexist() {
    let one = Mss::init(config()).unwrap();
    let two = Mss::init(config()).unwrap();
    let a = one.allocate(PAGE, 64).unwrap();
    let b = two.allocate(PAGE, 64).unwrap();
    // Handles are per instance: the same encoding names different buffers.
    assert_eq!(a, b);
    one.free(a).unwrap();
    assert_eq!(two.gamma_version(b).unwrap(), 0);
    assert_eq!(one.live_buffers(), 0);
    assert_eq!(two.live_buffers(), 1);
}
