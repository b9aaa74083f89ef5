//! Criterion micro-benchmarks for buffer allocation and the region pool.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use mss_arena::{HeapProvider, RegionAllocator};
use mss_bench::{bench_subsystem, BENCH_PAGE};
use mss_core::{Segment, SegmentList};

/// Benchmark: allocate and free a 16-page active buffer.
fn bench_allocate_free(c: &mut Criterion) {
    let mss = bench_subsystem(false);
    c.bench_function("allocate_free_16p", |b| {
        b.iter(|| {
            let id = mss.allocate(16 * BENCH_PAGE, 64).unwrap();
            mss.free(black_box(id)).unwrap();
        });
    });
}

/// Benchmark: allocate, first snapshot (lazy gamma) and free.
fn bench_first_snapshot(c: &mut Criterion) {
    let mss = bench_subsystem(false);
    let one: SegmentList = [Segment::new(0, 1)].into_iter().collect();
    c.bench_function("first_snapshot_16p", |b| {
        b.iter(|| {
            let id = mss.allocate(16 * BENCH_PAGE, 64).unwrap();
            black_box(mss.snapshot(id, &one).unwrap());
            mss.free(id).unwrap();
        });
    });
}

/// Benchmark: raw region allocate and release through the allocator.
fn bench_raw_region(c: &mut Criterion) {
    let alloc = RegionAllocator::new(Arc::new(HeapProvider::new()));
    c.bench_function("raw_region_4k", |b| {
        b.iter(|| {
            let ptr = alloc.raw_allocate("bench", 4096, 64).unwrap();
            black_box(alloc.raw_free(ptr.as_ptr() as usize).unwrap());
        });
    });
}

criterion_group!(benches, bench_allocate_free, bench_first_snapshot, bench_raw_region);
criterion_main!(benches);
