// Buffered-send arena allocate/free cycle benchmarks.
//
// Measures the cost of the allocator's two hot paths end to end, through the
// crate's public surface: `driver::send` (find-and-take, pack, isend) and
// `driver::reclaim` (progress-test, unlink, free-with-merge).

use std::ptr::NonNull;
use std::sync::Arc;

use bsend_core::arena::Arena;
use bsend_core::collaborators::{CommId, DatatypeId};
use bsend_core::driver;
use bsend_core::testing::{BytesPacker, InMemorySendEngine};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

fn fresh_arena(capacity: usize) -> (Vec<u8>, Arena, Arc<InMemorySendEngine>) {
    let mut buf = vec![0u8; capacity];
    let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
    let engine = Arc::new(InMemorySendEngine::new());
    let arena = Arena::attach(ptr, capacity, engine.clone()).unwrap();
    (buf, arena, engine)
}

/// Benchmark one send-then-reclaim cycle at a range of payload sizes: the
/// arena returns to one free block after each iteration, so every sample
/// exercises the same split/merge path as the last.
fn bench_send_reclaim_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_reclaim_cycle");
    let packer = BytesPacker;

    for size in &[16usize, 64, 256, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let (_buf, arena, engine) = fresh_arena(1 << 20);
            let payload = vec![0u8; size];

            b.iter(|| {
                // SAFETY: payload outlives the send and is not mutated.
                let handle = unsafe {
                    driver::send(
                        &arena,
                        &packer,
                        black_box(payload.as_ptr()),
                        payload.len(),
                        DatatypeId::BYTES,
                        0,
                        0,
                        CommId(0),
                        true,
                    )
                    .expect("should fit")
                    .expect("share_handle was true")
                };
                engine.complete(handle);
                driver::reclaim(&arena).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark sending against a fragmented arena, to capture the cost of
/// first-fit walking past blocks still in flight.
fn bench_send_under_fragmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("send_fragmented");
    group.sample_size(200);
    let packer = BytesPacker;

    group.bench_function("send_past_live_neighbors", |b| {
        let (_buf, arena, engine) = fresh_arena(1 << 20);
        let held = vec![0u8; 64];
        let mut handles = Vec::new();
        for _ in 0..64 {
            // SAFETY: held outlives every send below.
            let handle = unsafe {
                driver::send(
                    &arena,
                    &packer,
                    held.as_ptr(),
                    held.len(),
                    DatatypeId::BYTES,
                    0,
                    0,
                    CommId(0),
                    true,
                )
                .unwrap()
                .unwrap()
            };
            handles.push(handle);
        }

        let payload = vec![0u8; 128];
        b.iter(|| {
            // SAFETY: payload outlives the send and is not mutated.
            let handle = unsafe {
                driver::send(
                    &arena,
                    &packer,
                    black_box(payload.as_ptr()),
                    payload.len(),
                    DatatypeId::BYTES,
                    0,
                    0,
                    CommId(0),
                    true,
                )
                .expect("should fit")
                .expect("share_handle was true")
            };
            engine.complete(handle);
            driver::reclaim(&arena).unwrap();
        });

        for handle in handles {
            engine.complete(handle);
        }
        driver::reclaim(&arena).unwrap();
    });

    group.finish();
}

/// Benchmark three-way coalescing: complete the middle of three in-flight
/// sends, then the left, then the right, every iteration.
fn bench_coalesce_triplet(c: &mut Criterion) {
    let mut group = c.benchmark_group("coalesce_triplet");
    group.sample_size(500);
    let packer = BytesPacker;

    group.bench_function("merge_both_sides", |b| {
        let (_buf, arena, engine) = fresh_arena(1 << 16);
        let payload = vec![0u8; 100];

        b.iter(|| {
            let send_one = || {
                // SAFETY: payload outlives every send below.
                unsafe {
                    driver::send(
                        &arena,
                        &packer,
                        payload.as_ptr(),
                        payload.len(),
                        DatatypeId::BYTES,
                        0,
                        0,
                        CommId(0),
                        true,
                    )
                    .unwrap()
                    .unwrap()
                }
            };
            let a = send_one();
            let mid = send_one();
            let c = send_one();

            engine.complete(black_box(mid));
            driver::reclaim(&arena).unwrap();
            engine.complete(black_box(a));
            driver::reclaim(&arena).unwrap();
            engine.complete(black_box(c));
            driver::reclaim(&arena).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_send_reclaim_cycle,
    bench_send_under_fragmentation,
    bench_coalesce_triplet,
);
criterion_main!(benches);
