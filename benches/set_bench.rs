//! Criterion benchmarks: lazyskip vs `crossbeam_skiplist::SkipSet` vs
//! `Mutex<BTreeSet>`.
//!
//! The lock-wrapped `BTreeSet` is the structure this crate replaces in
//! concurrent code; the crossbeam skip list is the lock-free point of
//! comparison.
//!
//! Run with: `cargo bench --bench set_bench`

use std::collections::BTreeSet;
use std::hint::black_box;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Instant;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use lazyskip::SkipSet;

const FILL: i64 = 10_000;

/// Pseudo-random key stream without RNG state (golden-ratio mixing).
fn mixed_key(i: u64) -> i64 {
    (i.wrapping_mul(0x9e37_79b9_7f4a_7c15) >> 16) as i64
}

fn bench_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_10k");
    group.throughput(Throughput::Elements(FILL as u64));

    group.bench_function("lazyskip", |b| {
        b.iter(|| {
            let set = SkipSet::new();
            let guard = set.guard();
            for i in 0..FILL {
                set.insert_with_guard(mixed_key(i as u64), &guard);
            }
            set
        });
    });

    group.bench_function("crossbeam", |b| {
        b.iter(|| {
            let set = crossbeam_skiplist::SkipSet::new();
            for i in 0..FILL {
                set.insert(mixed_key(i as u64));
            }
            set
        });
    });

    group.bench_function("mutex_btreeset", |b| {
        b.iter(|| {
            let set = Mutex::new(BTreeSet::new());
            for i in 0..FILL {
                set.lock().unwrap().insert(mixed_key(i as u64));
            }
            set
        });
    });

    group.finish();
}

fn bench_contains(c: &mut Criterion) {
    let set = SkipSet::new();
    for i in 0..FILL {
        set.insert(mixed_key(i as u64));
    }

    let mut group = c.benchmark_group("contains");

    group.bench_function("hit", |b| {
        let guard = set.guard();
        let mut i = 0_u64;
        b.iter(|| {
            i = (i + 1) % FILL as u64;
            black_box(set.contains_with_guard(mixed_key(i), &guard))
        });
    });

    group.bench_function("miss", |b| {
        let guard = set.guard();
        let mut i = 0_u64;
        b.iter(|| {
            i += 1;
            // An off-by-one from the mixed stream virtually never collides
            // with a stored key.
            black_box(set.contains_with_guard(mixed_key(i) + 1, &guard))
        });
    });

    group.finish();
}

fn bench_contended_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_mix");
    group.sample_size(10);

    for threads in [2_usize, 4, 8] {
        group.throughput(Throughput::Elements(FILL as u64));
        group.bench_with_input(
            BenchmarkId::new("lazyskip", threads),
            &threads,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let mut total = std::time::Duration::ZERO;
                    for _ in 0..iters {
                        let set = Arc::new(SkipSet::new());
                        let barrier = Arc::new(Barrier::new(threads + 1));
                        let per_thread = FILL as u64 / threads as u64;

                        let handles: Vec<_> = (0..threads)
                            .map(|t| {
                                let set = Arc::clone(&set);
                                let barrier = Arc::clone(&barrier);
                                thread::spawn(move || {
                                    barrier.wait();
                                    let guard = set.guard();
                                    let base = t as u64 * per_thread;
                                    for i in base..base + per_thread {
                                        let k = mixed_key(i % (per_thread * 2));
                                        match i % 3 {
                                            0 => {
                                                set.insert_with_guard(k, &guard);
                                            }
                                            1 => {
                                                set.remove_with_guard(k, &guard);
                                            }
                                            _ => {
                                                black_box(set.contains_with_guard(k, &guard));
                                            }
                                        }
                                    }
                                })
                            })
                            .collect();

                        barrier.wait();
                        let start = Instant::now();
                        for h in handles {
                            h.join().unwrap();
                        }
                        total += start.elapsed();
                    }
                    total
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_btreeset", threads),
            &threads,
            |b, &threads| {
                b.iter_custom(|iters| {
                    let mut total = std::time::Duration::ZERO;
                    for _ in 0..iters {
                        let set = Arc::new(Mutex::new(BTreeSet::new()));
                        let barrier = Arc::new(Barrier::new(threads + 1));
                        let per_thread = FILL as u64 / threads as u64;

                        let handles: Vec<_> = (0..threads)
                            .map(|t| {
                                let set = Arc::clone(&set);
                                let barrier = Arc::clone(&barrier);
                                thread::spawn(move || {
                                    barrier.wait();
                                    let base = t as u64 * per_thread;
                                    for i in base..base + per_thread {
                                        let k = mixed_key(i % (per_thread * 2));
                                        match i % 3 {
                                            0 => {
                                                set.lock().unwrap().insert(k);
                                            }
                                            1 => {
                                                set.lock().unwrap().remove(&k);
                                            }
                                            _ => {
                                                black_box(set.lock().unwrap().contains(&k));
                                            }
                                        }
                                    }
                                })
                            })
                            .collect();

                        barrier.wait();
                        let start = Instant::now();
                        for h in handles {
                            h.join().unwrap();
                        }
                        total += start.elapsed();
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fill, bench_contains, bench_contended_mix);
criterion_main!(benches);
