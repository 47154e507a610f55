//! Concurrent throughput driver.
//!
//! Spawns `THREADS` workers that each run `OPS` randomized inserts, then
//! membership tests, then removes against one shared set, and reports
//! elapsed seconds per phase.
//!
//! Run with:
//! ```bash
//! cargo run --release --bin throughput
//! THREADS=16 OPS=200000 cargo run --release --bin throughput
//!
//! # With retry/publication logging
//! RUST_LOG=lazyskip=trace cargo run --release --features tracing --bin throughput
//! ```

use std::env;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use lazyskip::SkipSet;

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_ids(true)
        .compact()
        .try_init();
}

#[cfg(not(feature = "tracing"))]
fn init_tracing() {}

/// Run one phase across all workers and return elapsed seconds plus the
/// total number of `true` results.
fn run_phase<F>(set: &Arc<SkipSet>, workloads: &[Vec<i64>], op: F) -> (f64, usize)
where
    F: Fn(&SkipSet, i64) -> bool + Copy + Send + 'static,
{
    let start = Instant::now();
    let handles: Vec<_> = workloads
        .iter()
        .map(|keys| {
            let set = Arc::clone(set);
            let keys = keys.clone();
            thread::spawn(move || keys.iter().filter(|&&k| op(&set, k)).count())
        })
        .collect();

    let hits: usize = handles
        .into_iter()
        .map(|h| h.join().expect("worker panicked"))
        .sum();
    (start.elapsed().as_secs_f64(), hits)
}

fn main() {
    init_tracing();

    let threads = env_or("THREADS", 8);
    let ops = env_or("OPS", 100_000);
    let total = threads * ops;

    // Pre-generate the key streams so RNG cost stays out of the timings.
    let mut seeder = SmallRng::from_entropy();
    let workloads: Vec<Vec<i64>> = (0..threads)
        .map(|_| {
            let mut rng = SmallRng::from_rng(&mut seeder).expect("seeding thread rng");
            (0..ops).map(|_| rng.gen_range(0..total as i64)).collect()
        })
        .collect();

    let set = Arc::new(SkipSet::new());

    let (secs, added) = run_phase(&set, &workloads, SkipSet::insert);
    println!("concurrent insert():   {total} ops / {threads} threads, {added} added, {secs:.3} s");

    let (secs, present) = run_phase(&set, &workloads, SkipSet::contains);
    println!("concurrent contains(): {total} ops / {threads} threads, {present} hits, {secs:.3} s");

    let (secs, removed) = run_phase(&set, &workloads, SkipSet::remove);
    println!("concurrent remove():   {total} ops / {threads} threads, {removed} removed, {secs:.3} s");

    assert_eq!(added, removed, "every added key must be removed exactly once");
    assert!(set.is_empty(), "set should be empty after the remove phase");
}
