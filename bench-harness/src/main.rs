//! Worker-thread benchmark matching the allocator's original size-class
//! mixture: a configurable number of threads each running a fixed number of
//! allocate/release cycles, with per-thread metrics joined back in the
//! parent rather than shared behind a mutex.

use alloc_core::SegmentedAllocator;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SMALL_MIN: usize = 16;
const SMALL_MAX: usize = 1024;
const MID_MAX: usize = 51_200;
const LARGE_MAX: usize = 102_400;

/// Concurrent stress harness for the segmented allocator.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    /// Number of worker threads.
    #[arg(long, default_value_t = 16)]
    threads: usize,

    /// Allocate/release cycles run by each worker thread.
    #[arg(long, default_value_t = 100)]
    ops_per_thread: usize,

    /// Seed the per-thread RNGs for a reproducible size-class mixture
    /// (thread `i` gets seed `seed + i`). Omit for a nondeterministic run.
    #[arg(long)]
    seed: Option<u64>,
}

/// Picks a request size with the same 90/5/5 mixture as the original
/// harness: 90% in `[16, 1KiB]`, 5% in `(1KiB, 50KiB]`, 5% in `(50KiB,
/// 100KiB]`. All three bands sit well below the large-segment threshold, so
/// this benchmark only exercises the round-robined small segments.
fn choose_size(rng: &mut impl Rng) -> usize {
    let p: f64 = rng.gen();
    if p < 0.90 {
        rng.gen_range(SMALL_MIN..=SMALL_MAX)
    } else if p < 0.95 {
        rng.gen_range(SMALL_MAX..=MID_MAX)
    } else {
        rng.gen_range(MID_MAX..=LARGE_MAX)
    }
}

/// Metrics collected by a single worker thread. "Large" here means the
/// original harness's size-class split (>= 1KiB), not this allocator's
/// dedicated large segment.
#[derive(Default)]
struct ThreadMetrics {
    allocations: u64,
    successes: u64,
    frees: u64,
    latency: Duration,
    large_attempts: u64,
    large_successes: u64,
    large_latency: Duration,
    large_latency_count: u64,
}

fn run_worker(alloc: &SegmentedAllocator, ops: usize, mut rng: impl Rng) -> ThreadMetrics {
    let mut metrics = ThreadMetrics::default();

    for _ in 0..ops {
        let size = choose_size(&mut rng);
        let is_large_class = size >= SMALL_MAX;

        let start = Instant::now();
        let ptr = alloc.allocate(size);
        let elapsed = start.elapsed();

        metrics.allocations += 1;
        metrics.latency += elapsed;
        if is_large_class {
            metrics.large_attempts += 1;
        }
        if ptr.is_some() {
            metrics.successes += 1;
            if is_large_class {
                metrics.large_successes += 1;
                metrics.large_latency += elapsed;
                metrics.large_latency_count += 1;
            }
        }

        if let Some(p) = ptr {
            alloc.release(p);
            metrics.frees += 1;
        }
    }

    metrics
}

#[allow(clippy::cast_precision_loss)]
fn main() {
    env_logger::init();
    let args = Args::parse();

    let alloc = Arc::new(SegmentedAllocator::new());
    let start = Instant::now();

    let handles: Vec<_> = (0..args.threads)
        .map(|i| {
            let alloc = Arc::clone(&alloc);
            let ops = args.ops_per_thread;
            let seed = args.seed;
            thread::spawn(move || match seed {
                Some(seed) => run_worker(&alloc, ops, StdRng::seed_from_u64(seed + i as u64)),
                None => run_worker(&alloc, ops, rand::thread_rng()),
            })
        })
        .collect();

    let results: Vec<ThreadMetrics> = handles
        .into_iter()
        .map(|h| h.join().expect("worker thread panicked"))
        .collect();

    let elapsed = start.elapsed();
    alloc.teardown();

    let totals = results.into_iter().fold(ThreadMetrics::default(), |mut acc, m| {
        acc.allocations += m.allocations;
        acc.successes += m.successes;
        acc.frees += m.frees;
        acc.latency += m.latency;
        acc.large_attempts += m.large_attempts;
        acc.large_successes += m.large_successes;
        acc.large_latency += m.large_latency;
        acc.large_latency_count += m.large_latency_count;
        acc
    });

    let total_ops = totals.allocations + totals.frees;
    let elapsed_s = elapsed.as_secs_f64();
    let throughput = total_ops as f64 / elapsed_s;
    let avg_latency_us = totals.latency.as_secs_f64() * 1e6 / totals.allocations as f64;
    let success_ratio = totals.successes as f64 / totals.allocations as f64 * 100.0;
    let large_success_ratio = if totals.large_attempts > 0 {
        totals.large_successes as f64 / totals.large_attempts as f64 * 100.0
    } else {
        0.0
    };
    let avg_large_latency_us = if totals.large_latency_count > 0 {
        totals.large_latency.as_secs_f64() * 1e6 / totals.large_latency_count as f64
    } else {
        0.0
    };

    log::info!(
        "benchmark complete: {} threads, {} ops/thread, {elapsed_s:.3}s wall clock",
        args.threads,
        args.ops_per_thread
    );

    println!("=== Test Harness Results ===");
    println!("Threads: {}", args.threads);
    println!("Ops per thread: {}", args.ops_per_thread);
    println!("Elapsed wall time: {elapsed_s:.3} s");
    println!("Total ops (alloc+free): {total_ops}");
    println!("Throughput: {throughput:.1} ops/s");
    println!("Avg malloc latency: {avg_latency_us:.3} µs");
    println!("Total mallocs: {}", totals.allocations);
    println!("Total malloc successes: {}", totals.successes);
    println!("Success ratio: {success_ratio:.2}%");
    println!("Large-class alloc attempts: {}", totals.large_attempts);
    println!("Large-class success ratio: {large_success_ratio:.2}%");
    println!("Avg large-class latency: {avg_large_latency_us:.3} µs");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choose_size_stays_within_its_band() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let size = choose_size(&mut rng);
            assert!((SMALL_MIN..=LARGE_MAX).contains(&size));
        }
    }

    #[test]
    fn worker_against_a_fresh_allocator_mostly_succeeds() {
        let alloc = SegmentedAllocator::new();
        let rng = StdRng::seed_from_u64(7);
        let metrics = run_worker(&alloc, 50, rng);

        assert_eq!(metrics.allocations, 50);
        assert!(metrics.successes > 0, "a fresh allocator should satisfy at least some requests");
        assert_eq!(metrics.successes, metrics.frees, "every successful allocation is released");
    }
}
