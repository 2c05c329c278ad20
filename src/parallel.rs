//! Parallel atomic add benchmark.
//!
//! One pinned thread per CPU; all threads update the same counter at once.
//! Phases (warmup per op, then measurement per op) are separated by a
//! barrier so every thread contends during every measured batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;

use crate::affinity;
use crate::arch;
use crate::config::HarnessConfig;
use crate::error::{BenchError, Result};
use crate::harness::measure;
use crate::op::{SharedCounter, TimedOp};
use crate::printlninfo;
use crate::report;
use crate::stats::{LatencySamples, Percentiles};

#[derive(Debug, Clone)]
pub struct ParallelOptions {
    pub config: HarnessConfig,
    /// Thread count; defaults to one per online CPU.
    pub threads: Option<usize>,
    pub duty_cycle: u64,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        Self {
            config: HarnessConfig::parallel(),
            threads: None,
            duty_cycle: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ThreadReport {
    pub thread: usize,
    pub cpu: usize,
    pub results: Vec<(String, Percentiles)>,
}

#[derive(Debug, Clone)]
pub struct ParallelReport {
    pub threads: Vec<ThreadReport>,
    /// Final value of each op's shared counter, in op order.
    pub counters: Vec<(String, u64)>,
    pub expected: u64,
}

fn worker(
    cpu: usize,
    ops: &[Arc<dyn TimedOp>],
    counters: &[SharedCounter],
    opts: &ParallelOptions,
    barrier: &Barrier,
    failed: &AtomicBool,
    go: mpsc::Receiver<()>,
) -> Result<Vec<LatencySamples>> {
    // Dropped sender means a sibling failed to spawn.
    if go.recv().is_err() {
        return Ok(Vec::new());
    }
    let pinned = affinity::pin_current(cpu);
    if pinned.is_err() {
        failed.store(true, Ordering::Relaxed);
    }
    barrier.wait();
    pinned?;
    if failed.load(Ordering::Relaxed) {
        return Ok(Vec::new());
    }

    // Warmup does not reset here: the counters are shared and the final
    // value is compared against the expected total.
    for (op, counter) in ops.iter().zip(counters) {
        for _ in 0..opts.config.warmup_iterations() {
            op.invoke(counter, 1);
        }
        barrier.wait();
    }

    let mut results = Vec::with_capacity(ops.len());
    for (op, counter) in ops.iter().zip(counters) {
        results.push(measure(
            &**op,
            counter,
            opts.config.sub_iterations(),
            opts.config.buckets,
            opts.duty_cycle,
        ));
        barrier.wait();
    }
    results.into_iter().collect()
}

pub fn run_parallel(ops: &[Arc<dyn TimedOp>], opts: &ParallelOptions) -> Result<ParallelReport> {
    opts.config.validate()?;
    let ncpus = affinity::online_cpus()?;
    let nthreads = opts.threads.unwrap_or(ncpus);
    if nthreads == 0 {
        return Err(BenchError::InvalidConfig("thread count must be at least 1".into()));
    }

    let counters: Vec<SharedCounter> = ops.iter().map(|_| SharedCounter::new()).collect();
    let barrier = Barrier::new(nthreads);
    let failed = AtomicBool::new(false);

    let outcomes = thread::scope(|s| -> Result<Vec<Result<Vec<LatencySamples>>>> {
        let mut handles = Vec::with_capacity(nthreads);
        let mut go_senders = Vec::with_capacity(nthreads);
        for i in 0..nthreads {
            let (tx, rx) = mpsc::channel();
            let (counters, barrier, failed) = (&counters, &barrier, &failed);
            let handle = thread::Builder::new()
                .name(format!("parallel-{}", i))
                .spawn_scoped(s, move || {
                    worker(i % ncpus, ops, counters, opts, barrier, failed, rx)
                })
                .map_err(BenchError::Spawn);
            match handle {
                Ok(h) => {
                    handles.push(h);
                    go_senders.push(tx);
                }
                Err(err) => {
                    drop(go_senders);
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(err);
                }
            }
        }
        for tx in &go_senders {
            let _ = tx.send(());
        }
        Ok(handles
            .into_iter()
            .map(|h| h.join().unwrap_or(Err(BenchError::ThreadPanicked)))
            .collect())
    })?;

    let mut threads = Vec::with_capacity(nthreads);
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let samples = outcome?;
        let mut results = Vec::with_capacity(ops.len());
        for (op, s) in ops.iter().zip(samples) {
            let p = s
                .percentiles()
                .ok_or_else(|| BenchError::InvalidConfig("no latency samples".into()))?;
            results.push((op.name().to_string(), p));
        }
        threads.push(ThreadReport {
            thread: i,
            cpu: i % ncpus,
            results,
        });
    }

    let per_thread = opts.config.warmup_iterations()
        + opts.config.buckets as u64 * opts.config.sub_iterations();
    Ok(ParallelReport {
        threads,
        counters: ops
            .iter()
            .zip(&counters)
            .map(|(op, c)| (op.name().to_string(), c.value()))
            .collect(),
        expected: per_thread * nthreads as u64,
    })
}

pub fn do_parallel(opts: &ParallelOptions) -> Result<ParallelReport> {
    let ncpus = affinity::online_cpus()?;
    let nthreads = opts.threads.unwrap_or(ncpus);
    printlninfo!("Parallel Atomic Add Benchmark");
    printlninfo!("====================================");
    printlninfo!("Running parallel atomic operations with contention...");
    printlninfo!(
        "Percentile measurements ({} iterations per thread)...",
        opts.config.buckets
    );
    printlninfo!("Detected {} CPUs, creating {} threads", ncpus, nthreads);

    let ops = arch::atomic_ops();
    let report = run_parallel(&ops, opts)?;

    for t in &report.threads {
        printlninfo!("{}", report::thread_header(t.thread, t.cpu));
        for (name, p) in &t.results {
            printlninfo!("{}", report::percentile_line(name, p));
        }
    }

    printlninfo!("\nShared counters final values:");
    for (name, value) in &report.counters {
        printlninfo!("{:<16}: {}", name, value);
    }
    printlninfo!("{:<16}: {}", "Expected", report.expected);
    printlninfo!("\n=== Benchmark Complete ===");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{CasLoop, FetchAdd};

    #[test]
    fn counters_reach_expected_total() {
        let ops: Vec<Arc<dyn TimedOp>> = vec![Arc::new(CasLoop), Arc::new(FetchAdd)];
        let opts = ParallelOptions {
            config: HarnessConfig::parallel()
                .with_iterations(10_000)
                .with_buckets(10),
            threads: Some(2),
            duty_cycle: 0,
        };
        let report = run_parallel(&ops, &opts).unwrap();
        assert_eq!(report.threads.len(), 2);
        assert_eq!(report.expected, (10 + 10_000) * 2);
        for (_, value) in &report.counters {
            assert_eq!(*value, report.expected);
        }
        for t in &report.threads {
            assert_eq!(t.results.len(), 2);
        }
    }

    #[test]
    fn zero_threads_rejected() {
        let ops: Vec<Arc<dyn TimedOp>> = vec![Arc::new(FetchAdd)];
        let opts = ParallelOptions {
            threads: Some(0),
            ..ParallelOptions::default()
        };
        assert!(run_parallel(&ops, &opts).is_err());
    }
}
