//! The latency percentile harness.
//!
//! A run pins the calling thread, optionally starts a contender hammering
//! the same counter from another CPU, warms up, then times `num_batches`
//! batches of `sub_iterations` operations each.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use crate::affinity;
use crate::config::HarnessConfig;
use crate::error::{BenchError, Result};
use crate::op::{filler, SharedCounter, TimedOp};
use crate::stats::LatencySamples;
use crate::timer::now_ns;

/// One benchmark case.
#[derive(Clone)]
pub struct Benchmark {
    pub op: Arc<dyn TimedOp>,
    pub name: String,
    /// Busy-wait iterations the contender performs between its operations.
    /// `None` runs without a contender.
    pub contention: Option<u64>,
    /// Filler `nop`s the measured thread runs after each operation.
    pub duty_cycle: u64,
    /// Operation the contender applies; the measured op when unset.
    pub contender_op: Option<Arc<dyn TimedOp>>,
}

impl Benchmark {
    pub fn new(op: Arc<dyn TimedOp>) -> Self {
        let name = op.name().to_string();
        Self {
            op,
            name,
            contention: None,
            duty_cycle: 0,
            contender_op: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_contention(mut self, contention: Option<u64>) -> Self {
        self.contention = contention;
        self
    }

    pub fn with_duty_cycle(mut self, duty_cycle: u64) -> Self {
        self.duty_cycle = duty_cycle;
        self
    }

    pub fn with_contender_op(mut self, op: Arc<dyn TimedOp>) -> Self {
        self.contender_op = Some(op);
        self
    }
}

/// Result of [`run_with_contention`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub samples: LatencySamples,
    /// Operations the contender issued, `None` without a contender.
    pub contender_ops: Option<u64>,
}

/// Discarded iterations to settle caches, branch predictors and frequency.
pub fn warmup<O: TimedOp + ?Sized>(op: &O, counter: &SharedCounter, iterations: u64) {
    for _ in 0..iterations {
        op.invoke(counter, 1);
    }
    counter.reset();
}

/// Time `num_batches` batches and return their per-operation latencies
/// in nanoseconds, sorted ascending.
pub fn measure<O: TimedOp + ?Sized>(
    op: &O,
    counter: &AtomicU64,
    sub_iterations: u64,
    num_batches: usize,
    duty_cycles: u64,
) -> Result<LatencySamples> {
    if sub_iterations == 0 {
        return Err(BenchError::InvalidConfig(
            "a batch needs at least one operation".into(),
        ));
    }
    let mut latencies = Vec::new();
    latencies
        .try_reserve_exact(num_batches)
        .map_err(|_| BenchError::Alloc(num_batches))?;

    for _ in 0..num_batches {
        let start = now_ns();
        for _ in 0..sub_iterations {
            op.invoke(counter, 1);
            filler(duty_cycles);
        }
        let end = now_ns();
        latencies.push(batch_latency(start, end, sub_iterations)?);
    }

    Ok(LatencySamples::from_unsorted(latencies))
}

/// Per-operation latency of one batch. A timestamp pair running backwards
/// is an anomaly, never a number.
pub fn batch_latency(start: u64, end: u64, sub_iterations: u64) -> Result<f64> {
    if end < start {
        return Err(BenchError::ClockAnomaly { start, end });
    }
    Ok((end - start) as f64 / sub_iterations.max(1) as f64)
}

/// Background thread applying `op` to the shared counter until stopped.
struct Contender<'scope> {
    handle: ScopedJoinHandle<'scope, u64>,
}

impl<'scope> Contender<'scope> {
    /// Spawn and wait until the contender is pinned and running.
    fn start<'env>(
        scope: &'scope Scope<'scope, 'env>,
        op: &'env dyn TimedOp,
        counter: &'env SharedCounter,
        spin: u64,
        cpu: usize,
        stop: &'env AtomicBool,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("contender-{}", cpu))
            .spawn_scoped(scope, move || {
                if let Err(err) = affinity::pin_current(cpu) {
                    let _ = ready_tx.send(Err(err));
                    return 0;
                }
                let _ = ready_tx.send(Ok(()));
                let mut ops = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    op.invoke(counter, 1);
                    filler(spin);
                    ops += 1;
                }
                ops
            })
            .map_err(BenchError::Spawn)?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self { handle }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(BenchError::ThreadPanicked)
            }
        }
    }

    fn stop(self, stop: &AtomicBool) -> Result<u64> {
        stop.store(true, Ordering::Relaxed);
        self.handle.join().map_err(|_| BenchError::ThreadPanicked)
    }
}

/// Run one benchmark on `target_cpu`, optionally under contention from
/// `interferer_cpu` (or the next CPU when unset).
///
/// The calling thread stays pinned to `target_cpu` afterwards.
pub fn run_with_contention(
    bench: &Benchmark,
    counter: &SharedCounter,
    config: &HarnessConfig,
    target_cpu: usize,
    interferer_cpu: Option<usize>,
) -> Result<RunOutcome> {
    config.validate()?;
    let interferer = match bench.contention {
        Some(_) => Some(affinity::pick_interferer(
            target_cpu,
            interferer_cpu,
            affinity::online_cpus()?,
        )?),
        None => None,
    };

    let stop = AtomicBool::new(false);
    let contender_op: &dyn TimedOp = bench.contender_op.as_deref().unwrap_or(&*bench.op);

    thread::scope(|s| -> Result<RunOutcome> {
        let contender = match (bench.contention, interferer) {
            (Some(spin), Some(cpu)) => {
                log::debug!("{}: contender on CPU {} spinning {}", bench.name, cpu, spin);
                Some(Contender::start(s, contender_op, counter, spin, cpu, &stop)?)
            }
            _ => None,
        };

        let measured = affinity::pin_current(target_cpu).and_then(|()| {
            warmup(&*bench.op, counter, config.warmup_iterations());
            measure(
                &*bench.op,
                counter,
                config.sub_iterations(),
                config.buckets,
                bench.duty_cycle,
            )
        });

        let contender_ops = match contender {
            Some(c) => Some(c.stop(&stop)?),
            None => None,
        };

        Ok(RunOutcome {
            samples: measured?,
            contender_ops,
        })
    })
}

/// Op count and wall time of a throughput run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Throughput {
    pub total_ops: u64,
    pub threads: usize,
    pub elapsed: Duration,
}

impl Throughput {
    /// Millions of operations per second, per thread.
    pub fn mops_per_thread(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 || self.threads == 0 {
            return 0.0;
        }
        self.total_ops as f64 / 1e6 / secs / self.threads as f64
    }

    /// Average latency of one operation on one thread, in nanoseconds.
    pub fn latency_ns(&self) -> f64 {
        let mops = self.mops_per_thread();
        if mops == 0.0 {
            return f64::INFINITY;
        }
        1000.0 / mops
    }
}

/// Run `op` on `threads` pinned threads for `duration` and count calls.
///
/// Threads are pinned round-robin over `cpus`.
pub fn measure_throughput<O: TimedOp + ?Sized>(
    op: &O,
    threads: usize,
    duration: Duration,
    cpus: usize,
) -> Result<Throughput> {
    if threads == 0 || cpus == 0 {
        return Err(BenchError::InvalidConfig(
            "throughput run needs at least one thread and one CPU".into(),
        ));
    }
    let go = AtomicBool::new(false);
    let stop = AtomicBool::new(false);
    let counter = SharedCounter::new();

    thread::scope(|s| -> Result<Throughput> {
        let mut handles = Vec::with_capacity(threads);
        let mut spawn_err = None;
        for i in 0..threads {
            let (go, stop, counter) = (&go, &stop, &counter);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", i))
                .spawn_scoped(s, move || -> Result<u64> {
                    affinity::pin_current(i % cpus)?;
                    while !go.load(Ordering::Acquire) {
                        if stop.load(Ordering::Relaxed) {
                            return Ok(0);
                        }
                        std::hint::spin_loop();
                    }
                    let mut count = 0u64;
                    while !stop.load(Ordering::Relaxed) {
                        op.invoke(counter, 1);
                        count += 1;
                    }
                    Ok(count)
                });
            match spawned {
                Ok(h) => handles.push(h),
                Err(err) => {
                    spawn_err = Some(BenchError::Spawn(err));
                    break;
                }
            }
        }

        // The clock covers only the window in which every worker may count.
        let mut elapsed = Duration::ZERO;
        if spawn_err.is_none() {
            go.store(true, Ordering::Release);
            let start = Instant::now();
            thread::sleep(duration);
            stop.store(true, Ordering::Relaxed);
            elapsed = start.elapsed();
        }
        stop.store(true, Ordering::Relaxed);

        let mut total_ops = 0;
        let mut first_err = spawn_err;
        for h in handles {
            match h.join() {
                Ok(Ok(n)) => total_ops += n,
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                }
                Err(_) => {
                    first_err.get_or_insert(BenchError::ThreadPanicked);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(Throughput {
                total_ops,
                threads,
                elapsed,
            }),
        }
    })
}
