//! Null syscall benchmark (`getpid` and friends).
//!
//! Default mode splits the run into 100 time slices and reports the
//! distribution of per-slice throughput and latency. `--cycles` brackets
//! every single call with two cycle-counter reads instead.

use std::time::Duration;

use crate::affinity;
use crate::arch;
use crate::error::{BenchError, Result};
use crate::harness::measure_throughput;
use crate::op::{SyscallOp, TimedOp};
use crate::report;
use crate::stats::{calculate_stats, check_spread, sort_latencies};
use crate::timer::print_header;
use crate::{printlninfo, THRESHOLD_ERROR_RATIO};

/// Time slices per run.
pub const DATAPOINTS: usize = 100;
/// Calls per round in cycle-counter mode.
pub const CYCLE_ROUND_CALLS: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct NullOptions {
    pub secs: u64,
    pub threads: usize,
    pub syscall: SyscallOp,
    pub verbose: bool,
    pub raw: bool,
    /// Rounds of cycle-counter measurement; slice mode when unset.
    pub cycles: Option<usize>,
    /// CPU for cycle-counter mode.
    pub cpu: usize,
}

impl Default for NullOptions {
    fn default() -> Self {
        Self {
            secs: 1,
            threads: 1,
            syscall: SyscallOp::Getpid,
            verbose: false,
            raw: false,
            cycles: None,
            cpu: 0,
        }
    }
}

/// Sorted per-slice samples.
#[derive(Debug, Clone)]
pub struct SliceReport {
    /// Millions of calls per second per thread.
    pub throughput: Vec<f64>,
    /// Nanoseconds per call.
    pub latency: Vec<f64>,
}

pub fn do_null_slices(opts: &NullOptions) -> Result<SliceReport> {
    if opts.threads == 0 {
        return Err(BenchError::InvalidConfig("thread count must be at least 1".into()));
    }
    let ncpus = affinity::online_cpus()?;
    let slice = Duration::from_secs(opts.secs) / DATAPOINTS as u32;

    printlninfo!("running {} threads for {} seconds", opts.threads, opts.secs);

    let mut throughput = Vec::with_capacity(DATAPOINTS);
    let mut latency = Vec::with_capacity(DATAPOINTS);
    for _ in 0..DATAPOINTS {
        let t = measure_throughput(&opts.syscall, opts.threads, slice, ncpus)?;
        let (mops, lat) = (t.mops_per_thread(), t.latency_ns());
        if opts.verbose {
            printlninfo!(
                "Number of calls: {:.2} M/s per thread. Avg Latency: {:.2} ns",
                mops,
                lat
            );
        }
        throughput.push(mops);
        latency.push(lat);
    }
    sort_latencies(&mut throughput);
    sort_latencies(&mut latency);

    printlninfo!("{}", report::slice_summary(&throughput, &latency, opts.raw));
    Ok(SliceReport {
        throughput,
        latency,
    })
}

/// Nanoseconds between two cycle-counter reads.
fn call_latency(t0: u64, t1: u64, ns_per_tick: f64) -> Result<f64> {
    if arch::counter_anomaly(t0, t1) {
        return Err(BenchError::ClockAnomaly { start: t0, end: t1 });
    }
    Ok((t1 - t0) as f64 * ns_per_tick)
}

/// One round: average ns per call over `calls` individually bracketed calls.
fn do_null_inner(
    syscall: SyscallOp,
    frequency: f64,
    calls: u64,
    th: usize,
    nr: usize,
) -> Result<f64> {
    let ns_per_tick = 1e9 / frequency;
    let mut acc = 0.0;
    for _ in 0..calls {
        let t0 = arch::read_cycle_counter();
        let id = syscall.call();
        let t1 = arch::read_cycle_counter();
        if id < 0 {
            log::debug!("{} returned {}", syscall.name(), id);
        }
        acc += call_latency(t0, t1, ns_per_tick)?;
    }
    let avg = acc / calls as f64;
    log::debug!("null_test_inner ({}/{}): {:.3} ns", th, nr, avg);
    Ok(avg)
}

pub fn do_null_cycles(opts: &NullOptions, rounds: usize, calls: u64) -> Result<Vec<f64>> {
    affinity::pin_current(opts.cpu)?;
    let frequency = arch::counter_frequency();
    print_header(rounds, calls);
    printlninfo!("Counter: {} at {:.0} Hz", arch::counter_name(), frequency);

    let mut averages = Vec::with_capacity(rounds);
    for i in 0..rounds {
        let avg = do_null_inner(opts.syscall, frequency, calls, i + 1, rounds)?;
        printlninfo!("Average= {:.2} ns", avg);
        averages.push(avg);
    }

    check_spread("null_test", &averages, THRESHOLD_ERROR_RATIO);
    if let Some(stats) = calculate_stats(&averages) {
        printlninfo!("{:?}", stats);
    }
    Ok(averages)
}

pub fn do_null(opts: &NullOptions) -> Result<()> {
    match opts.cycles {
        Some(rounds) => do_null_cycles(opts, rounds, CYCLE_ROUND_CALLS).map(|_| ()),
        None => do_null_slices(opts).map(|_| ()),
    }
}
