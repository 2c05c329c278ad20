//! `clock_gettime` benchmark across clock ids.
//!
//! Clocks served by the vDSO never enter the kernel; the CPU-time and alarm
//! clocks always do. Id 10 reads the architecture's cycle counter directly
//! as a lower bound.

use std::hint::black_box;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use crate::affinity;
use crate::arch::{self, Barrier};
use crate::config::HarnessConfig;
use crate::error::{BenchError, Result};
use crate::harness::{measure_throughput, run_with_contention, Benchmark};
use crate::op::{SharedCounter, TimedOp};
use crate::report;
use crate::stats::Percentiles;
use crate::timer;
use crate::{printlninfo, printlnwarn};

/// Linux clock ids 0..=9 and the raw counter pseudo-id.
pub const RAW_COUNTER_ID: i32 = 10;

const CLOCK_NAMES: [&str; 10] = [
    "CLOCK_REALTIME",
    "CLOCK_MONOTONIC",
    "CLOCK_PROCESS_CPUTIME_ID",
    "CLOCK_THREAD_CPUTIME_ID",
    "CLOCK_MONOTONIC_RAW",
    "CLOCK_REALTIME_COARSE",
    "CLOCK_MONOTONIC_COARSE",
    "CLOCK_BOOTTIME",
    "CLOCK_REALTIME_ALARM",
    "CLOCK_BOOTTIME_ALARM",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock(i32);

impl Clock {
    pub fn from_id(id: i32) -> Result<Self> {
        if (0..=RAW_COUNTER_ID).contains(&id) {
            Ok(Clock(id))
        } else {
            Err(BenchError::InvalidConfig(format!(
                "unknown clock id {} (0..={})",
                id, RAW_COUNTER_ID
            )))
        }
    }

    pub fn all() -> impl Iterator<Item = Clock> {
        (0..=RAW_COUNTER_ID).map(Clock)
    }

    pub fn id(self) -> i32 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            RAW_COUNTER_ID => arch::counter_name(),
            id => CLOCK_NAMES[id as usize],
        }
    }

    pub fn is_raw_counter(self) -> bool {
        self.0 == RAW_COUNTER_ID
    }

    /// Whether reads stay in user space.
    pub fn vdso_accelerated(self) -> bool {
        matches!(
            self.0,
            libc::CLOCK_REALTIME
                | libc::CLOCK_MONOTONIC
                | libc::CLOCK_MONOTONIC_RAW
                | libc::CLOCK_REALTIME_COARSE
                | libc::CLOCK_MONOTONIC_COARSE
                | libc::CLOCK_BOOTTIME
                | RAW_COUNTER_ID
        )
    }

    /// Read once to make sure the kernel supports this clock here.
    pub fn probe(self) -> Result<()> {
        if !self.is_raw_counter() {
            timer::clock_ns(self.0, self.name())?;
        }
        Ok(())
    }
}

/// One clock read, optionally preceded by a barrier.
pub struct ClockRead {
    clock: Clock,
    barrier: Barrier,
}

impl ClockRead {
    pub fn new(clock: Clock, barrier: Barrier) -> Self {
        Self { clock, barrier }
    }
}

impl TimedOp for ClockRead {
    fn name(&self) -> &str {
        self.clock.name()
    }

    #[inline(always)]
    fn invoke(&self, _counter: &AtomicU64, _value: u64) {
        arch::barrier(self.barrier);
        if self.clock.is_raw_counter() {
            black_box(arch::read_cycle_counter());
        } else {
            let mut ts = libc::timespec {
                tv_sec: 0,
                tv_nsec: 0,
            };
            unsafe { libc::clock_gettime(self.clock.0, &mut ts) };
            black_box(ts);
        }
    }
}

#[derive(Debug, Clone)]
pub struct VdsoOptions {
    pub secs: u64,
    pub threads: usize,
    /// Run only this clock; all clocks otherwise.
    pub clock: Option<i32>,
    /// Skip clocks that are not served by the vDSO.
    pub vdso_only: bool,
    pub barrier: Barrier,
    /// Also run the percentile harness per clock on CPU 0.
    pub percentiles: bool,
    pub config: HarnessConfig,
}

impl Default for VdsoOptions {
    fn default() -> Self {
        Self {
            secs: 1,
            threads: 1,
            clock: None,
            vdso_only: false,
            barrier: Barrier::None,
            percentiles: false,
            config: HarnessConfig::default().with_iterations(10_000_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClockReport {
    pub clock: Clock,
    pub mops_per_thread: f64,
    pub percentiles: Option<Percentiles>,
}

/// Clocks selected by `opts`, in id order.
pub fn selected_clocks(opts: &VdsoOptions) -> Result<Vec<Clock>> {
    let clocks: Vec<Clock> = match opts.clock {
        Some(id) => vec![Clock::from_id(id)?],
        None => Clock::all().collect(),
    };
    Ok(clocks
        .into_iter()
        .filter(|c| !opts.vdso_only || c.vdso_accelerated())
        .collect())
}

pub fn run_clock(clock: Clock, opts: &VdsoOptions, ncpus: usize) -> Result<ClockReport> {
    clock.probe()?;
    let op = Arc::new(ClockRead::new(clock, opts.barrier));
    let throughput = measure_throughput(
        &*op,
        opts.threads,
        Duration::from_secs(opts.secs),
        ncpus,
    )?;

    let percentiles = if opts.percentiles {
        let counter = SharedCounter::new();
        let outcome = run_with_contention(&Benchmark::new(op), &counter, &opts.config, 0, None)?;
        outcome.samples.percentiles()
    } else {
        None
    };

    Ok(ClockReport {
        clock,
        mops_per_thread: throughput.mops_per_thread(),
        percentiles,
    })
}

pub fn do_vdso(opts: &VdsoOptions) -> Result<Vec<ClockReport>> {
    if opts.threads == 0 {
        return Err(BenchError::InvalidConfig("thread count must be at least 1".into()));
    }
    if opts.percentiles {
        opts.config.validate()?;
    }
    let ncpus = affinity::online_cpus()?;
    let clocks = selected_clocks(opts)?;

    printlninfo!("running {} threads for {} seconds", opts.threads, opts.secs);
    if opts.barrier != Barrier::None {
        printlninfo!("barrier before each read: {:?}", opts.barrier);
    }

    let mut reports = Vec::with_capacity(clocks.len());
    for clock in clocks {
        let report = match run_clock(clock, opts, ncpus) {
            Ok(report) => report,
            // Alarm clocks need an RTC; only an explicit request is fatal.
            Err(err @ BenchError::Clock { .. }) if opts.clock.is_none() => {
                printlnwarn!("skipping {}: {}", clock.name(), err);
                continue;
            }
            Err(err) => return Err(err),
        };
        printlninfo!("{}", report::throughput_line(clock.name(), report.mops_per_thread));
        if let Some(p) = &report.percentiles {
            printlninfo!("{}", report::percentile_line(clock.name(), p));
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Help text listing supported clock ids.
pub fn clock_list() -> String {
    let mut out = String::from("Supported clock ids:\n");
    for clock in Clock::all() {
        out.push_str(&format!("    {:>2} : {}\n", clock.id(), clock.name()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_ids_map_to_linux_names() {
        assert_eq!(Clock::from_id(1).unwrap().name(), "CLOCK_MONOTONIC");
        assert_eq!(Clock::from_id(6).unwrap().name(), "CLOCK_MONOTONIC_COARSE");
        assert!(Clock::from_id(RAW_COUNTER_ID).unwrap().is_raw_counter());
        assert!(Clock::from_id(11).is_err());
        assert!(Clock::from_id(-1).is_err());
        assert_eq!(Clock::all().count(), 11);
    }

    #[test]
    fn vdso_only_filters_syscall_clocks() {
        let opts = VdsoOptions {
            vdso_only: true,
            ..VdsoOptions::default()
        };
        let clocks = selected_clocks(&opts).unwrap();
        assert!(clocks.iter().all(|c| c.vdso_accelerated()));
        assert!(!clocks.iter().any(|c| c.id() == libc::CLOCK_THREAD_CPUTIME_ID));
        assert!(clocks.iter().any(|c| c.id() == libc::CLOCK_MONOTONIC));
    }

    #[test]
    fn monotonic_throughput_and_percentiles() {
        let opts = VdsoOptions {
            secs: 0,
            clock: Some(libc::CLOCK_MONOTONIC),
            percentiles: true,
            config: HarnessConfig::default().with_iterations(10_000).with_buckets(10),
            ..VdsoOptions::default()
        };
        let reports = std::thread::spawn(move || do_vdso(&opts)).join().unwrap().unwrap();
        assert_eq!(reports.len(), 1);
        let p = reports[0].percentiles.unwrap();
        assert!(p.p50 > 0.0 && p.p50 <= p.p95 && p.p95 <= p.p99);
    }

    #[test]
    fn raw_counter_read_with_barrier() {
        let op = ClockRead::new(Clock::from_id(RAW_COUNTER_ID).unwrap(), Barrier::Instruction);
        let counter = AtomicU64::new(0);
        op.invoke(&counter, 1);
        assert!(op.name().len() > 0);
    }

    #[test]
    fn clock_list_has_every_id() {
        let list = clock_list();
        assert!(list.contains("CLOCK_BOOTTIME_ALARM"));
        assert_eq!(list.lines().count(), 12);
    }
}
