//! Per-CPU atomic add benchmark: LL/SC vs. single-instruction atomics.
//!
//! Each CPU in turn runs every atomic variant the machine offers, each on
//! its own counter, optionally under contention from a second CPU.

use std::sync::Arc;

use crate::affinity;
use crate::arch;
use crate::config::HarnessConfig;
use crate::error::{BenchError, Result};
use crate::harness::{run_with_contention, Benchmark};
use crate::op::{SharedCounter, TimedOp};
use crate::printlninfo;
use crate::report;
use crate::stats::Percentiles;

#[derive(Debug, Clone, Default)]
pub struct LseOptions {
    pub config: HarnessConfig,
    /// Only measure this CPU.
    pub cpu: Option<usize>,
    pub contention: Option<u64>,
    pub duty_cycle: u64,
    pub interferer: Option<usize>,
}

/// Percentiles of every op on one CPU.
#[derive(Debug, Clone)]
pub struct CpuReport {
    pub cpu: usize,
    pub results: Vec<(String, Percentiles)>,
}

pub fn benchmarks(ops: Vec<Arc<dyn TimedOp>>, opts: &LseOptions) -> Vec<Benchmark> {
    ops.into_iter()
        .map(|op| {
            Benchmark::new(op)
                .with_contention(opts.contention)
                .with_duty_cycle(opts.duty_cycle)
        })
        .collect()
}

/// Run every benchmark on `cpu` and print its block.
pub fn run_on_cpu(cpu: usize, benches: &[Benchmark], opts: &LseOptions) -> Result<CpuReport> {
    let mut results = Vec::with_capacity(benches.len());
    for bench in benches {
        let counter = SharedCounter::new();
        let outcome = run_with_contention(bench, &counter, &opts.config, cpu, opts.interferer)?;
        if let Some(ops) = outcome.contender_ops {
            log::debug!("CPU {}: {} contender issued {} ops", cpu, bench.name, ops);
        }
        let p = outcome
            .samples
            .percentiles()
            .ok_or_else(|| BenchError::InvalidConfig("no latency samples".into()))?;
        results.push((bench.name.clone(), p));
    }

    printlninfo!("{}", report::cpu_header(cpu));
    for (name, p) in &results {
        printlninfo!("{}", report::percentile_line(name, p));
    }
    Ok(CpuReport { cpu, results })
}

pub fn do_lse(opts: &LseOptions) -> Result<Vec<CpuReport>> {
    opts.config.validate()?;
    let ncpus = affinity::online_cpus()?;
    let cpus: Vec<usize> = match opts.cpu {
        Some(cpu) if cpu >= ncpus => {
            return Err(BenchError::InvalidConfig(format!(
                "CPU {} does not exist ({} online)",
                cpu, ncpus
            )))
        }
        Some(cpu) => vec![cpu],
        None => (0..ncpus).collect(),
    };

    printlninfo!("Per-CPU Atomic Add Benchmark");
    printlninfo!("===================================");
    printlninfo!(
        "Running percentile measurements ({} buckets of {} ops)...",
        opts.config.buckets,
        opts.config.sub_iterations()
    );
    printlninfo!("Detected {} CPUs", ncpus);
    if let Some(spin) = opts.contention {
        printlninfo!("Contention: interferer spins {} iterations per op", spin);
    }
    if opts.duty_cycle > 0 {
        printlninfo!("Duty cycle: {} nops after each op", opts.duty_cycle);
    }

    let benches = benchmarks(arch::atomic_ops(), opts);
    let mut reports = Vec::with_capacity(cpus.len());
    for cpu in cpus {
        reports.push(run_on_cpu(cpu, &benches, opts)?);
    }

    printlninfo!("\n=== Benchmark Complete ===");
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> LseOptions {
        LseOptions {
            config: HarnessConfig::default()
                .with_iterations(20_000)
                .with_buckets(20),
            cpu: Some(0),
            ..LseOptions::default()
        }
    }

    #[test]
    fn single_cpu_reports_every_op() {
        let opts = small();
        let reports = std::thread::spawn(move || do_lse(&opts)).join().unwrap().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].cpu, 0);
        assert_eq!(reports[0].results.len(), arch::atomic_ops().len());
        for (_, p) in &reports[0].results {
            assert!(p.p50 >= 0.0 && p.p50 <= p.p95 && p.p95 <= p.p99);
        }
    }

    #[test]
    fn missing_cpu_is_rejected() {
        let opts = LseOptions {
            cpu: Some(usize::MAX),
            ..small()
        };
        assert!(matches!(do_lse(&opts), Err(BenchError::InvalidConfig(_))));
    }

    #[test]
    fn descriptors_carry_options() {
        let opts = LseOptions {
            contention: Some(7),
            duty_cycle: 3,
            ..small()
        };
        for b in benchmarks(arch::atomic_ops(), &opts) {
            assert_eq!(b.contention, Some(7));
            assert_eq!(b.duty_cycle, 3);
        }
    }
}
