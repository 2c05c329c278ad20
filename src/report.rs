//! Text rendering of results. Everything returns `String` so callers decide
//! where it goes and tests can inspect it.

use std::fmt::Write;

use crate::stats::{percentile, Percentiles};

const RULE: &str = "====================";

/// Header of a per-CPU block.
pub fn cpu_header(cpu: usize) -> String {
    format!("\n CPU: {} - Latency Percentiles:\n{}", cpu, RULE)
}

/// Header of a per-thread block in the parallel bench.
pub fn thread_header(thread: usize, cpu: usize) -> String {
    format!(
        "\n Thread {} (CPU {}) - Latency Percentiles:\n{}",
        thread, cpu, RULE
    )
}

/// `NAME            :   p50: 001.23 ns	  p95: ...	  p99: ... ns`
pub fn percentile_line(name: &str, p: &Percentiles) -> String {
    format!(
        "{:<16}:   p50: {:06.2} ns\t  p95: {:06.2} ns\t  p99: {:06.2} ns",
        name, p.p50, p.p95, p.p99
    )
}

pub fn throughput_line(name: &str, mops_per_thread: f64) -> String {
    format!(
        "Number of calls to {} : {:.2} M/s per thread",
        name, mops_per_thread
    )
}

/// min/p50/p95 of per-slice throughput and latency, both sorted ascending.
pub fn slice_summary(throughput: &[f64], latency: &[f64], raw: bool) -> String {
    let pick = |s: &[f64], p: f64| percentile(s, p).unwrap_or(f64::NAN);
    let mut out = String::new();
    if !raw {
        out.push_str("Throughput (M syscalls/s per thread)\t\tLatency (per syscall in ns):\n");
    }
    let _ = write!(
        out,
        " min={:.2}\tp50={:.2}\tp95={:.2}\t | \tmin={:.2}\tp50={:.2}\tp95={:.2}",
        pick(throughput, 0.0),
        pick(throughput, 50.0),
        pick(throughput, 95.0),
        pick(latency, 0.0),
        pick(latency, 50.0),
        pick(latency, 95.0),
    );
    out
}
