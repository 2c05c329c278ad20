//! Context switch overhead.
//!
//! Two threads pinned to the same CPU yield to each other; the cost of
//! spawning and joining them is measured with no-op threads and
//! subtracted.
use std::thread;

use crate::affinity;
use crate::error::{BenchError, Result};
use crate::stats::{calculate_stats, check_spread, Stats};
use crate::timer::{now_ns, print_header};
use crate::{printlninfo, printlnwarn, THRESHOLD_ERROR_RATIO, TRIES, T_UNIT};

pub const CTX_ITER: u64 = 100_000;

#[derive(Debug, Clone, Copy)]
pub struct CtxOptions {
    pub cpu: usize,
    pub iterations: u64,
    pub tries: usize,
}

impl Default for CtxOptions {
    fn default() -> Self {
        Self {
            cpu: 0,
            iterations: CTX_ITER,
            tries: TRIES,
        }
    }
}

/// Spawn two threads pinned to `cpu` running `body`, wait for both.
fn run_pair(cpu: usize, iterations: u64, body: fn(u64)) -> Result<()> {
    thread::scope(|s| -> Result<()> {
        let mut handles = Vec::with_capacity(2);
        for i in 0..2 {
            let h = thread::Builder::new()
                .name(format!("ctx-{}", i))
                .spawn_scoped(s, move || -> Result<()> {
                    affinity::pin_current(cpu)?;
                    body(iterations);
                    Ok(())
                })
                .map_err(BenchError::Spawn)?;
            handles.push(h);
        }
        for h in handles {
            h.join().map_err(|_| BenchError::ThreadPanicked)??;
        }
        Ok(())
    })
}

fn overhead_task(_iterations: u64) {}

fn yield_task(iterations: u64) {
    for _ in 0..iterations {
        thread::yield_now();
    }
}

/// One trial: nanoseconds per switch.
fn do_ctx_inner(opts: &CtxOptions, th: usize, nr: usize) -> Result<f64> {
    let start = now_ns();
    run_pair(opts.cpu, opts.iterations, overhead_task)?;
    let overhead_end = now_ns();
    run_pair(opts.cpu, opts.iterations, yield_task)?;
    let end = now_ns();

    let overhead = overhead_end - start;
    let total = end - overhead_end;
    let switched = match total.checked_sub(overhead) {
        Some(v) => v,
        None => {
            printlnwarn!(
                "Ignore overhead for ctx because overhead({}) > diff({})",
                overhead,
                total
            );
            total
        }
    };
    // Each thread yields `iterations` times.
    let avg = switched as f64 / (opts.iterations * 2) as f64;
    log::debug!(
        "ctx_switch_test_inner ({}/{}): total_overhead -> {} {}, {} total_time -> {:.3} {}",
        th,
        nr,
        overhead,
        T_UNIT,
        switched,
        avg,
        T_UNIT
    );
    Ok(avg)
}

pub fn do_ctx(opts: &CtxOptions) -> Result<Stats> {
    if opts.iterations == 0 || opts.tries == 0 {
        return Err(BenchError::InvalidConfig(
            "ctx needs at least one iteration and one try".into(),
        ));
    }
    print_header(opts.tries, opts.iterations);

    let mut lats = Vec::with_capacity(opts.tries);
    for i in 0..opts.tries {
        lats.push(do_ctx_inner(opts, i + 1, opts.tries)?);
    }

    check_spread("ctx_test", &lats, THRESHOLD_ERROR_RATIO);
    let stats = calculate_stats(&lats)
        .ok_or_else(|| BenchError::InvalidConfig("couldn't calculate stats".into()))?;
    printlninfo!("Context switch result on CPU {}: ({})", opts.cpu, T_UNIT);
    printlninfo!("{:?}", stats);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_run_produces_stats() {
        let opts = CtxOptions {
            cpu: 0,
            iterations: 1_000,
            tries: 2,
        };
        let stats = do_ctx(&opts).unwrap();
        assert!(stats.min >= 0.0);
        assert!(stats.min <= stats.median && stats.median <= stats.max);
    }

    #[test]
    fn empty_run_rejected() {
        let opts = CtxOptions {
            tries: 0,
            ..CtxOptions::default()
        };
        assert!(do_ctx(&opts).is_err());
    }
}
