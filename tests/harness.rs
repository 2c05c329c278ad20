use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use latbench::affinity::online_cpus;
use latbench::config::HarnessConfig;
use latbench::harness::{measure, run_with_contention, Benchmark};
use latbench::lse::{self, LseOptions};
use latbench::op::{FetchAdd, FnOp, SharedCounter, TimedOp};
use latbench::report;
use latbench::stats::percentile;

fn small_config() -> HarnessConfig {
    HarnessConfig::default()
        .with_iterations(100_000)
        .with_buckets(100)
}

#[test]
fn measure_contract() {
    let counter = SharedCounter::new();
    let samples = measure(&FetchAdd, &counter, 1000, 100, 0).unwrap();
    assert_eq!(samples.len(), 100);
    assert!(samples.as_slice().iter().all(|&v| v >= 0.0));
}

#[test]
fn percentile_matches_index_formula_on_measured_samples() {
    let counter = SharedCounter::new();
    let samples = measure(&FetchAdd, &counter, 100, 37, 0).unwrap();
    let s = samples.as_slice();
    for p in [0.0, 12.5, 50.0, 95.0, 99.0, 100.0] {
        let idx = ((p / 100.0) * (s.len() - 1) as f64) as usize;
        assert_eq!(percentile(s, p), Some(s[idx]));
    }
}

#[test]
fn duty_cycle_strictly_increases_latency() {
    let counter = SharedCounter::new();
    let mut prev = 0.0;
    for duty in [0, 500, 5000] {
        let p50 = measure(&FetchAdd, &counter, 1000, 20, duty)
            .unwrap()
            .percentile(50.0)
            .unwrap();
        assert!(p50 > prev, "duty {} gave {} after {}", duty, p50, prev);
        prev = p50;
    }
}

#[test]
fn contender_runs_and_is_joined() {
    if online_cpus().unwrap() < 2 {
        return;
    }
    let live = Arc::new(AtomicBool::new(false));
    let seen = live.clone();
    let contender_op: Arc<dyn TimedOp> = Arc::new(FnOp::new("probe", move |c: &AtomicU64, v: u64| {
        seen.store(true, Ordering::Relaxed);
        c.fetch_add(v, Ordering::Relaxed);
    }));
    let bench = Benchmark::new(Arc::new(FetchAdd))
        .with_contention(Some(10))
        .with_contender_op(contender_op.clone());

    let started = Instant::now();
    let outcome = thread::spawn(move || {
        let counter = SharedCounter::new();
        run_with_contention(&bench, &counter, &small_config(), 0, None)
    })
    .join()
    .unwrap()
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(outcome.samples.len(), 100);
    assert!(outcome.contender_ops.unwrap() > 0);
    assert!(live.load(Ordering::Relaxed));
    // The benchmark moved into the worker and was dropped with it; only the
    // contender thread could still hold a clone.
    assert_eq!(Arc::strong_count(&contender_op), 1);
}

#[test]
fn per_cpu_blocks_are_ordered() {
    let ncpus = online_cpus().unwrap().min(4);
    for cpu in 0..ncpus {
        let opts = LseOptions {
            config: small_config(),
            cpu: Some(cpu),
            ..LseOptions::default()
        };
        let reports = thread::spawn(move || lse::do_lse(&opts))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(reports.len(), 1);
        let block = &reports[0];
        assert_eq!(block.cpu, cpu);
        assert!(report::cpu_header(cpu).contains(&format!("CPU: {}", cpu)));
        for (name, p) in &block.results {
            assert!(p.p50 >= 0.0);
            assert!(p.p50 <= p.p95 && p.p95 <= p.p99, "{}: {:?}", name, p);
            let line = report::percentile_line(name, p);
            assert!(line.contains("p50:") && line.contains("p95:") && line.contains("p99:"));
        }
    }
}
