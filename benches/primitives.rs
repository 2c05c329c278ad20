use criterion::{criterion_group, criterion_main, Criterion};

use latbench::arch::{self, Barrier};
use latbench::op::{SharedCounter, SyscallOp, TimedOp};
use latbench::vdso::{Clock, ClockRead};

fn atomic_bench(c: &mut Criterion) {
    let counter = SharedCounter::new();
    for op in arch::atomic_ops() {
        c.bench_function(op.name(), |b| b.iter(|| op.invoke(&counter, 1)));
    }
}

fn clock_bench(c: &mut Criterion) {
    let counter = SharedCounter::new();
    for id in [libc::CLOCK_MONOTONIC, libc::CLOCK_MONOTONIC_COARSE] {
        let clock = match Clock::from_id(id) {
            Ok(clock) => clock,
            Err(_) => continue,
        };
        let op = ClockRead::new(clock, Barrier::None);
        c.bench_function(op.name(), |b| b.iter(|| op.invoke(&counter, 1)));
    }
}

fn syscall_bench(c: &mut Criterion) {
    let counter = SharedCounter::new();
    let op = SyscallOp::Getpid;
    c.bench_function("getpid", |b| b.iter(|| op.invoke(&counter, 1)));
}

criterion_group!(benches, atomic_bench, clock_bench, syscall_bench);
criterion_main!(benches);
