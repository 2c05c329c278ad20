//! Timed operations: the pluggable subject of every benchmark.

use std::hint::black_box;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::arch;

/// One operation the harness can time.
///
/// `invoke` performs a single update of `counter` by `value`, or ignores
/// the counter when the primitive under test has nothing to write.
pub trait TimedOp: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, counter: &AtomicU64, value: u64);
}

/// The contended word, alone on its cache line.
#[repr(align(128))]
#[derive(Debug, Default)]
pub struct SharedCounter(AtomicU64);

impl SharedCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Deref for SharedCounter {
    type Target = AtomicU64;

    fn deref(&self) -> &AtomicU64 {
        &self.0
    }
}

/// Execute `n` inert `nop`s.
#[inline(always)]
pub fn filler(n: u64) {
    for _ in 0..n {
        arch::nop();
    }
}

/// Single-instruction atomic add as emitted by the compiler.
pub struct FetchAdd;

impl TimedOp for FetchAdd {
    fn name(&self) -> &str {
        "FETCH_ADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }
}

/// Compare-exchange retry loop.
pub struct CasLoop;

impl TimedOp for CasLoop {
    fn name(&self) -> &str {
        "CAS LOOP"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        let mut cur = counter.load(Ordering::Relaxed);
        while let Err(actual) = counter.compare_exchange_weak(
            cur,
            cur.wrapping_add(value),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            cur = actual;
        }
    }
}

/// Wrap any function as a [`TimedOp`].
pub struct FnOp<F> {
    name: String,
    f: F,
}

impl<F> FnOp<F>
where
    F: Fn(&AtomicU64, u64) + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> TimedOp for FnOp<F>
where
    F: Fn(&AtomicU64, u64) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        (self.f)(counter, value)
    }
}

/// Process-id syscalls, issued directly so libc can never cache them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOp {
    Getpid,
    Getppid,
    Gettid,
}

impl SyscallOp {
    fn number(self) -> libc::c_long {
        match self {
            SyscallOp::Getpid => libc::SYS_getpid,
            SyscallOp::Getppid => libc::SYS_getppid,
            SyscallOp::Gettid => libc::SYS_gettid,
        }
    }

    #[inline(always)]
    pub fn call(self) -> libc::c_long {
        unsafe { libc::syscall(self.number()) }
    }
}

impl TimedOp for SyscallOp {
    fn name(&self) -> &str {
        match self {
            SyscallOp::Getpid => "getpid",
            SyscallOp::Getppid => "getppid",
            SyscallOp::Gettid => "gettid",
        }
    }

    #[inline(always)]
    fn invoke(&self, _counter: &AtomicU64, _value: u64) {
        black_box(self.call());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portable_ops_add() {
        let counter = SharedCounter::new();
        FetchAdd.invoke(&counter, 2);
        CasLoop.invoke(&counter, 5);
        assert_eq!(counter.value(), 7);
        counter.reset();
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn counter_owns_its_cache_line() {
        assert!(std::mem::align_of::<SharedCounter>() >= 64);
    }

    #[test]
    fn fn_op_forwards() {
        let op = FnOp::new("double", |c: &AtomicU64, v: u64| {
            c.fetch_add(v * 2, Ordering::Relaxed);
        });
        let counter = AtomicU64::new(0);
        op.invoke(&counter, 4);
        assert_eq!(op.name(), "double");
        assert_eq!(counter.load(Ordering::Relaxed), 8);
    }

    #[test]
    fn syscalls_return_ids() {
        assert_eq!(SyscallOp::Getpid.call() as u32, std::process::id());
        assert!(SyscallOp::Getppid.call() >= 0);
        assert!(SyscallOp::Gettid.call() > 0);
    }

    #[test]
    fn cas_loop_under_contention() {
        let counter = SharedCounter::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        CasLoop.invoke(&counter, 1);
                    }
                });
            }
        });
        assert_eq!(counter.value(), 40_000);
    }
}
