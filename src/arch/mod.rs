//! Architecture-specific primitives, selected at build time.
//!
//! Each backend provides the same narrow surface: the atomic add variants
//! worth comparing on that architecture, a cycle counter with its
//! frequency, memory barriers and a single `nop`.

use std::sync::Arc;

use crate::op::{CasLoop, FetchAdd, TimedOp};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
use self::aarch64 as imp;

#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(target_arch = "x86_64")]
use self::x86_64 as imp;

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
mod generic;
#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
use self::generic as imp;

/// Barrier issued before a timed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Barrier {
    #[default]
    None,
    /// Instruction synchronization (`isb` on aarch64, `lfence` on x86_64).
    Instruction,
    /// Full data barrier (`dsb sy` on aarch64, `mfence` on x86_64).
    Data,
}

/// Atomic add implementations for this machine, in report order.
pub fn atomic_ops() -> Vec<Arc<dyn TimedOp>> {
    let mut ops = imp::atomic_ops();
    if ops.is_empty() {
        ops.push(Arc::new(CasLoop));
        ops.push(Arc::new(FetchAdd));
    }
    ops
}

#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    imp::read_cycle_counter()
}

/// Ticks per second of [`read_cycle_counter`].
pub fn counter_frequency() -> f64 {
    imp::counter_frequency()
}

#[inline(always)]
pub fn barrier(kind: Barrier) {
    match kind {
        Barrier::None => {}
        Barrier::Instruction => imp::instruction_barrier(),
        Barrier::Data => imp::data_barrier(),
    }
}

#[inline(always)]
pub fn nop() {
    imp::nop()
}

/// Whether a pair of cycle counter reads around one operation is unusable.
pub fn counter_anomaly(t0: u64, t1: u64) -> bool {
    imp::counter_anomaly(t0, t1)
}

/// Name of the raw counter, as shown next to the Linux clock ids.
pub fn counter_name() -> &'static str {
    imp::COUNTER_NAME
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn every_atomic_op_adds() {
        for op in atomic_ops() {
            let counter = AtomicU64::new(0);
            for _ in 0..1000 {
                op.invoke(&counter, 3);
            }
            assert_eq!(counter.load(Ordering::Relaxed), 3000, "{}", op.name());
        }
    }

    #[test]
    fn op_names_are_unique() {
        let ops = atomic_ops();
        for (i, a) in ops.iter().enumerate() {
            for b in &ops[i + 1..] {
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn cycle_counter_advances() {
        let t0 = read_cycle_counter();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let t1 = read_cycle_counter();
        assert!(t1 > t0);
        assert!(!counter_anomaly(t0, t1));
        assert!(counter_frequency() > 0.0);
    }

    #[test]
    fn barriers_and_nop_execute() {
        barrier(Barrier::None);
        barrier(Barrier::Instruction);
        barrier(Barrier::Data);
        nop();
    }
}
