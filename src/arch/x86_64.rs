use std::arch::asm;
use std::arch::x86_64::{__rdtscp, _mm_lfence, _mm_mfence};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use crate::op::{CasLoop, TimedOp};
use crate::timer;

pub const COUNTER_NAME: &str = "TSC (rdtscp)";

/// `lock xadd`, old value discarded.
pub struct LockXadd;

impl TimedOp for LockXadd {
    fn name(&self) -> &str {
        "LOCK XADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                "lock xadd qword ptr [{ptr}], {val}",
                ptr = in(reg) counter.as_ptr(),
                val = inout(reg) value => _,
                options(nostack),
            );
        }
    }
}

/// `lock add`, no result.
pub struct LockAdd;

impl TimedOp for LockAdd {
    fn name(&self) -> &str {
        "LOCK ADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                "lock add qword ptr [{ptr}], {val}",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                options(nostack),
            );
        }
    }
}

pub fn atomic_ops() -> Vec<Arc<dyn TimedOp>> {
    vec![Arc::new(CasLoop), Arc::new(LockXadd), Arc::new(LockAdd)]
}

#[inline(always)]
fn rdtscp() -> (u64, u32) {
    let mut cpu = 0u32;
    let t = unsafe { __rdtscp(&mut cpu) };
    (t, cpu)
}

#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    rdtscp().0
}

const CALIBRATION_TRIES: usize = 10;

/// TSC ticks per second, calibrated against `CLOCK_MONOTONIC`.
///
/// The caller should be pinned: a sample whose two TSC reads land on
/// different CPUs is retried, and after `CALIBRATION_TRIES` the last
/// sample is used anyway.
pub fn counter_frequency() -> f64 {
    let mut hz = 0.0;
    for _ in 0..CALIBRATION_TRIES {
        let (t0, cpu0) = rdtscp();
        let n0 = timer::now_ns();
        std::thread::sleep(Duration::from_millis(100));
        let (t1, cpu1) = rdtscp();
        let n1 = timer::now_ns();
        if t1 > t0 && n1 > n0 {
            hz = (t1 - t0) as f64 * 1e9 / (n1 - n0) as f64;
            if cpu0 == cpu1 {
                return hz;
            }
        }
    }
    log::warn!(
        "TSC calibration migrated CPUs {} times, using {:.0} Hz",
        CALIBRATION_TRIES,
        hz
    );
    hz
}

#[inline(always)]
pub fn instruction_barrier() {
    unsafe { _mm_lfence() };
}

#[inline(always)]
pub fn data_barrier() {
    unsafe { _mm_mfence() };
}

#[inline(always)]
pub fn nop() {
    unsafe { asm!("nop", options(nomem, nostack)) };
}

pub fn counter_anomaly(t0: u64, t1: u64) -> bool {
    t0 >= t1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_terminates_unpinned() {
        let hz = std::thread::spawn(counter_frequency).join().unwrap();
        assert!(hz > 0.0);
    }
}
