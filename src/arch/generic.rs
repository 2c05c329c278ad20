use std::sync::atomic::{fence, Ordering};
use std::sync::Arc;

use crate::op::{CasLoop, FetchAdd, TimedOp};
use crate::timer;

pub const COUNTER_NAME: &str = "CLOCK_MONOTONIC (no cycle counter)";

pub fn atomic_ops() -> Vec<Arc<dyn TimedOp>> {
    vec![Arc::new(CasLoop), Arc::new(FetchAdd)]
}

#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    timer::now_ns()
}

pub fn counter_frequency() -> f64 {
    1e9
}

#[inline(always)]
pub fn instruction_barrier() {
    fence(Ordering::SeqCst);
}

#[inline(always)]
pub fn data_barrier() {
    fence(Ordering::SeqCst);
}

/// Issues the platform's spin hint so the filler is never elided.
#[inline(always)]
pub fn nop() {
    std::hint::spin_loop();
}

pub fn counter_anomaly(t0: u64, t1: u64) -> bool {
    t1 < t0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_costs_time() {
        let time = |n: u64| {
            let start = timer::now_ns();
            for _ in 0..n {
                nop();
            }
            timer::now_ns() - start
        };
        assert!(time(10_000_000) > time(10));
    }
}
