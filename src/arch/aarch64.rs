use std::arch::asm;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use crate::op::TimedOp;

pub const COUNTER_NAME: &str = "CNTVCT_EL0 (aarch64 virtual counter)";

/// `ldxr`/`stxr` retry loop.
pub struct LlSc;

impl TimedOp for LlSc {
    fn name(&self) -> &str {
        "LL/SC"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                "2:",
                "ldxr {tmp}, [{ptr}]",
                "add {tmp}, {tmp}, {val}",
                "stxr {flag:w}, {tmp}, [{ptr}]",
                "cbnz {flag:w}, 2b",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                tmp = out(reg) _,
                flag = out(reg) _,
                options(nostack),
            );
        }
    }
}

/// LSE store-add, no result returned.
pub struct Stadd;

impl TimedOp for Stadd {
    fn name(&self) -> &str {
        "STADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                ".arch_extension lse",
                "stadd {val}, [{ptr}]",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                options(nostack),
            );
        }
    }
}

/// LSE load-add, old value discarded.
pub struct Ldadd;

impl TimedOp for Ldadd {
    fn name(&self) -> &str {
        "LDADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                ".arch_extension lse",
                "ldadd {val}, {old}, [{ptr}]",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                old = out(reg) _,
                options(nostack),
            );
        }
    }
}

/// `prfm pstl1keep` then `stadd`.
pub struct PrfmKeepStadd;

impl TimedOp for PrfmKeepStadd {
    fn name(&self) -> &str {
        "PRFM_KEEP+STADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                ".arch_extension lse",
                "prfm pstl1keep, [{ptr}]",
                "stadd {val}, [{ptr}]",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                options(nostack),
            );
        }
    }
}

/// `prfm pstl1strm` then `stadd`.
pub struct PrfmStrmStadd;

impl TimedOp for PrfmStrmStadd {
    fn name(&self) -> &str {
        "PRFM_STRM+STADD"
    }

    #[inline(always)]
    fn invoke(&self, counter: &AtomicU64, value: u64) {
        unsafe {
            asm!(
                ".arch_extension lse",
                "prfm pstl1strm, [{ptr}]",
                "stadd {val}, [{ptr}]",
                ptr = in(reg) counter.as_ptr(),
                val = in(reg) value,
                options(nostack),
            );
        }
    }
}

pub fn atomic_ops() -> Vec<Arc<dyn TimedOp>> {
    let mut ops: Vec<Arc<dyn TimedOp>> = vec![Arc::new(LlSc)];
    if std::arch::is_aarch64_feature_detected!("lse") {
        ops.push(Arc::new(Stadd));
        ops.push(Arc::new(Ldadd));
        ops.push(Arc::new(PrfmKeepStadd));
        ops.push(Arc::new(PrfmStrmStadd));
    } else {
        log::warn!("CPU lacks LSE atomics, only LL/SC will be measured");
    }
    ops
}

#[inline(always)]
pub fn read_cycle_counter() -> u64 {
    let val: u64;
    unsafe {
        asm!("mrs {}, cntvct_el0", out(reg) val, options(nomem, nostack));
    }
    val
}

pub fn counter_frequency() -> f64 {
    let freq: u64;
    unsafe {
        asm!("mrs {}, cntfrq_el0", out(reg) freq, options(nomem, nostack));
    }
    (freq & 0xffff_ffff) as f64
}

#[inline(always)]
pub fn instruction_barrier() {
    unsafe { asm!("isb", options(nostack)) };
}

#[inline(always)]
pub fn data_barrier() {
    unsafe { asm!("dsb sy", options(nostack)) };
}

#[inline(always)]
pub fn nop() {
    unsafe { asm!("nop", options(nomem, nostack)) };
}

// The virtual counter ticks slower than the core clock, so two reads around
// a short operation can legitimately be equal.
pub fn counter_anomaly(t0: u64, t1: u64) -> bool {
    t1 < t0
}
