use nix::time::{clock_gettime, ClockId};

use crate::error::{BenchError, Result};
use crate::{printlninfo, T_UNIT};

/// `CLOCK_MONOTONIC` in nanoseconds.
#[inline(always)]
pub fn now_ns() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // CLOCK_MONOTONIC cannot fail on Linux with a valid pointer.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}

/// Read an arbitrary clock, reporting failures.
pub fn clock_ns(clock: libc::clockid_t, name: &str) -> Result<u64> {
    let ts = clock_gettime(ClockId::from_raw(clock)).map_err(|source| BenchError::Clock {
        clock: name.to_string(),
        source,
    })?;
    Ok(ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64)
}

/// Average cost of one [`now_ns`] call, in nanoseconds.
pub fn timing_overhead_ns() -> f64 {
    const TRIES: u64 = 10;
    const ITERATIONS: u64 = 10_000;

    let mut total = 0.0;
    for _ in 0..TRIES {
        let start = now_ns();
        let mut last = start;
        for _ in 0..ITERATIONS {
            last = std::hint::black_box(now_ns());
        }
        total += last.saturating_sub(start) as f64 / ITERATIONS as f64;
    }
    let overhead = total / TRIES as f64;
    log::debug!("now_ns() overhead is {:.3} {}", overhead, T_UNIT);
    overhead
}

/// Print the header of a trial-oriented test.
pub fn print_header(tries: usize, iterations: u64) {
    printlninfo!("========================================");
    printlninfo!("Time unit : {}", T_UNIT);
    printlninfo!("Iterations: {}", iterations);
    printlninfo!("Tries     : {}", tries);
    printlninfo!("Timer cost: {:.3} {}", timing_overhead_ns(), T_UNIT);
    printlninfo!("========================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_never_goes_back() {
        let mut prev = now_ns();
        for _ in 0..1000 {
            let next = now_ns();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn clock_ns_reads_realtime() {
        assert!(clock_ns(libc::CLOCK_REALTIME, "CLOCK_REALTIME").unwrap() > 0);
    }

    #[test]
    fn clock_ns_rejects_bogus_clock() {
        assert!(matches!(
            clock_ns(1234, "bogus"),
            Err(BenchError::Clock { .. })
        ));
    }

    #[test]
    fn overhead_is_small_and_positive() {
        let overhead = timing_overhead_ns();
        assert!(overhead >= 0.0);
        assert!(overhead < 100_000.0);
    }
}
