//! Percentile latency microbenchmarks for low-level CPU and kernel primitives.
//!
//! The harness in [`harness`] is written once; atomics, clock reads and
//! syscalls are plugged into it as [`op::TimedOp`] implementations.

pub mod affinity;
pub mod arch;
pub mod config;
pub mod ctx;
pub mod error;
pub mod harness;
pub mod lse;
pub mod null;
pub mod op;
pub mod parallel;
pub mod report;
pub mod stats;
pub mod timer;
pub mod vdso;

pub use error::{BenchError, Result};

/// Number of trials for the trial-oriented benchmarks (`ctx`, `null --cycles`).
pub const TRIES: usize = 10;
pub const T_UNIT: &str = "ns";
/// Max/min may deviate from the mean by `10 * THRESHOLD_ERROR_RATIO` percent
/// before a warning is printed.
pub const THRESHOLD_ERROR_RATIO: u64 = 1;

/// Macro for printing informational messages
#[macro_export]
macro_rules! printlninfo {
    ($fmt:expr) => (println!($fmt));
    ($fmt:expr, $($arg:tt)*) => (println!($fmt, $($arg)*));
}

/// Macro for printing warning messages
#[macro_export]
macro_rules! printlnwarn {
    ($fmt:expr) => (log::warn!($fmt));
    ($fmt:expr, $($arg:tt)*) => (log::warn!($fmt, $($arg)*));
}
