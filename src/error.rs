use std::io;

use thiserror::Error;

/// Everything that can stop a benchmark run.
///
/// There is no recoverable variant: a run either produces a number that can
/// be trusted or it stops here.
#[derive(Debug, Error)]
pub enum BenchError {
    #[error("failed to get number of CPUs")]
    CpuCount,

    #[error("failed to set affinity to CPU {cpu}: {source}")]
    Affinity {
        cpu: usize,
        #[source]
        source: nix::Error,
    },

    #[error("failed to create thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("failed to allocate memory for {0} latency samples")]
    Alloc(usize),

    #[error("benchmark thread panicked")]
    ThreadPanicked,

    #[error("out-of-order timestamps (start {start}, end {end})")]
    ClockAnomaly { start: u64, end: u64 },

    #[error("error getting time through clock_gettime (clockid_t = {clock}): {source}")]
    Clock {
        clock: String,
        #[source]
        source: nix::Error,
    },

    #[error("no CPU other than {0} is available for the interferer thread")]
    NoInterferer(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;
