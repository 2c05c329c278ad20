use crate::error::{BenchError, Result};

/// Total measured iterations per operation for the per-CPU bench.
pub const ITERATIONS: u64 = 100_000_000;
/// Total measured iterations per operation for the parallel bench.
pub const PARALLEL_ITERATIONS: u64 = 1_000_000;
/// Number of timed batches, i.e. the percentile sample count.
pub const PERCENTILE_ITERATIONS: usize = 100;
/// Warmup runs `iterations / WARMUP_DIVISOR` discarded operations.
pub const WARMUP_DIVISOR: u64 = 1000;

/// Sizing of one harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    pub iterations: u64,
    pub buckets: usize,
    pub warmup_divisor: u64,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            iterations: ITERATIONS,
            buckets: PERCENTILE_ITERATIONS,
            warmup_divisor: WARMUP_DIVISOR,
        }
    }
}

impl HarnessConfig {
    pub fn parallel() -> Self {
        Self {
            iterations: PARALLEL_ITERATIONS,
            ..Self::default()
        }
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn with_warmup_divisor(mut self, divisor: u64) -> Self {
        self.warmup_divisor = divisor;
        self
    }

    /// Operations per timed batch.
    pub fn sub_iterations(&self) -> u64 {
        self.iterations / self.buckets as u64
    }

    pub fn warmup_iterations(&self) -> u64 {
        self.iterations / self.warmup_divisor
    }

    pub fn validate(&self) -> Result<()> {
        if self.buckets == 0 {
            return Err(BenchError::InvalidConfig(
                "percentile bucket count must be at least 1".into(),
            ));
        }
        if self.iterations < self.buckets as u64 {
            return Err(BenchError::InvalidConfig(format!(
                "{} iterations cannot fill {} buckets",
                self.iterations, self.buckets
            )));
        }
        if self.warmup_divisor == 0 {
            return Err(BenchError::InvalidConfig(
                "warmup divisor must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
