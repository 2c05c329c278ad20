use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use latbench::arch::Barrier;
use latbench::config::{
    HarnessConfig, ITERATIONS, PARALLEL_ITERATIONS, PERCENTILE_ITERATIONS, WARMUP_DIVISOR,
};
use latbench::ctx::{self, CtxOptions, CTX_ITER};
use latbench::lse::{self, LseOptions};
use latbench::null::{self, NullOptions};
use latbench::op::SyscallOp;
use latbench::parallel::{self, ParallelOptions};
use latbench::vdso::{self, VdsoOptions};
use latbench::TRIES;

/// Percentile latency microbenchmarks for atomics, clocks and syscalls.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opts {
    /// Enable debug logging on stderr.
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Per-CPU atomic add latency (LL/SC vs. single-instruction atomics).
    Lse(LseArgs),
    /// All CPUs update one shared counter in parallel.
    Parallel(ParallelArgs),
    /// clock_gettime() throughput and latency per clock id.
    Vdso(VdsoArgs),
    /// Null syscall (getpid) throughput and latency.
    Null(NullArgs),
    /// Context switch overhead between two threads on one CPU.
    Ctx(CtxArgs),
}

#[derive(Debug, Args)]
struct HarnessArgs {
    /// Total measured operations per primitive.
    #[arg(long)]
    iterations: Option<u64>,

    /// Number of timed batches (percentile samples).
    #[arg(long, default_value_t = PERCENTILE_ITERATIONS)]
    buckets: usize,

    /// Warmup runs iterations / divisor discarded operations.
    #[arg(long, default_value_t = WARMUP_DIVISOR)]
    warmup_divisor: u64,
}

impl HarnessArgs {
    fn config(&self, default_iterations: u64) -> HarnessConfig {
        HarnessConfig::default()
            .with_iterations(self.iterations.unwrap_or(default_iterations))
            .with_buckets(self.buckets)
            .with_warmup_divisor(self.warmup_divisor)
    }
}

#[derive(Debug, Args)]
struct LseArgs {
    #[command(flatten)]
    harness: HarnessArgs,

    /// Only measure this CPU.
    #[arg(long)]
    cpu: Option<usize>,

    /// Start a contender that spins N iterations between its operations.
    #[arg(short = 'C', long)]
    contention: Option<u64>,

    /// Filler nops after each measured operation.
    #[arg(short = 'd', long, default_value_t = 0)]
    duty_cycle: u64,

    /// CPU for the contender (default: the next CPU).
    #[arg(long, requires = "contention")]
    interferer: Option<usize>,
}

#[derive(Debug, Args)]
struct ParallelArgs {
    #[command(flatten)]
    harness: HarnessArgs,

    /// Number of threads (default: one per online CPU).
    #[arg(short = 'p', long)]
    threads: Option<usize>,

    /// Filler nops after each measured operation.
    #[arg(short = 'd', long, default_value_t = 0)]
    duty_cycle: u64,
}

#[derive(Debug, Args)]
struct VdsoArgs {
    /// Seconds to run each clock.
    #[arg(short = 't', long, default_value_t = 1)]
    secs: u64,

    /// Number of threads calling clock_gettime() in a loop.
    #[arg(short = 'p', long, default_value_t = 1)]
    threads: usize,

    /// Clock id (see --list); all clocks when unset.
    #[arg(short = 'c', long)]
    clock: Option<i32>,

    /// Only clocks served by the vDSO fast path.
    #[arg(short = 's', long)]
    vdso_only: bool,

    /// Instruction barrier (isb / lfence) before each read.
    #[arg(short = 'i', long, conflicts_with = "data_barrier")]
    isb: bool,

    /// Data barrier (dsb sy / mfence) before each read.
    #[arg(short = 'b', long)]
    data_barrier: bool,

    /// Also report p50/p95/p99 per clock, measured on CPU 0.
    #[arg(long)]
    percentiles: bool,

    /// Print supported clock ids and exit.
    #[arg(long)]
    list: bool,

    #[command(flatten)]
    harness: HarnessArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SyscallArg {
    Getpid,
    Getppid,
    Gettid,
}

impl From<SyscallArg> for SyscallOp {
    fn from(arg: SyscallArg) -> Self {
        match arg {
            SyscallArg::Getpid => SyscallOp::Getpid,
            SyscallArg::Getppid => SyscallOp::Getppid,
            SyscallArg::Gettid => SyscallOp::Gettid,
        }
    }
}

#[derive(Debug, Args)]
struct NullArgs {
    /// Seconds to run, split into 100 slices.
    #[arg(short = 't', long, default_value_t = 1)]
    secs: u64,

    /// Number of threads.
    #[arg(short = 'p', long, default_value_t = 1)]
    threads: usize,

    #[arg(long, value_enum, default_value_t = SyscallArg::Getpid)]
    syscall: SyscallArg,

    /// Print every slice.
    #[arg(long)]
    slices: bool,

    /// Raw output without the table header.
    #[arg(short = 'r', long)]
    raw: bool,

    /// Cycle-counter mode: N rounds of 1M individually timed calls.
    #[arg(short = 'c', long, num_args = 0..=1, default_missing_value = "5")]
    cycles: Option<usize>,

    /// CPU for cycle-counter mode.
    #[arg(long, default_value_t = 0)]
    cpu: usize,
}

#[derive(Debug, Args)]
struct CtxArgs {
    /// CPU both threads are pinned to.
    #[arg(long, default_value_t = 0)]
    cpu: usize,

    /// Yields per thread per try.
    #[arg(long, default_value_t = CTX_ITER)]
    iterations: u64,

    #[arg(long, default_value_t = TRIES)]
    tries: usize,
}

fn init_logging(verbose: bool) -> Result<()> {
    let loglevel = if verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let mut lcfg = simplelog::ConfigBuilder::new();
    lcfg.set_time_level(simplelog::LevelFilter::Error)
        .set_location_level(simplelog::LevelFilter::Off)
        .set_target_level(simplelog::LevelFilter::Off)
        .set_thread_level(simplelog::LevelFilter::Off);
    simplelog::TermLogger::init(
        loglevel,
        lcfg.build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    )
    .context("failed to initialize logger")?;
    Ok(())
}

fn run(opts: Opts) -> Result<()> {
    match opts.cmd {
        Cmd::Lse(args) => {
            let lse_opts = LseOptions {
                config: args.harness.config(ITERATIONS),
                cpu: args.cpu,
                contention: args.contention,
                duty_cycle: args.duty_cycle,
                interferer: args.interferer,
            };
            lse::do_lse(&lse_opts).context("lse benchmark failed")?;
        }
        Cmd::Parallel(args) => {
            let par_opts = ParallelOptions {
                config: args.harness.config(PARALLEL_ITERATIONS),
                threads: args.threads,
                duty_cycle: args.duty_cycle,
            };
            parallel::do_parallel(&par_opts).context("parallel benchmark failed")?;
        }
        Cmd::Vdso(args) => {
            if args.list {
                print!("{}", vdso::clock_list());
                return Ok(());
            }
            let barrier = if args.isb {
                Barrier::Instruction
            } else if args.data_barrier {
                Barrier::Data
            } else {
                Barrier::None
            };
            let vdso_opts = VdsoOptions {
                secs: args.secs,
                threads: args.threads,
                clock: args.clock,
                vdso_only: args.vdso_only,
                barrier,
                percentiles: args.percentiles,
                config: args.harness.config(VdsoOptions::default().config.iterations),
            };
            vdso::do_vdso(&vdso_opts).context("vdso benchmark failed")?;
        }
        Cmd::Null(args) => {
            let null_opts = NullOptions {
                secs: args.secs,
                threads: args.threads,
                syscall: args.syscall.into(),
                verbose: args.slices,
                raw: args.raw,
                cycles: args.cycles,
                cpu: args.cpu,
            };
            null::do_null(&null_opts).context("null syscall benchmark failed")?;
        }
        Cmd::Ctx(args) => {
            let ctx_opts = CtxOptions {
                cpu: args.cpu,
                iterations: args.iterations,
                tries: args.tries,
            };
            ctx::do_ctx(&ctx_opts).context("context switch benchmark failed")?;
        }
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    if let Err(err) = init_logging(opts.verbose) {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
    if let Err(err) = run(opts) {
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_slices_flag_is_separate_from_verbose() {
        let opts = Opts::try_parse_from(["latbench", "null", "--slices"]).unwrap();
        assert!(!opts.verbose);
        match opts.cmd {
            Cmd::Null(args) => assert!(args.slices),
            other => panic!("unexpected command {:?}", other),
        }

        let opts = Opts::try_parse_from(["latbench", "null", "-v"]).unwrap();
        assert!(opts.verbose);
        match opts.cmd {
            Cmd::Null(args) => assert!(!args.slices),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
