//! CPU discovery and thread pinning.
//!
//! Every measuring and interfering thread is pinned; a failed pin aborts the
//! run because unpinned numbers are meaningless.

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

use crate::error::{BenchError, Result};

/// Number of online CPUs.
pub fn online_cpus() -> Result<usize> {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n <= 0 {
        return Err(BenchError::CpuCount);
    }
    Ok(n as usize)
}

/// Restrict the calling thread to `cpu`.
pub fn pin_current(cpu: usize) -> Result<()> {
    let mut set = CpuSet::new();
    set.set(cpu)
        .map_err(|source| BenchError::Affinity { cpu, source })?;
    sched_setaffinity(Pid::from_raw(0), &set)
        .map_err(|source| BenchError::Affinity { cpu, source })?;
    log::debug!("pinned thread {:?} to CPU {}", std::thread::current().name(), cpu);
    Ok(())
}

/// Choose the CPU the interferer runs on.
///
/// An explicit request wins as long as it differs from `target`; otherwise
/// the next CPU after `target` is used, wrapping around.
pub fn pick_interferer(target: usize, requested: Option<usize>, ncpus: usize) -> Result<usize> {
    match requested {
        Some(cpu) if cpu == target => Err(BenchError::InvalidConfig(format!(
            "interferer CPU {} is the measured CPU",
            cpu
        ))),
        Some(cpu) if cpu >= ncpus => Err(BenchError::InvalidConfig(format!(
            "interferer CPU {} does not exist ({} online)",
            cpu, ncpus
        ))),
        Some(cpu) => Ok(cpu),
        None if ncpus < 2 => Err(BenchError::NoInterferer(target)),
        None => Ok((target + 1) % ncpus),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn online_cpus_is_positive() {
        assert!(online_cpus().unwrap() >= 1);
    }

    #[test]
    fn pin_to_cpu_zero() {
        let handle = std::thread::spawn(|| pin_current(0));
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn pin_to_missing_cpu_fails() {
        let handle = std::thread::spawn(|| pin_current(CpuSet::count() + 1));
        match handle.join().unwrap() {
            Err(BenchError::Affinity { .. }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn interferer_wraps_around() {
        assert_eq!(pick_interferer(3, None, 4).unwrap(), 0);
        assert_eq!(pick_interferer(0, None, 4).unwrap(), 1);
        assert_eq!(pick_interferer(0, Some(2), 4).unwrap(), 2);
    }

    #[test]
    fn interferer_must_differ() {
        assert!(matches!(
            pick_interferer(0, None, 1),
            Err(BenchError::NoInterferer(0))
        ));
        assert!(pick_interferer(1, Some(1), 4).is_err());
        assert!(pick_interferer(1, Some(9), 4).is_err());
    }
}
