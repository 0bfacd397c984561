//! Best-effort process CPU sampling.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Neutral reading substituted when every sampling path fails.
const NEUTRAL_CPU: f64 = 0.5;

/// Samples this process's CPU utilization as a fraction of the whole
/// machine, in `[0, 1]`.
///
/// Falls back to the one-minute load average spread over the core count
/// when per-process data is unavailable, and to a neutral `0.5` when
/// sampling fails entirely. A degraded reading is never an error; the
/// caller's adjustment cycle always gets a number.
pub struct CpuSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
    cores: usize,
}

impl CpuSampler {
    pub fn new() -> Self {
        let mut system = System::new_all();
        system.refresh_cpu_all();
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            system: Mutex::new(system),
            pid: sysinfo::get_current_pid().ok(),
            cores,
        }
    }

    /// Take one sample.
    ///
    /// The first call after construction may read low: process CPU usage
    /// is computed against the previous refresh.
    pub fn sample(&self) -> f64 {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(_) => return NEUTRAL_CPU,
        };

        if let Some(pid) = self.pid {
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            if let Some(process) = system.process(pid) {
                // cpu_usage() is a percentage of a single core.
                let fraction = f64::from(process.cpu_usage()) / 100.0 / self.cores as f64;
                if fraction.is_finite() {
                    return fraction.clamp(0.0, 1.0);
                }
            }
        }

        let load = System::load_average().one;
        if load.is_finite() && load > 0.0 {
            (load / self.cores as f64).clamp(0.0, 1.0)
        } else {
            NEUTRAL_CPU
        }
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_a_valid_fraction() {
        let sampler = CpuSampler::new();
        for _ in 0..3 {
            let cpu = sampler.sample();
            assert!((0.0..=1.0).contains(&cpu), "got {cpu}");
        }
    }
}
