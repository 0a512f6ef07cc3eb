//! Host resource gauges.
//!
//! CPU usage is the one-minute load average divided by the number of logical
//! cores, as a percentage. Memory usage is the fraction of physical memory in
//! use, as a percentage.

use std::sync::Mutex;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

/// A single reading of host resource usage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemUsage {
    /// Load average normalized by core count, times 100.
    pub cpu_percent: f64,
    /// Memory in use, times 100.
    pub memory_percent: f64,
}

/// Source of host resource readings.
pub trait SystemProbe: Send + Sync {
    /// Takes a reading, or `None` if the host cannot report one.
    fn sample(&self) -> Option<SystemUsage>;
}

/// Probe backed by `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<System>,
    cores: usize,
}

impl SysinfoProbe {
    /// Creates a probe that refreshes memory statistics on every sample.
    #[must_use]
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing().with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        let cores = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);

        Self {
            system: Mutex::new(system),
            cores,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    #[allow(clippy::cast_precision_loss)]
    fn sample(&self) -> Option<SystemUsage> {
        let load = System::load_average().one;
        let cpu_percent = load / self.cores as f64 * 100.0;

        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        let memory_percent = system.used_memory() as f64 / total as f64 * 100.0;

        Some(SystemUsage {
            cpu_percent,
            memory_percent,
        })
    }
}

/// Probe that never reports, used when host gauges are not wanted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSystemProbe;

impl SystemProbe for NoSystemProbe {
    fn sample(&self) -> Option<SystemUsage> {
        None
    }
}

/// Probe that always returns the same reading.
#[derive(Debug, Clone, Copy)]
pub struct FixedSystemProbe(pub SystemUsage);

impl SystemProbe for FixedSystemProbe {
    fn sample(&self) -> Option<SystemUsage> {
        Some(self.0)
    }
}
