//! Process and system metrics

use std::sync::{Mutex, MutexGuard};
use sysinfo::{Pid, ProcessRefreshKind, System};

use crate::error::KioskResult;
use crate::traits::ProcessMetrics;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Metrics read from the OS through `sysinfo`
///
/// Per-process CPU usage is measured between consecutive `cpu_percent` calls,
/// so the first reading for a process is 0. Every process refresh moves the
/// CPU baseline, which is why CPU sampling owns a separate `System` that
/// memory readings never touch.
pub struct SysinfoMetrics {
    system: Mutex<System>,
    cpu_sampler: Mutex<System>,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            cpu_sampler: Mutex::new(System::new()),
        }
    }

    fn system(&self) -> MutexGuard<'_, System> {
        self.system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn cpu_sampler(&self) -> MutexGuard<'_, System> {
        self.cpu_sampler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMetrics for SysinfoMetrics {
    fn memory_mb(&self, pid: u32) -> KioskResult<Option<f64>> {
        let mut system = self.system();
        let pid = Pid::from_u32(pid);
        if !system.refresh_process_specifics(pid, ProcessRefreshKind::new().with_memory()) {
            return Ok(None);
        }
        Ok(system
            .process(pid)
            .map(|process| process.memory() as f64 / BYTES_PER_MB))
    }

    fn cpu_percent(&self, pid: u32) -> KioskResult<Option<f64>> {
        let mut sampler = self.cpu_sampler();
        let pid = Pid::from_u32(pid);
        if !sampler.refresh_process_specifics(pid, ProcessRefreshKind::new().with_cpu()) {
            return Ok(None);
        }
        Ok(sampler
            .process(pid)
            .map(|process| f64::from(process.cpu_usage())))
    }

    fn system_memory_percent(&self) -> Option<f64> {
        let mut system = self.system();
        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return None;
        }
        Some(system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn system_cpu_percent(&self) -> Option<f64> {
        let mut system = self.system();
        system.refresh_cpu();
        Some(f64::from(system.global_cpu_info().cpu_usage()))
    }
}

/// Metrics capability for platforms without process introspection
///
/// Every reading is unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetrics;

impl ProcessMetrics for NoMetrics {
    fn memory_mb(&self, _pid: u32) -> KioskResult<Option<f64>> {
        Ok(None)
    }

    fn cpu_percent(&self, _pid: u32) -> KioskResult<Option<f64>> {
        Ok(None)
    }

    fn system_memory_percent(&self) -> Option<f64> {
        None
    }

    fn system_cpu_percent(&self) -> Option<f64> {
        None
    }
}
