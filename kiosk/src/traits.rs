//! Capability seams with mockall annotations for testing
//!
//! The supervisor and orchestrator only reach the operating system, the web
//! server and the network through these traits. Real implementations live in
//! `services`; tests inject mocks or fakes.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::KioskResult;

/// Everything needed to spawn one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub working_dir: Option<PathBuf>,
    /// Inherit stdout/stderr instead of discarding them
    pub forward_output: bool,
}

/// Handle to one spawned OS process
///
/// Handles are owned exclusively by the component that launched them.
#[async_trait::async_trait]
pub trait BrowserProcess: Send {
    /// OS process id, if the platform reported one
    fn pid(&self) -> Option<u32>;

    /// Non-blocking liveness poll; `Ok(true)` once the process has exited
    fn try_exited(&mut self) -> KioskResult<bool>;

    /// Request graceful termination
    fn terminate(&mut self) -> KioskResult<()>;

    /// Wait up to `timeout` for the process to exit; true if it did
    async fn wait_exit(&mut self, timeout: Duration) -> bool;

    /// Force-kill and reap the process
    async fn kill(&mut self) -> KioskResult<()>;
}

/// Spawns OS processes from a launch spec
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> KioskResult<Box<dyn BrowserProcess>>;
}

/// Point-in-time process and system readings
///
/// `Ok(None)` means the reading is unknown (no metrics capability, or the
/// process is gone); it is never reported as zero.
#[mockall::automock]
pub trait ProcessMetrics: Send + Sync {
    /// Resident memory of `pid` in MB
    fn memory_mb(&self, pid: u32) -> KioskResult<Option<f64>>;

    /// CPU usage of `pid` in percent
    fn cpu_percent(&self, pid: u32) -> KioskResult<Option<f64>>;

    /// System-wide memory usage in percent
    fn system_memory_percent(&self) -> Option<f64>;

    /// System-wide CPU usage in percent
    fn system_cpu_percent(&self) -> Option<f64>;
}

/// The co-located calendar web server
#[mockall::automock]
#[async_trait::async_trait]
pub trait WebServer: Send + Sync {
    async fn start(&self) -> KioskResult<()>;

    async fn stop(&self) -> KioskResult<()>;
}

/// PID-file bookkeeping for the kiosk daemon
#[mockall::automock]
pub trait DaemonControl: Send + Sync {
    fn is_running(&self) -> KioskResult<bool>;

    fn pid(&self) -> KioskResult<Option<u32>>;

    /// Record the current process and return its pid
    fn create_pid_file(&self) -> KioskResult<u32>;

    /// Remove the PID file; true if one was removed
    fn cleanup_pid_file(&self) -> KioskResult<bool>;
}

/// Optional HTTP probing capability
#[mockall::automock]
#[async_trait::async_trait]
pub trait HttpProbe: Send + Sync {
    /// GET `url`; true iff it answered HTTP 200 within `timeout`
    async fn get_ok(&self, url: &str, timeout: Duration) -> bool;
}
