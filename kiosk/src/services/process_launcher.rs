//! Real process spawning on top of `tokio::process`

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::{Child, Command};

use crate::error::{KioskError, KioskResult};
use crate::services::output::{configure_child_stdio, spawn_output_consumers};
use crate::traits::{BrowserProcess, LaunchSpec, ProcessLauncher};
use shared::{process_debug, process_warn, Component};

/// A spawned OS process
///
/// The child is killed if the handle is dropped while it is still running.
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
    name: String,
    exited: bool,
}

impl ChildProcess {
    /// Spawn `spec` as a new process labelled `name` in logs
    pub fn spawn(spec: &LaunchSpec, name: &str) -> KioskResult<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(key, value)| (key.as_str(), value.as_str())))
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        configure_child_stdio(&mut cmd, spec.forward_output, name);

        let mut child = cmd.spawn().map_err(|e| {
            KioskError::launch(format!("failed to spawn {}: {}", spec.program.display(), e))
        })?;
        spawn_output_consumers(&mut child, name);

        let pid = child.id();
        process_debug!(
            Component::Kiosk,
            "🚀 Spawned {} (PID: {})",
            name,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
        );

        Ok(Self {
            child,
            pid,
            name: name.to_string(),
            exited: false,
        })
    }

    #[cfg(unix)]
    fn send_sigterm(&self, pid: u32) -> KioskResult<()> {
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| KioskError::process_control(format!("PID {pid} out of range")))?;
        match signal::kill(Pid::from_raw(raw), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(KioskError::process_control(format!(
                "SIGTERM to {} ({}) failed: {}",
                self.name, pid, e
            ))),
        }
    }
}

#[async_trait]
impl BrowserProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exited(&mut self) -> KioskResult<bool> {
        if self.exited {
            return Ok(true);
        }
        if let Some(status) = self.child.try_wait()? {
            process_debug!(Component::Kiosk, "{} exited with {}", self.name, status);
            self.exited = true;
        }
        Ok(self.exited)
    }

    fn terminate(&mut self) -> KioskResult<()> {
        if self.exited {
            return Ok(());
        }

        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                return self.send_sigterm(pid);
            }
        }

        self.child
            .start_kill()
            .map_err(|e| KioskError::process_control(format!("terminate {}: {}", self.name, e)))
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        if self.exited {
            return true;
        }
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(_)) => {
                self.exited = true;
                true
            }
            Ok(Err(e)) => {
                process_warn!(Component::Kiosk, "⚠️ Waiting on {} failed: {}", self.name, e);
                false
            }
            Err(_) => false,
        }
    }

    async fn kill(&mut self) -> KioskResult<()> {
        if self.exited {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| KioskError::process_control(format!("kill {}: {}", self.name, e)))?;
        self.exited = true;
        Ok(())
    }
}

/// Launches browser processes as direct children of the kiosk
pub struct ChildProcessLauncher {
    process_name: String,
}

impl ChildProcessLauncher {
    pub fn new() -> Self {
        Self {
            process_name: "browser".to_string(),
        }
    }

    /// Configure the name used in logs (fluent API)
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }
}

impl Default for ChildProcessLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessLauncher for ChildProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> KioskResult<Box<dyn BrowserProcess>> {
        let process = ChildProcess::spawn(spec, &self.process_name)?;
        Ok(Box::new(process))
    }
}
