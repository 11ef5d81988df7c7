//! PID-file daemon bookkeeping

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{KioskError, KioskResult};
use crate::traits::DaemonControl;
use shared::{process_debug, Component};

/// Tracks the kiosk daemon through a PID file
pub struct PidFileDaemon {
    pid_file: PathBuf,
}

impl PidFileDaemon {
    pub fn new(pid_file: impl Into<PathBuf>) -> Self {
        Self {
            pid_file: pid_file.into(),
        }
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }
}

impl DaemonControl for PidFileDaemon {
    fn is_running(&self) -> KioskResult<bool> {
        match self.pid()? {
            Some(pid) => process_alive(pid),
            None => Ok(false),
        }
    }

    fn pid(&self) -> KioskResult<Option<u32>> {
        let content = match std::fs::read_to_string(&self.pid_file) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        content.trim().parse::<u32>().map(Some).map_err(|e| {
            KioskError::daemon(format!(
                "invalid PID file {}: {}",
                self.pid_file.display(),
                e
            ))
        })
    }

    fn create_pid_file(&self) -> KioskResult<u32> {
        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pid = std::process::id();
        std::fs::write(&self.pid_file, format!("{pid}\n"))?;
        process_debug!(
            Component::Daemon,
            "📝 Wrote PID {} to {}",
            pid,
            self.pid_file.display()
        );
        Ok(pid)
    }

    fn cleanup_pid_file(&self) -> KioskResult<bool> {
        match std::fs::remove_file(&self.pid_file) {
            Ok(()) => {
                process_debug!(Component::Daemon, "🧹 Removed {}", self.pid_file.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> KioskResult<bool> {
    use nix::sys::signal;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) => Ok(true),
        // Exists but owned by another user
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(e) => Err(KioskError::daemon(format!("liveness check for {pid} failed: {e}"))),
    }
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> KioskResult<bool> {
    let mut system = sysinfo::System::new();
    Ok(system.refresh_process(sysinfo::Pid::from_u32(pid)))
}
