//! Status snapshot types shared between the kiosk supervisor and its consumers
//!
//! Every type here is a point-in-time reading. Nothing is cached beyond the
//! status query that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SharedError, SharedResult};

/// Component identifier attached to every log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    /// The kiosk orchestrator (startup sequencing, combined health loop)
    Kiosk,
    /// The browser supervisor and its monitors
    Browser,
    /// The co-located calendar web server
    WebServer,
    /// PID-file bookkeeping
    Daemon,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Kiosk => write!(f, "kiosk"),
            Component::Browser => write!(f, "browser"),
            Component::WebServer => write!(f, "webserver"),
            Component::Daemon => write!(f, "daemon"),
        }
    }
}

/// Lifecycle state of the supervised browser process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowserProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
    Crashed,
    Restarting,
    /// Launch failed or restart attempts were exhausted
    Failed,
}

impl BrowserProcessState {
    /// States in which a process handle may be retained
    pub fn may_hold_process(&self) -> bool {
        matches!(
            self,
            BrowserProcessState::Starting
                | BrowserProcessState::Running
                | BrowserProcessState::Crashed
                | BrowserProcessState::Restarting
        )
    }
}

impl fmt::Display for BrowserProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserProcessState::Stopped => "stopped",
            BrowserProcessState::Starting => "starting",
            BrowserProcessState::Running => "running",
            BrowserProcessState::Crashed => "crashed",
            BrowserProcessState::Restarting => "restarting",
            BrowserProcessState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for BrowserProcessState {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stopped" => Ok(BrowserProcessState::Stopped),
            "starting" => Ok(BrowserProcessState::Starting),
            "running" => Ok(BrowserProcessState::Running),
            "crashed" => Ok(BrowserProcessState::Crashed),
            "restarting" => Ok(BrowserProcessState::Restarting),
            "failed" => Ok(BrowserProcessState::Failed),
            _ => Err(SharedError::UnknownState { input: s.to_string() }),
        }
    }
}

/// Snapshot of the browser supervisor, regenerated on every query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrowserStatus {
    pub state: BrowserProcessState,
    pub pid: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<u64>,
    /// Resident memory in MB; `None` when the reading is unknown
    pub memory_usage_mb: Option<f64>,
    pub cpu_usage_percent: Option<f64>,
    pub crash_count: u32,
    pub restart_count: u32,
    pub last_restart_time: Option<DateTime<Utc>>,
    pub is_responsive: bool,
    pub last_health_check: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl BrowserStatus {
    /// Degraded snapshot used when gathering the real one failed
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: BrowserProcessState::Failed,
            last_error: Some(error.into()),
            last_error_time: Some(Utc::now()),
            ..Self::default()
        }
    }
}

/// What the PID-file daemon collaborator reports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub is_running: bool,
    pub pid: Option<u32>,
}

/// Snapshot of the whole kiosk, composing the browser snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KioskStatus {
    pub is_running: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<u64>,
    pub daemon: DaemonStatus,
    pub browser: BrowserStatus,
    pub system_memory_percent: Option<f64>,
    pub system_cpu_percent: Option<f64>,
    pub restart_count: u32,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl KioskStatus {
    /// Render the snapshot as pretty JSON for status consumers
    pub fn to_json(&self) -> SharedResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SharedError::SerializationError {
            message: e.to_string(),
        })
    }
}

/// Seconds elapsed since `start`, clamped at zero
pub fn uptime_since(start: Option<DateTime<Utc>>) -> Option<u64> {
    start.map(|start| (Utc::now() - start).num_seconds().max(0) as u64)
}
