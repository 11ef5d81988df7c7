//! Kiosk configuration
//!
//! Configuration is resolved once at process entry (file, `.env`, CLI flags)
//! and handed to the orchestrator by value. Range and budget validation is the
//! caller's concern; the only checks here are the ones needed to build a URL.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{KioskError, KioskResult};

/// Browser process configuration, immutable for the supervisor's lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable: PathBuf,
    pub window_width: u32,
    pub window_height: u32,
    pub device_scale_factor: f64,

    pub memory_limit_mb: u32,
    /// Fraction of `memory_limit_mb` that triggers a cache clear
    pub memory_warning_threshold: f64,
    /// Fraction of `memory_limit_mb` that triggers a restart
    pub memory_critical_threshold: f64,

    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    pub health_check_interval_secs: u64,
    pub memory_check_interval_secs: u64,
    /// Settling delay before every launch
    pub launch_delay_secs: f64,

    pub crash_restart_delay_secs: f64,
    pub max_restart_attempts: u32,
    pub restart_backoff_factor: f64,
    pub reset_attempts_after_secs: u64,

    /// X display the browser renders to
    pub display: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,

    pub disable_extensions: bool,
    pub disable_plugins: bool,
    pub disable_gpu: bool,
    pub hide_scrollbars: bool,
    pub enable_touch: bool,
    /// Inherit the browser's stdout/stderr instead of discarding it
    pub forward_output: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("chromium-browser"),
            window_width: 480,
            window_height: 800,
            device_scale_factor: 1.0,
            memory_limit_mb: 80,
            memory_warning_threshold: 0.8,
            memory_critical_threshold: 0.95,
            startup_timeout_secs: 30,
            shutdown_timeout_secs: 10,
            health_check_interval_secs: 30,
            memory_check_interval_secs: 60,
            launch_delay_secs: 2.0,
            crash_restart_delay_secs: 3.0,
            max_restart_attempts: 3,
            restart_backoff_factor: 1.5,
            reset_attempts_after_secs: 300,
            display: Some(":0".to_string()),
            working_dir: None,
            user_data_dir: None,
            disable_extensions: true,
            disable_plugins: true,
            disable_gpu: true,
            hide_scrollbars: true,
            enable_touch: true,
            forward_output: false,
        }
    }
}

impl BrowserConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_secs(self.memory_check_interval_secs)
    }

    pub fn launch_delay(&self) -> Duration {
        Duration::from_secs_f64(self.launch_delay_secs.max(0.0))
    }

    pub fn reset_attempts_after(&self) -> Duration {
        Duration::from_secs(self.reset_attempts_after_secs)
    }
}

/// Command line used to run the co-located calendar web server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl Default for WebServerCommand {
    fn default() -> Self {
        Self {
            program: PathBuf::from("calendarbot"),
            args: vec!["--web".to_string()],
            working_dir: None,
        }
    }
}

/// Top-level kiosk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub browser: BrowserConfig,
    pub target_layout: String,
    pub host: String,
    pub port: u16,

    pub health_check_interval_secs: u64,
    pub server_ready_timeout_secs: u64,
    pub server_probe_timeout_secs: u64,
    pub server_probe_retries: u32,
    /// Fixed wait used instead of probing when no HTTP client is available
    pub readiness_fallback_delay_secs: u64,
    pub restart_settle_secs: u64,
    pub shutdown_timeout_secs: u64,

    pub web_server: WebServerCommand,
    pub pid_file: PathBuf,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            browser: BrowserConfig::default(),
            target_layout: "whats-next-view".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            health_check_interval_secs: 60,
            server_ready_timeout_secs: 30,
            server_probe_timeout_secs: 5,
            server_probe_retries: 3,
            readiness_fallback_delay_secs: 5,
            restart_settle_secs: 2,
            shutdown_timeout_secs: 30,
            web_server: WebServerCommand::default(),
            pid_file: std::env::temp_dir().join("calendar-kiosk.pid"),
        }
    }
}

impl KioskConfig {
    /// Load configuration from a JSON file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> KioskResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> KioskResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// URL the browser displays: `http://{host}:{port}/{layout}`
    pub fn kiosk_url(&self) -> KioskResult<String> {
        let layout = self.target_layout.trim().trim_matches('/');
        if layout.is_empty() {
            return Err(KioskError::config("target_layout cannot be empty"));
        }

        let base = Url::parse(&format!("http://{}:{}/", self.host, self.port))?;
        let url = base.join(layout)?;
        if url.host_str().is_none() {
            return Err(KioskError::config(format!("host '{}' is not usable", self.host)));
        }
        Ok(url.to_string())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn server_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.server_ready_timeout_secs)
    }

    pub fn server_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.server_probe_timeout_secs)
    }

    pub fn readiness_fallback_delay(&self) -> Duration {
        Duration::from_secs(self.readiness_fallback_delay_secs)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_secs(self.restart_settle_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
