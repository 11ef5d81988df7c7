//! Kiosk supervisor error types

use shared::SharedError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Browser launch failed: {message}")]
    LaunchFailed { message: String },

    #[error("Browser did not become responsive within {timeout:?}")]
    StartupTimeout { timeout: Duration },

    #[error("Restart attempts exhausted ({attempts} > {max})")]
    RestartExhausted { attempts: u32, max: u32 },

    #[error("No target URL recorded for restart")]
    NoTargetUrl,

    #[error("Process control failed: {message}")]
    ProcessControl { message: String },

    #[error("Web server operation failed: {message}")]
    WebServerError { message: String },

    #[error("Web server at {url} not ready within {timeout:?}")]
    ReadinessTimeout { url: String, timeout: Duration },

    #[error("Daemon bookkeeping failed: {message}")]
    DaemonError { message: String },

    #[error("Metrics collection failed: {message}")]
    MetricsError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Kiosk startup phase '{phase}' failed: {source}")]
    StartupPhaseFailed {
        phase: StartupPhase,
        #[source]
        source: Box<KioskError>,
    },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),
}

impl KioskError {
    pub fn launch(message: impl Into<String>) -> Self {
        KioskError::LaunchFailed { message: message.into() }
    }

    pub fn process_control(message: impl Into<String>) -> Self {
        KioskError::ProcessControl { message: message.into() }
    }

    pub fn web_server(message: impl Into<String>) -> Self {
        KioskError::WebServerError { message: message.into() }
    }

    pub fn daemon(message: impl Into<String>) -> Self {
        KioskError::DaemonError { message: message.into() }
    }

    pub fn metrics(message: impl Into<String>) -> Self {
        KioskError::MetricsError { message: message.into() }
    }

    pub fn config(field: impl Into<String>) -> Self {
        KioskError::ConfigurationError { field: field.into() }
    }

    pub(crate) fn in_phase(self, phase: StartupPhase) -> Self {
        KioskError::StartupPhaseFailed {
            phase,
            source: Box::new(self),
        }
    }
}

/// The four kiosk startup phases, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    WebServer,
    Readiness,
    Browser,
    Monitoring,
}

impl std::fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupPhase::WebServer => write!(f, "web server"),
            StartupPhase::Readiness => write!(f, "readiness"),
            StartupPhase::Browser => write!(f, "browser"),
            StartupPhase::Monitoring => write!(f, "monitoring"),
        }
    }
}

pub type KioskResult<T> = Result<T, KioskError>;
