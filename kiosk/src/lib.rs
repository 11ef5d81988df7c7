//! Kiosk supervisor library
//!
//! Keeps a single full-screen browser pointed at a co-located calendar web
//! server on constrained hardware, restarting either side when it stops
//! responding.

pub mod browser;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod traits;

// Re-export commonly used types
pub use browser::BrowserSupervisor;
pub use config::{BrowserConfig, KioskConfig, WebServerCommand};
pub use error::{KioskError, KioskResult, StartupPhase};
pub use orchestrator::KioskOrchestrator;
pub use traits::{
    BrowserProcess, DaemonControl, HttpProbe, LaunchSpec, ProcessLauncher, ProcessMetrics,
    WebServer,
};
