//! Real capability implementations

pub mod daemon;
pub mod http_probe;
pub mod metrics;
pub mod output;
pub mod process_launcher;
pub mod web_server;

pub use daemon::PidFileDaemon;
pub use http_probe::ReqwestProbe;
pub use metrics::{NoMetrics, SysinfoMetrics};
pub use process_launcher::{ChildProcess, ChildProcessLauncher};
pub use web_server::CommandWebServer;
