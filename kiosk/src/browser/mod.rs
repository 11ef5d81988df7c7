//! Browser process supervision
//!
//! - `launcher`: command-line construction for constrained hardware
//! - `backoff`: restart delay policy
//! - `monitor`: health and memory loops plus the recovery task registry
//! - `supervisor`: the lifecycle owner tying them together

pub mod backoff;
pub mod launcher;
pub mod monitor;
pub mod supervisor;

pub use backoff::{restart_delay, MAX_RESTART_DELAY};
pub use launcher::{browser_launch_spec, build_browser_args};
pub use monitor::{classify_memory, MemoryLevel, RecoveryAction};
pub use supervisor::BrowserSupervisor;
