//! Shared types for the kiosk supervisor
//!
//! Contains the status snapshots handed to status consumers (CLI, logs)
//! and the logging setup used by every kiosk component.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
