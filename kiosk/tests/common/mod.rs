//! Common test utilities and infrastructure
//!
//! Shared fakes, fixtures and builders used across the kiosk test suites.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

// Re-export commonly used items for convenience
pub use fixtures::TestFixtures;
pub use helpers::{
    supervisor, FakeLauncher, FakeMetrics, OrchestratorBuilder, ProcessControl, TestKiosk,
};
