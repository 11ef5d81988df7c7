//! Test fixtures and configuration for kiosk tests
//!
//! Intervals default to an hour so background monitors stay quiet unless a
//! test shortens them on purpose.

use kiosk::{BrowserConfig, KioskConfig};

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    pub const LAYOUT: &'static str = "whats-next-view";
    pub const PORT: u16 = 8080;
    pub const URL: &'static str = "http://localhost:8080/whats-next-view";

    /// PID the mocked daemon hands out
    pub const DAEMON_PID: u32 = 4242;

    pub const QUIET_INTERVAL_SECS: u64 = 3600;

    /// Browser config with no launch delay and 1s/2s/4s backoff
    pub fn browser_config() -> BrowserConfig {
        BrowserConfig {
            startup_timeout_secs: 5,
            shutdown_timeout_secs: 1,
            health_check_interval_secs: Self::QUIET_INTERVAL_SECS,
            memory_check_interval_secs: Self::QUIET_INTERVAL_SECS,
            launch_delay_secs: 0.0,
            crash_restart_delay_secs: 1.0,
            max_restart_attempts: 3,
            restart_backoff_factor: 2.0,
            reset_attempts_after_secs: 300,
            display: None,
            ..BrowserConfig::default()
        }
    }

    pub fn kiosk_config() -> KioskConfig {
        KioskConfig {
            browser: Self::browser_config(),
            target_layout: Self::LAYOUT.to_string(),
            port: Self::PORT,
            health_check_interval_secs: Self::QUIET_INTERVAL_SECS,
            server_ready_timeout_secs: 5,
            server_probe_timeout_secs: 1,
            server_probe_retries: 1,
            readiness_fallback_delay_secs: 5,
            restart_settle_secs: 1,
            shutdown_timeout_secs: 4,
            ..KioskConfig::default()
        }
    }
}
