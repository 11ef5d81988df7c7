//! Shared logging utilities for consistent tracing across kiosk components

use crate::types::Component;
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Build the filter directive for the kiosk crates at the given base level
pub fn filter_directive(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("kiosk={base_level},shared={base_level},reqwest=warn,hyper=warn")
}

/// Initialize the stdout tracing subscriber
///
/// `RUST_LOG` wins over the computed directive when it is set.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(log_level)));

    // A subscriber may already be installed (tests, embedding); keep it
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! process_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! process_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(
        process = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        process = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        process = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: Component, message: &str) {
    info!(
        process = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}

/// Contextual logging helper for progress updates
pub fn log_progress(component: Component, action: &str, details: &str) {
    info!(
        process = %component,
        timestamp = format_timestamp(),
        "📋 {}: {}",
        action,
        details
    );
}
