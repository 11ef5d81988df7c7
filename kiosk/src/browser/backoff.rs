//! Restart backoff policy

use std::time::Duration;

/// Hard ceiling on any restart delay
pub const MAX_RESTART_DELAY: Duration = Duration::from_secs(60);

/// Delay before restart attempt `attempt` (1-based)
///
/// Attempt 1 waits `base_secs`; attempt n waits
/// `floor(base_secs * factor^(n-1))` whole seconds, never less than
/// `base_secs`. Every delay is capped at [`MAX_RESTART_DELAY`]. Factors below
/// 1 are treated as 1 so the sequence never shrinks.
pub fn restart_delay(base_secs: f64, factor: f64, attempt: u32) -> Duration {
    let base = if base_secs.is_finite() { base_secs.max(0.0) } else { 0.0 };
    let cap = MAX_RESTART_DELAY.as_secs_f64();

    if attempt <= 1 {
        return Duration::from_secs_f64(base.min(cap));
    }

    let factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
    let exponent = (attempt - 1).min(i32::MAX as u32) as i32;
    let delay = (base * factor.powi(exponent)).floor().max(base);

    if delay.is_finite() && delay < cap {
        Duration::from_secs_f64(delay)
    } else {
        MAX_RESTART_DELAY
    }
}
