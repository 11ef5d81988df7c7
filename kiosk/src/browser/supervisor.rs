//! Browser process supervisor
//!
//! Owns one browser process across its lifetime: start, stop, restart with
//! exponential backoff, health and memory monitoring, and status snapshots.
//! The supervisor is cheap to clone; clones share the same process handle
//! and counters, which persist across start/stop cycles.

use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    process_debug, process_error, process_info, process_warn, uptime_since, BrowserProcessState,
    BrowserStatus, Component,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::backoff::restart_delay;
use super::launcher::browser_launch_spec;
use super::monitor::{MonitorSet, RecoveryAction, RecoveryTasks};
use crate::config::BrowserConfig;
use crate::error::{KioskError, KioskResult};
use crate::traits::{BrowserProcess, ProcessLauncher, ProcessMetrics};

/// Poll interval while waiting for a fresh process to settle
const RESPONSIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Consecutive live polls before a process counts as responsive
const RESPONSIVE_POLLS: u32 = 2;

/// Mutable supervisor state, guarded by one lock
struct BrowserRuntime {
    state: BrowserProcessState,
    process: Option<Box<dyn BrowserProcess>>,
    pid: Option<u32>,
    start_time: Option<DateTime<Utc>>,
    current_url: Option<String>,

    crash_count: u32,
    restart_count: u32,
    /// Rate-limited attempts within the current window
    restart_attempts: u32,
    attempt_window_start: Option<Instant>,
    last_restart_time: Option<DateTime<Utc>>,

    last_health_check: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
}

impl BrowserRuntime {
    fn new() -> Self {
        Self {
            state: BrowserProcessState::Stopped,
            process: None,
            pid: None,
            start_time: None,
            current_url: None,
            crash_count: 0,
            restart_count: 0,
            restart_attempts: 0,
            attempt_window_start: None,
            last_restart_time: None,
            last_health_check: None,
            last_error: None,
            last_error_time: None,
        }
    }

    fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_time = Some(Utc::now());
    }

    fn clear_error(&mut self) {
        self.last_error = None;
        self.last_error_time = None;
    }

    /// Start a fresh attempt window once the current one is older than `window`
    fn roll_attempt_window(&mut self, now: Instant, window: Duration) {
        match self.attempt_window_start {
            Some(started) if now.duration_since(started) >= window => {
                self.restart_attempts = 0;
                self.attempt_window_start = Some(now);
            }
            Some(_) => {}
            None => self.attempt_window_start = Some(now),
        }
    }

    fn reset_attempts(&mut self) {
        self.restart_attempts = 0;
        self.attempt_window_start = None;
    }

    /// Detach the process handle, clearing everything derived from it
    fn take_process(&mut self) -> Option<Box<dyn BrowserProcess>> {
        self.pid = None;
        self.start_time = None;
        self.process.take()
    }
}

pub(crate) struct SupervisorInner {
    config: BrowserConfig,
    launcher: Arc<dyn ProcessLauncher>,
    metrics: Arc<dyn ProcessMetrics>,
    runtime: Mutex<BrowserRuntime>,
    /// Serializes start/stop/restart
    lifecycle: Mutex<()>,
    monitors: StdMutex<Option<MonitorSet>>,
    recovery: RecoveryTasks,
}

/// Supervisor for the single kiosk browser process
#[derive(Clone)]
pub struct BrowserSupervisor {
    inner: Arc<SupervisorInner>,
}

impl BrowserSupervisor {
    pub fn new(
        config: BrowserConfig,
        launcher: Arc<dyn ProcessLauncher>,
        metrics: Arc<dyn ProcessMetrics>,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                launcher,
                metrics,
                runtime: Mutex::new(BrowserRuntime::new()),
                lifecycle: Mutex::new(()),
                monitors: StdMutex::new(None),
                recovery: RecoveryTasks::default(),
            }),
        }
    }

    pub(crate) fn upgrade(inner: &Weak<SupervisorInner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.inner.config
    }

    pub async fn state(&self) -> BrowserProcessState {
        self.inner.runtime.lock().await.state
    }

    /// Launch the browser pointed at `url`
    ///
    /// Any active process is stopped first. An explicit start also resets the
    /// restart attempt counter, which is how an operator recovers from
    /// restart exhaustion.
    pub async fn start(&self, url: &str) -> KioskResult<()> {
        let url = url.trim();
        if url.is_empty() {
            return Err(KioskError::InvalidArgument {
                field: "url".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        self.inner.runtime.lock().await.reset_attempts();
        self.start_locked(url).await
    }

    /// Stop the browser: graceful termination, then force-kill after `timeout`
    ///
    /// Idempotent. Monitors and pending recovery tasks are stopped before the
    /// process is touched, so no automatic restart can follow this call.
    pub async fn stop(&self, timeout: Option<Duration>) -> KioskResult<()> {
        self.stop_monitors().await;
        self.inner.recovery.abort_all().await;

        let _lifecycle = self.inner.lifecycle.lock().await;
        self.stop_locked(timeout).await
    }

    /// Restart with backoff, subject to the attempt limit
    pub async fn restart(&self) -> KioskResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        self.restart_locked().await
    }

    /// Clear the browser cache
    ///
    /// Cache clearing is not separable from a restart here; a no-op when the
    /// browser is not running.
    pub async fn clear_cache(&self) -> KioskResult<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.state().await != BrowserProcessState::Running {
            process_debug!(Component::Browser, "Browser not running, nothing to clear");
            return Ok(());
        }

        process_info!(Component::Browser, "🧹 Clearing browser cache via restart");
        self.restart_locked().await
    }

    /// Liveness and memory check
    ///
    /// An exited process moves the supervisor to `Crashed`. Memory above the
    /// limit is reported unhealthy without changing state; an unknown reading
    /// leaves the decision to liveness alone.
    pub async fn is_healthy(&self) -> bool {
        let mut runtime = self.inner.runtime.lock().await;
        if runtime.state != BrowserProcessState::Running {
            return false;
        }
        let Some(process) = runtime.process.as_mut() else {
            return false;
        };

        match process.try_exited() {
            Ok(false) => {}
            Ok(true) => {
                runtime.state = BrowserProcessState::Crashed;
                runtime.crash_count += 1;
                runtime.record_error("Browser process exited unexpectedly");
                process_warn!(
                    Component::Browser,
                    "💥 Browser process exited (crash #{})",
                    runtime.crash_count
                );
                return false;
            }
            Err(e) => {
                process_warn!(Component::Browser, "⚠️ Could not poll browser process: {}", e);
                return false;
            }
        }

        let Some(pid) = runtime.pid else {
            return true;
        };
        match self.inner.metrics.memory_mb(pid) {
            Ok(Some(usage_mb)) if usage_mb > f64::from(self.inner.config.memory_limit_mb) => {
                process_warn!(
                    Component::Browser,
                    "🔥 Browser memory {:.1} MB exceeds limit {} MB",
                    usage_mb,
                    self.inner.config.memory_limit_mb
                );
                false
            }
            Ok(_) => true,
            Err(e) => {
                process_debug!(Component::Browser, "Memory reading unavailable: {}", e);
                true
            }
        }
    }

    /// Point-in-time snapshot; never fails
    ///
    /// Errors while gathering metrics produce a snapshot forced into `Failed`
    /// with the error captured.
    pub async fn status(&self) -> BrowserStatus {
        let is_responsive = self.is_healthy().await;
        let runtime = self.inner.runtime.lock().await;

        match self.collect_status(&runtime, is_responsive) {
            Ok(status) => status,
            Err(e) => {
                process_warn!(Component::Browser, "⚠️ Status collection failed: {}", e);
                BrowserStatus {
                    crash_count: runtime.crash_count,
                    restart_count: runtime.restart_count,
                    last_restart_time: runtime.last_restart_time,
                    last_health_check: runtime.last_health_check,
                    ..BrowserStatus::failed(format!("Status collection failed: {e}"))
                }
            }
        }
    }

    /// Recovery tasks scheduled by the monitors and not yet finished
    pub fn pending_recovery_tasks(&self) -> usize {
        self.inner.recovery.pending()
    }

    /// Wait for every recovery task scheduled so far to finish
    pub async fn wait_for_recovery(&self) {
        self.inner.recovery.wait_all().await;
    }

    pub(crate) async fn record_health_check(&self) {
        self.inner.runtime.lock().await.last_health_check = Some(Utc::now());
    }

    pub(crate) async fn memory_usage_mb(&self) -> Option<f64> {
        let pid = self.inner.runtime.lock().await.pid?;
        match self.inner.metrics.memory_mb(pid) {
            Ok(reading) => reading,
            Err(e) => {
                process_debug!(Component::Browser, "Memory reading unavailable: {}", e);
                None
            }
        }
    }

    /// Hand recovery work to a tracked background task
    pub(crate) fn schedule_recovery(&self, action: RecoveryAction) {
        let supervisor = self.clone();
        self.inner.recovery.spawn(async move {
            let result = match action {
                RecoveryAction::Restart => supervisor.restart().await,
                RecoveryAction::ClearCache => supervisor.clear_cache().await,
            };
            if let Err(e) = result {
                process_error!(Component::Browser, "❌ Recovery ({:?}) failed: {}", action, e);
            }
        });
    }

    fn collect_status(
        &self,
        runtime: &BrowserRuntime,
        is_responsive: bool,
    ) -> KioskResult<BrowserStatus> {
        debug_assert!(runtime.process.is_none() || runtime.state.may_hold_process());

        let (memory_usage_mb, cpu_usage_percent) = match runtime.pid {
            Some(pid) if runtime.process.is_some() => (
                self.inner.metrics.memory_mb(pid)?,
                self.inner.metrics.cpu_percent(pid)?,
            ),
            _ => (None, None),
        };

        let uptime_seconds = if runtime.state == BrowserProcessState::Running {
            uptime_since(runtime.start_time)
        } else {
            None
        };

        Ok(BrowserStatus {
            state: runtime.state,
            pid: runtime.pid,
            start_time: runtime.start_time,
            uptime_seconds,
            memory_usage_mb,
            cpu_usage_percent,
            crash_count: runtime.crash_count,
            restart_count: runtime.restart_count,
            last_restart_time: runtime.last_restart_time,
            is_responsive,
            last_health_check: runtime.last_health_check,
            last_error: runtime.last_error.clone(),
            last_error_time: runtime.last_error_time,
        })
    }

    async fn start_locked(&self, url: &str) -> KioskResult<()> {
        let already_active = self.inner.runtime.lock().await.process.is_some();
        if already_active {
            process_info!(Component::Browser, "Browser already active, stopping it first");
            if let Err(e) = self.stop_locked(None).await {
                process_warn!(Component::Browser, "⚠️ Stopping previous browser failed: {}", e);
            }
        }

        {
            let mut runtime = self.inner.runtime.lock().await;
            runtime.state = BrowserProcessState::Starting;
            runtime.current_url = Some(url.to_string());
        }

        let config = &self.inner.config;
        let launch_delay = config.launch_delay();
        if !launch_delay.is_zero() {
            process_debug!(Component::Browser, "Waiting {:?} before launch", launch_delay);
            tokio::time::sleep(launch_delay).await;
        }

        let spec = browser_launch_spec(config, url);
        process_info!(
            Component::Browser,
            "🌐 Launching {} for {}",
            spec.program.display(),
            url
        );

        let process = match self.inner.launcher.launch(&spec).await {
            Ok(process) => process,
            Err(e) => {
                self.fail_start(&e).await;
                return Err(e);
            }
        };

        let pid = process.pid();
        {
            let mut runtime = self.inner.runtime.lock().await;
            runtime.process = Some(process);
            runtime.pid = pid;
        }
        self.start_monitors().await;

        let startup_timeout = config.startup_timeout();
        let outcome = match tokio::time::timeout(startup_timeout, self.wait_until_responsive()).await {
            Ok(result) => result,
            Err(_) => Err(KioskError::StartupTimeout {
                timeout: startup_timeout,
            }),
        };

        match outcome {
            Ok(()) => {
                let mut runtime = self.inner.runtime.lock().await;
                runtime.state = BrowserProcessState::Running;
                runtime.start_time = Some(Utc::now());
                runtime.clear_error();
                process_info!(
                    Component::Browser,
                    "✅ Browser running (PID: {})",
                    pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
                );
                Ok(())
            }
            Err(e) => {
                self.fail_start(&e).await;
                Err(e)
            }
        }
    }

    /// Wait until the fresh process has stayed alive for a few polls
    async fn wait_until_responsive(&self) -> KioskResult<()> {
        let mut live_polls = 0;
        while live_polls < RESPONSIVE_POLLS {
            tokio::time::sleep(RESPONSIVE_POLL_INTERVAL).await;

            let mut runtime = self.inner.runtime.lock().await;
            let process = runtime
                .process
                .as_mut()
                .ok_or_else(|| KioskError::launch("process handle lost during startup"))?;
            if process.try_exited()? {
                return Err(KioskError::launch("browser exited during startup"));
            }
            live_polls += 1;
        }
        Ok(())
    }

    /// Roll a failed start back to `Failed` with no monitors and no handle
    async fn fail_start(&self, error: &KioskError) {
        self.stop_monitors().await;

        let process = self.inner.runtime.lock().await.take_process();
        if let Some(mut process) = process {
            if let Err(e) = process.kill().await {
                process_warn!(Component::Browser, "⚠️ Killing failed browser: {}", e);
            }
        }

        let mut runtime = self.inner.runtime.lock().await;
        runtime.state = BrowserProcessState::Failed;
        runtime.record_error(error.to_string());
        process_error!(Component::Browser, "❌ Browser start failed: {}", error);
    }

    async fn stop_locked(&self, timeout: Option<Duration>) -> KioskResult<()> {
        let result = self.teardown(timeout).await;
        self.inner.runtime.lock().await.state = BrowserProcessState::Stopped;
        result
    }

    /// Stop monitors, then terminate and release the process handle
    ///
    /// Leaves the state field to the caller.
    async fn teardown(&self, timeout: Option<Duration>) -> KioskResult<()> {
        self.stop_monitors().await;

        let process = self.inner.runtime.lock().await.take_process();
        let Some(process) = process else {
            return Ok(());
        };

        let timeout = timeout.unwrap_or_else(|| self.inner.config.shutdown_timeout());
        terminate_process(process, timeout).await
    }

    async fn restart_locked(&self) -> KioskResult<()> {
        let config = &self.inner.config;
        let max_attempts = config.max_restart_attempts;

        let (attempt, url) = {
            let mut runtime = self.inner.runtime.lock().await;
            runtime.restart_count += 1;
            runtime.last_restart_time = Some(Utc::now());
            runtime.roll_attempt_window(Instant::now(), config.reset_attempts_after());
            runtime.restart_attempts += 1;
            (runtime.restart_attempts, runtime.current_url.clone())
        };

        if attempt > max_attempts {
            let error = KioskError::RestartExhausted {
                attempts: attempt,
                max: max_attempts,
            };
            process_error!(Component::Browser, "❌ {}, giving up", error);

            if let Err(e) = self.teardown(None).await {
                process_warn!(Component::Browser, "⚠️ Releasing browser failed: {}", e);
            }
            let mut runtime = self.inner.runtime.lock().await;
            runtime.state = BrowserProcessState::Failed;
            runtime.record_error(error.to_string());
            return Err(error);
        }

        let Some(url) = url else {
            return Err(KioskError::NoTargetUrl);
        };

        let delay = restart_delay(
            config.crash_restart_delay_secs,
            config.restart_backoff_factor,
            attempt,
        );
        process_info!(
            Component::Browser,
            "🔄 Restarting browser (attempt {}/{}) after {:?}",
            attempt,
            max_attempts,
            delay
        );

        self.inner.runtime.lock().await.state = BrowserProcessState::Restarting;
        if let Err(e) = self.teardown(None).await {
            process_warn!(Component::Browser, "⚠️ Stopping browser for restart failed: {}", e);
        }

        tokio::time::sleep(delay).await;
        self.start_locked(&url).await
    }

    async fn start_monitors(&self) {
        self.stop_monitors().await;
        let monitors = MonitorSet::spawn(Arc::downgrade(&self.inner), &self.inner.config);
        *self.monitors_slot() = Some(monitors);
    }

    async fn stop_monitors(&self) {
        let monitors = self.monitors_slot().take();
        if let Some(monitors) = monitors {
            monitors.shutdown().await;
        }
    }

    fn monitors_slot(&self) -> std::sync::MutexGuard<'_, Option<MonitorSet>> {
        self.inner
            .monitors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// SIGTERM-style request, bounded wait, then force-kill
async fn terminate_process(mut process: Box<dyn BrowserProcess>, timeout: Duration) -> KioskResult<()> {
    if process.try_exited().unwrap_or(false) {
        process_debug!(Component::Browser, "Browser process already exited");
        return Ok(());
    }

    match process.terminate() {
        Ok(()) => {
            if process.wait_exit(timeout).await {
                process_info!(Component::Browser, "🛑 Browser stopped gracefully");
                return Ok(());
            }
            process_warn!(
                Component::Browser,
                "⏱️ Browser ignored termination for {:?}, killing",
                timeout
            );
        }
        Err(e) => {
            process_warn!(Component::Browser, "⚠️ Graceful termination failed: {}, killing", e);
        }
    }

    process.kill().await
}
