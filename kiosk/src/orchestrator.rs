//! Kiosk orchestrator
//!
//! Sequences the co-located web server, the browser supervisor and the
//! daemon PID bookkeeping into one startup/shutdown, and runs the combined
//! health loop once both sides are up.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    logging, process_debug, process_info, process_warn, uptime_since, BrowserProcessState,
    Component, DaemonStatus, KioskStatus,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::browser::BrowserSupervisor;
use crate::config::KioskConfig;
use crate::error::{KioskError, KioskResult, StartupPhase};
use crate::traits::{DaemonControl, HttpProbe, ProcessLauncher, ProcessMetrics, WebServer};

/// Pause between readiness probes
const READINESS_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Pause between health probe retries within one tick
const PROBE_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How long shutdown waits for an in-flight health tick before aborting it
const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrator-level bookkeeping
#[derive(Default)]
struct KioskRuntime {
    start_time: Option<DateTime<Utc>>,
    shutdown_requested: bool,
    restart_count: u32,
    /// Whether this instance wrote the PID file (and so owns its cleanup)
    owns_pid_file: bool,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
}

impl KioskRuntime {
    fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.last_error_time = Some(Utc::now());
    }
}

struct HealthMonitor {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Coordinates the web server, the browser supervisor and the daemon
pub struct KioskOrchestrator<W, D>
where
    W: WebServer + 'static,
    D: DaemonControl + 'static,
{
    config: KioskConfig,
    web_server: Arc<W>,
    daemon: Arc<D>,
    probe: Option<Arc<dyn HttpProbe>>,
    metrics: Arc<dyn ProcessMetrics>,
    browser: BrowserSupervisor,
    runtime: Mutex<KioskRuntime>,
    monitor: Mutex<Option<HealthMonitor>>,
}

impl<W, D> KioskOrchestrator<W, D>
where
    W: WebServer + 'static,
    D: DaemonControl + 'static,
{
    /// Create the orchestrator and its browser supervisor
    ///
    /// Without an HTTP probe, readiness falls back to a fixed delay and web
    /// server health to the daemon's liveness flag.
    pub fn new(
        config: KioskConfig,
        web_server: W,
        daemon: D,
        launcher: Arc<dyn ProcessLauncher>,
        metrics: Arc<dyn ProcessMetrics>,
    ) -> Self {
        let browser = BrowserSupervisor::new(config.browser.clone(), launcher, metrics.clone());
        Self {
            config,
            web_server: Arc::new(web_server),
            daemon: Arc::new(daemon),
            probe: None,
            metrics,
            browser,
            runtime: Mutex::new(KioskRuntime::default()),
            monitor: Mutex::new(None),
        }
    }

    /// Configure the HTTP probe (fluent API)
    pub fn with_http_probe(mut self, probe: Arc<dyn HttpProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    pub fn browser(&self) -> &BrowserSupervisor {
        &self.browser
    }

    /// Run the four startup phases
    ///
    /// Any failure records the error, cleans up whatever was started, and is
    /// returned wrapped in the phase that failed.
    pub async fn start(&self) -> KioskResult<()> {
        logging::log_startup(Component::Kiosk, "calendar kiosk");
        self.runtime().shutdown_requested = false;

        match self.run_startup_phases().await {
            Ok(()) => {
                self.runtime().start_time = Some(Utc::now());
                logging::log_success(Component::Kiosk, "Kiosk started");
                Ok(())
            }
            Err(e) => {
                logging::log_error(Component::Kiosk, "Kiosk startup", &e);
                self.runtime().record_error(e.to_string());
                self.cleanup_failed_start().await;
                Err(e)
            }
        }
    }

    /// Ordered best-effort shutdown: monitoring, browser, web server
    ///
    /// Individual step failures are logged; the call itself succeeds once
    /// the sequence completes.
    pub async fn stop(&self, timeout: Duration) -> KioskResult<()> {
        logging::log_shutdown(Component::Kiosk, "stop requested");
        self.runtime().shutdown_requested = true;

        self.stop_health_monitoring().await;

        let step_timeout = timeout / 2;
        if let Err(e) = self.browser.stop(Some(step_timeout)).await {
            logging::log_error(Component::Browser, "Browser stop", &e);
        }

        match tokio::time::timeout(step_timeout, self.web_server.stop()).await {
            Ok(Ok(())) => process_info!(Component::WebServer, "🛑 Web server stopped"),
            Ok(Err(e)) => logging::log_error(Component::WebServer, "Web server stop", &e),
            Err(_) => process_warn!(
                Component::WebServer,
                "⏱️ Web server did not stop within {:?}",
                step_timeout
            ),
        }

        self.release_pid_file();
        self.runtime().start_time = None;
        logging::log_success(Component::Kiosk, "Kiosk stopped");
        Ok(())
    }

    /// Stop, settle, start
    ///
    /// The restart counter counts attempts, so it increments even when the
    /// subsequent start fails.
    pub async fn restart(&self) -> KioskResult<()> {
        let restart_number = {
            let mut runtime = self.runtime();
            runtime.restart_count += 1;
            runtime.restart_count
        };
        process_info!(Component::Kiosk, "🔄 Restarting kiosk (restart #{})", restart_number);

        self.stop(self.config.shutdown_timeout()).await?;
        tokio::time::sleep(self.config.restart_settle()).await;
        self.start().await
    }

    /// Point-in-time snapshot; never fails
    ///
    /// A failing daemon lookup degrades the snapshot (not running, error
    /// captured) instead of propagating.
    pub async fn status(&self) -> KioskStatus {
        let browser = self.browser.status().await;

        let (start_time, shutdown_requested, restart_count, mut last_error, mut last_error_time) = {
            let runtime = self.runtime();
            (
                runtime.start_time,
                runtime.shutdown_requested,
                runtime.restart_count,
                runtime.last_error.clone(),
                runtime.last_error_time,
            )
        };

        let daemon = match self.daemon_status() {
            Ok(daemon) => Some(daemon),
            Err(e) => {
                process_warn!(Component::Daemon, "⚠️ Daemon status unavailable: {}", e);
                last_error = Some(format!("Daemon status unavailable: {e}"));
                last_error_time = Some(Utc::now());
                None
            }
        };

        let is_running = start_time.is_some()
            && !shutdown_requested
            && daemon.as_ref().is_some_and(|daemon| daemon.is_running);

        KioskStatus {
            is_running,
            start_time,
            uptime_seconds: if is_running { uptime_since(start_time) } else { None },
            daemon: daemon.unwrap_or_default(),
            browser,
            system_memory_percent: self.metrics.system_memory_percent(),
            system_cpu_percent: self.metrics.system_cpu_percent(),
            restart_count,
            last_error,
            last_error_time,
        }
    }

    /// Whether the combined health loop is currently running
    pub fn is_monitoring(&self) -> bool {
        self.monitor_slot()
            .as_ref()
            .is_some_and(|monitor| !monitor.handle.is_finished())
    }

    async fn run_startup_phases(&self) -> KioskResult<()> {
        let url = self.config.kiosk_url()?;

        logging::log_progress(Component::Kiosk, "Phase 1/4", "starting web server");
        self.ensure_web_server()
            .await
            .map_err(|e| e.in_phase(StartupPhase::WebServer))?;

        logging::log_progress(Component::Kiosk, "Phase 2/4", &format!("waiting for {url}"));
        self.wait_for_web_server(&url)
            .await
            .map_err(|e| e.in_phase(StartupPhase::Readiness))?;

        logging::log_progress(Component::Kiosk, "Phase 3/4", "starting browser");
        self.browser
            .start(&url)
            .await
            .map_err(|e| e.in_phase(StartupPhase::Browser))?;

        logging::log_progress(Component::Kiosk, "Phase 4/4", "starting health monitoring");
        self.start_health_monitoring(url)
            .await
            .map_err(|e| e.in_phase(StartupPhase::Monitoring))
    }

    /// Phase 1: reuse a running daemon or start the web server and record our PID
    async fn ensure_web_server(&self) -> KioskResult<()> {
        if self.daemon.is_running()? {
            let pid = self.daemon.pid()?;
            process_info!(
                Component::WebServer,
                "♻️ Reusing running daemon (PID: {})",
                pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
            );
            return Ok(());
        }

        self.web_server.start().await?;
        let pid = self.daemon.create_pid_file()?;
        self.runtime().owns_pid_file = true;
        process_info!(Component::WebServer, "🌍 Web server started (daemon PID: {})", pid);
        Ok(())
    }

    /// Phase 2: poll the kiosk URL until it answers or the timeout elapses
    async fn wait_for_web_server(&self, url: &str) -> KioskResult<()> {
        let Some(probe) = &self.probe else {
            let delay = self.config.readiness_fallback_delay();
            process_warn!(
                Component::WebServer,
                "No HTTP probe available, waiting {:?} for the web server",
                delay
            );
            tokio::time::sleep(delay).await;
            return Ok(());
        };

        let timeout = self.config.server_ready_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            if probe.get_ok(url, self.config.server_probe_timeout()).await {
                process_info!(Component::WebServer, "✅ Web server ready at {}", url);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(KioskError::ReadinessTimeout {
                    url: url.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(READINESS_RETRY_INTERVAL).await;
        }
    }

    /// Phase 4: spawn the combined health loop
    async fn start_health_monitoring(&self, url: String) -> KioskResult<()> {
        let interval = self.config.health_check_interval();
        if interval.is_zero() {
            return Err(KioskError::config("health_check_interval_secs must be positive"));
        }

        self.stop_health_monitoring().await;

        let context = HealthContext {
            web_server: self.web_server.clone(),
            daemon: self.daemon.clone(),
            probe: self.probe.clone(),
            browser: self.browser.clone(),
            url,
            probe_timeout: self.config.server_probe_timeout(),
            probe_retries: self.config.server_probe_retries.max(1),
            restart_settle: self.config.restart_settle(),
        };

        let (cancel, cancel_rx) = watch::channel(false);
        let handle = tokio::spawn(health_loop(context, interval, cancel_rx));
        *self.monitor_slot() = Some(HealthMonitor { cancel, handle });

        process_debug!(Component::Kiosk, "🩺 Health monitoring every {:?}", interval);
        Ok(())
    }

    async fn stop_health_monitoring(&self) {
        let monitor = self.monitor_slot().take();
        let Some(HealthMonitor { cancel, mut handle }) = monitor else {
            return;
        };

        let _ = cancel.send(true);
        if tokio::time::timeout(MONITOR_STOP_TIMEOUT, &mut handle).await.is_err() {
            process_warn!(Component::Kiosk, "⏱️ Health monitor did not stop in time, aborting");
            handle.abort();
        }
        process_debug!(Component::Kiosk, "Health monitoring stopped");
    }

    /// Each step is guarded independently so one failure does not block the rest
    async fn cleanup_failed_start(&self) {
        self.stop_health_monitoring().await;

        if let Err(e) = self.browser.stop(None).await {
            logging::log_error(Component::Browser, "Cleanup browser stop", &e);
        }
        if let Err(e) = self.web_server.stop().await {
            logging::log_error(Component::WebServer, "Cleanup web server stop", &e);
        }
        self.release_pid_file();
    }

    fn release_pid_file(&self) {
        let owned = std::mem::take(&mut self.runtime().owns_pid_file);
        if !owned {
            return;
        }
        if let Err(e) = self.daemon.cleanup_pid_file() {
            logging::log_error(Component::Daemon, "PID file cleanup", &e);
        }
    }

    fn daemon_status(&self) -> KioskResult<DaemonStatus> {
        Ok(DaemonStatus {
            is_running: self.daemon.is_running()?,
            pid: self.daemon.pid()?,
        })
    }

    fn runtime(&self) -> MutexGuard<'_, KioskRuntime> {
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn monitor_slot(&self) -> MutexGuard<'_, Option<HealthMonitor>> {
        self.monitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything the combined health loop needs, detached from the orchestrator
struct HealthContext<W, D> {
    web_server: Arc<W>,
    daemon: Arc<D>,
    probe: Option<Arc<dyn HttpProbe>>,
    browser: BrowserSupervisor,
    url: String,
    probe_timeout: Duration,
    probe_retries: u32,
    restart_settle: Duration,
}

impl<W, D> HealthContext<W, D>
where
    W: WebServer,
    D: DaemonControl,
{
    /// Transitional states belong to the supervisor. A failed or stopped
    /// browser is unhealthy so the restart limit bounds its retries.
    async fn browser_healthy(&self) -> bool {
        match self.browser.state().await {
            BrowserProcessState::Running => self.browser.is_healthy().await,
            state @ (BrowserProcessState::Starting | BrowserProcessState::Restarting) => {
                process_debug!(Component::Kiosk, "Browser {}, skipping health check", state);
                true
            }
            BrowserProcessState::Crashed
            | BrowserProcessState::Failed
            | BrowserProcessState::Stopped => false,
        }
    }

    async fn web_server_healthy(&self) -> bool {
        let Some(probe) = &self.probe else {
            return self.daemon.is_running().unwrap_or_else(|e| {
                process_warn!(Component::Daemon, "⚠️ Daemon liveness unavailable: {}", e);
                false
            });
        };

        for attempt in 1..=self.probe_retries {
            if probe.get_ok(&self.url, self.probe_timeout).await {
                return true;
            }
            if attempt < self.probe_retries {
                tokio::time::sleep(PROBE_RETRY_INTERVAL).await;
            }
        }
        false
    }

    async fn restart_browser(&self) {
        process_warn!(Component::Kiosk, "💔 Browser unhealthy, restarting");
        if let Err(e) = self.browser.restart().await {
            logging::log_error(Component::Browser, "Browser restart", &e);
        }
    }

    async fn restart_web_server(&self) {
        process_warn!(Component::WebServer, "💔 Web server unhealthy, restarting");
        if let Err(e) = self.web_server.stop().await {
            logging::log_error(Component::WebServer, "Web server stop", &e);
        }
        tokio::time::sleep(self.restart_settle).await;
        match self.web_server.start().await {
            Ok(()) => logging::log_success(Component::WebServer, "Web server restarted"),
            Err(e) => logging::log_error(Component::WebServer, "Web server start", &e),
        }
    }
}

/// Combined health loop; browser and web server are checked and recovered
/// independently within the same tick
async fn health_loop<W, D>(
    context: HealthContext<W, D>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) where
    W: WebServer,
    D: DaemonControl,
{
    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        if *cancel.borrow() {
            break;
        }

        let (browser_ok, server_ok) =
            tokio::join!(context.browser_healthy(), context.web_server_healthy());

        tokio::join!(
            async {
                if !browser_ok {
                    context.restart_browser().await;
                }
            },
            async {
                if !server_ok {
                    context.restart_web_server().await;
                }
            },
        );
    }
    process_debug!(Component::Kiosk, "Health loop exited");
}
