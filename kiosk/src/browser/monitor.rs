//! Background monitors for the supervised browser
//!
//! Two cooperative loops run per launched process: a health loop and a
//! memory loop. Both are started together and stopped together through a
//! shared cancellation signal. Recovery work they trigger runs as a separate
//! task tracked in [`RecoveryTasks`], so a hanging restart never blocks the
//! next monitoring tick and is never silently dropped.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, Weak};
use std::time::Duration;

use shared::{process_debug, process_info, process_warn, BrowserProcessState, Component};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::supervisor::{BrowserSupervisor, SupervisorInner};
use crate::config::BrowserConfig;

/// Shortest allowed monitor tick
const MIN_TICK: Duration = Duration::from_millis(100);

/// Memory pressure relative to the configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLevel {
    Normal,
    /// At or above the warning fraction: clear the cache
    Warning,
    /// At or above the critical fraction: restart
    Critical,
}

/// Classify a memory reading against the configured thresholds
///
/// A zero limit disables memory escalation.
pub fn classify_memory(usage_mb: f64, config: &BrowserConfig) -> MemoryLevel {
    if config.memory_limit_mb == 0 {
        return MemoryLevel::Normal;
    }

    let fraction = usage_mb / f64::from(config.memory_limit_mb);
    if fraction >= config.memory_critical_threshold {
        MemoryLevel::Critical
    } else if fraction >= config.memory_warning_threshold {
        MemoryLevel::Warning
    } else {
        MemoryLevel::Normal
    }
}

/// Recovery work a monitor can hand off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    Restart,
    ClearCache,
}

/// Registry of fire-and-forget recovery tasks
///
/// Finished tasks are reaped whenever a new one is registered.
#[derive(Default)]
pub(crate) struct RecoveryTasks {
    tasks: Mutex<JoinSet<()>>,
}

impl RecoveryTasks {
    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    pub(crate) fn pending(&self) -> usize {
        let mut tasks = self.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Await every task registered so far
    pub(crate) async fn wait_all(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    process_warn!(Component::Browser, "⚠️ Recovery task panicked: {}", e);
                }
            }
        }
    }

    /// Abort every registered task and wait for them to unwind
    pub(crate) async fn abort_all(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        if !tasks.is_empty() {
            process_debug!(Component::Browser, "🧹 Aborting {} recovery task(s)", tasks.len());
        }
        tasks.shutdown().await;
    }
}

/// Running health and memory loops for one process
pub(crate) struct MonitorSet {
    cancel: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl MonitorSet {
    pub(crate) fn spawn(supervisor: Weak<SupervisorInner>, config: &BrowserConfig) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);

        let handles = vec![
            tokio::spawn(health_loop(
                supervisor.clone(),
                config.health_check_interval().max(MIN_TICK),
                cancel_rx.clone(),
            )),
            tokio::spawn(memory_loop(
                supervisor,
                config.memory_check_interval().max(MIN_TICK),
                cancel_rx,
            )),
        ];

        Self { cancel, handles }
    }

    /// Signal both loops and wait until neither is running
    pub(crate) async fn shutdown(self) {
        let _ = self.cancel.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    process_warn!(Component::Browser, "⚠️ Monitor task panicked: {}", e);
                }
            }
        }
    }
}

/// Sleep one tick; false once cancellation was requested
async fn wait_tick(cancel: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    if *cancel.borrow() {
        return false;
    }
    tokio::select! {
        _ = cancel.changed() => false,
        _ = tokio::time::sleep(interval) => !*cancel.borrow(),
    }
}

async fn health_loop(
    supervisor: Weak<SupervisorInner>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    while wait_tick(&mut cancel, interval).await {
        let Some(supervisor) = BrowserSupervisor::upgrade(&supervisor) else {
            break;
        };

        match supervisor.state().await {
            BrowserProcessState::Starting => continue,
            BrowserProcessState::Running | BrowserProcessState::Crashed => {}
            _ => break,
        }

        supervisor.record_health_check().await;
        if !supervisor.is_healthy().await {
            process_warn!(Component::Browser, "💔 Browser unhealthy, scheduling restart");
            supervisor.schedule_recovery(RecoveryAction::Restart);
            break;
        }
    }
    process_debug!(Component::Browser, "Health monitor stopped");
}

async fn memory_loop(
    supervisor: Weak<SupervisorInner>,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    while wait_tick(&mut cancel, interval).await {
        let Some(supervisor) = BrowserSupervisor::upgrade(&supervisor) else {
            break;
        };

        match supervisor.state().await {
            BrowserProcessState::Running => {}
            BrowserProcessState::Starting | BrowserProcessState::Crashed => continue,
            _ => break,
        }

        let Some(usage_mb) = supervisor.memory_usage_mb().await else {
            process_debug!(Component::Browser, "Memory usage unknown, skipping check");
            continue;
        };

        let limit = supervisor.config().memory_limit_mb;
        match classify_memory(usage_mb, supervisor.config()) {
            MemoryLevel::Critical => {
                process_warn!(
                    Component::Browser,
                    "🔥 Memory critical ({:.1}/{} MB), scheduling restart",
                    usage_mb,
                    limit
                );
                supervisor.schedule_recovery(RecoveryAction::Restart);
                break;
            }
            MemoryLevel::Warning => {
                process_info!(
                    Component::Browser,
                    "⚠️ Memory high ({:.1}/{} MB), scheduling cache clear",
                    usage_mb,
                    limit
                );
                supervisor.schedule_recovery(RecoveryAction::ClearCache);
            }
            MemoryLevel::Normal => {}
        }
    }
    process_debug!(Component::Browser, "Memory monitor stopped");
}
