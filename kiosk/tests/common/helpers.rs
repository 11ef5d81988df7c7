//! Fakes and builders for kiosk tests
//!
//! Process handles are fakes rather than mocks: tests need to flip a live
//! process into "exited" long after it was handed to the supervisor.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kiosk::traits::{MockDaemonControl, MockHttpProbe, MockWebServer};
use kiosk::{
    BrowserProcess, BrowserSupervisor, KioskConfig, KioskError, KioskOrchestrator, KioskResult,
    LaunchSpec, ProcessLauncher, ProcessMetrics,
};

use super::fixtures::TestFixtures;

/// Remote control for one fake process
#[derive(Default)]
pub struct ProcessControl {
    exited: AtomicBool,
    ignore_terminate: AtomicBool,
    terminate_calls: AtomicUsize,
    kill_calls: AtomicUsize,
}

impl ProcessControl {
    /// Simulate the process dying on its own
    pub fn exit(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Make graceful termination a no-op so only kill ends the process
    pub fn ignore_terminate(&self) {
        self.ignore_terminate.store(true, Ordering::SeqCst);
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }

    pub fn kill_calls(&self) -> usize {
        self.kill_calls.load(Ordering::SeqCst)
    }
}

struct FakeProcess {
    pid: u32,
    control: Arc<ProcessControl>,
}

#[async_trait]
impl BrowserProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_exited(&mut self) -> KioskResult<bool> {
        Ok(self.control.has_exited())
    }

    fn terminate(&mut self) -> KioskResult<()> {
        self.control.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.control.ignore_terminate.load(Ordering::SeqCst) {
            self.control.exit();
        }
        Ok(())
    }

    async fn wait_exit(&mut self, timeout: Duration) -> bool {
        if self.control.has_exited() {
            return true;
        }
        tokio::time::sleep(timeout).await;
        self.control.has_exited()
    }

    async fn kill(&mut self) -> KioskResult<()> {
        self.control.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.control.exit();
        Ok(())
    }
}

/// Launcher that records every spec and hands out fake processes
pub struct FakeLauncher {
    specs: Mutex<Vec<LaunchSpec>>,
    processes: Mutex<Vec<Arc<ProcessControl>>>,
    fail: AtomicBool,
    exit_immediately: AtomicBool,
    next_pid: AtomicU32,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            exit_immediately: AtomicBool::new(false),
            next_pid: AtomicU32::new(1000),
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// New processes die before they can become responsive
    pub fn set_exit_immediately(&self, exit: bool) {
        self.exit_immediately.store(exit, Ordering::SeqCst);
    }

    /// Launch attempts, including failed ones
    pub fn launch_count(&self) -> usize {
        self.specs.lock().unwrap().len()
    }

    pub fn last_spec(&self) -> Option<LaunchSpec> {
        self.specs.lock().unwrap().last().cloned()
    }

    /// Control for the most recently spawned process
    pub fn latest(&self) -> Arc<ProcessControl> {
        self.processes
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no process launched yet")
    }

    pub fn process(&self, index: usize) -> Arc<ProcessControl> {
        self.processes.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> KioskResult<Box<dyn BrowserProcess>> {
        self.specs.lock().unwrap().push(spec.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(KioskError::launch("fake launcher refused to spawn"));
        }

        let control = Arc::new(ProcessControl::default());
        if self.exit_immediately.load(Ordering::SeqCst) {
            control.exit();
        }
        self.processes.lock().unwrap().push(control.clone());

        Ok(Box::new(FakeProcess {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            control,
        }))
    }
}

/// Metrics with a settable memory reading
pub struct FakeMetrics {
    memory_mb: Mutex<Option<f64>>,
    fail: AtomicBool,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self {
            memory_mb: Mutex::new(Some(40.0)),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_memory(&self, memory_mb: Option<f64>) {
        *self.memory_mb.lock().unwrap() = memory_mb;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ProcessMetrics for FakeMetrics {
    fn memory_mb(&self, _pid: u32) -> KioskResult<Option<f64>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KioskError::metrics("fake metrics unavailable"));
        }
        Ok(*self.memory_mb.lock().unwrap())
    }

    fn cpu_percent(&self, _pid: u32) -> KioskResult<Option<f64>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(KioskError::metrics("fake metrics unavailable"));
        }
        Ok(self.memory_mb.lock().unwrap().map(|_| 2.5))
    }

    fn system_memory_percent(&self) -> Option<f64> {
        Some(42.0)
    }

    fn system_cpu_percent(&self) -> Option<f64> {
        Some(7.5)
    }
}

/// Supervisor wired to fresh fakes
pub fn supervisor(
    config: kiosk::BrowserConfig,
) -> (BrowserSupervisor, Arc<FakeLauncher>, Arc<FakeMetrics>) {
    let launcher = Arc::new(FakeLauncher::new());
    let metrics = Arc::new(FakeMetrics::new());
    let supervisor = BrowserSupervisor::new(config, launcher.clone(), metrics.clone());
    (supervisor, launcher, metrics)
}

/// Orchestrator under test plus handles on its fakes
pub struct TestKiosk {
    pub orchestrator: KioskOrchestrator<MockWebServer, MockDaemonControl>,
    pub launcher: Arc<FakeLauncher>,
    pub metrics: Arc<FakeMetrics>,
}

/// Builder for orchestrators with permissive default mocks
///
/// The default daemon reports running once its PID file was created; the
/// default probe always answers 200.
pub struct OrchestratorBuilder {
    config: KioskConfig,
    web_server: MockWebServer,
    daemon: MockDaemonControl,
    probe: Option<MockHttpProbe>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        let mut web_server = MockWebServer::new();
        web_server.expect_start().returning(|| Ok(())).times(0..);
        web_server.expect_stop().returning(|| Ok(())).times(0..);

        let mut probe = MockHttpProbe::new();
        probe.expect_get_ok().returning(|_, _| true).times(0..);

        Self {
            config: TestFixtures::kiosk_config(),
            web_server,
            daemon: Self::pid_file_daemon(),
            probe: Some(probe),
        }
    }

    /// Daemon mock that behaves like a real PID file
    pub fn pid_file_daemon() -> MockDaemonControl {
        let written = Arc::new(AtomicBool::new(false));
        let mut daemon = MockDaemonControl::new();

        let flag = written.clone();
        daemon
            .expect_is_running()
            .returning(move || Ok(flag.load(Ordering::SeqCst)))
            .times(0..);
        let flag = written.clone();
        daemon
            .expect_pid()
            .returning(move || Ok(flag.load(Ordering::SeqCst).then_some(TestFixtures::DAEMON_PID)))
            .times(0..);
        let flag = written.clone();
        daemon
            .expect_create_pid_file()
            .returning(move || {
                flag.store(true, Ordering::SeqCst);
                Ok(TestFixtures::DAEMON_PID)
            })
            .times(0..);
        daemon
            .expect_cleanup_pid_file()
            .returning(move || Ok(written.swap(false, Ordering::SeqCst)))
            .times(0..);

        daemon
    }

    pub fn with_config<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut KioskConfig),
    {
        setup(&mut self.config);
        self
    }

    /// Replace the web server mock; no default expectations are kept
    pub fn with_web_server<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockWebServer),
    {
        let mut web_server = MockWebServer::new();
        setup(&mut web_server);
        self.web_server = web_server;
        self
    }

    /// Replace the daemon mock; no default expectations are kept
    pub fn with_daemon<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockDaemonControl),
    {
        let mut daemon = MockDaemonControl::new();
        setup(&mut daemon);
        self.daemon = daemon;
        self
    }

    /// Replace the probe mock; no default expectations are kept
    pub fn with_probe<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockHttpProbe),
    {
        let mut probe = MockHttpProbe::new();
        setup(&mut probe);
        self.probe = Some(probe);
        self
    }

    pub fn without_probe(mut self) -> Self {
        self.probe = None;
        self
    }

    pub fn build(self) -> TestKiosk {
        let launcher = Arc::new(FakeLauncher::new());
        let metrics = Arc::new(FakeMetrics::new());

        let mut orchestrator = KioskOrchestrator::new(
            self.config,
            self.web_server,
            self.daemon,
            launcher.clone(),
            metrics.clone(),
        );
        if let Some(probe) = self.probe {
            orchestrator = orchestrator.with_http_probe(Arc::new(probe));
        }

        TestKiosk {
            orchestrator,
            launcher,
            metrics,
        }
    }
}
