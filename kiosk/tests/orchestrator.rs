//! Kiosk orchestrator tests
//!
//! Web server, daemon and probe are mockall mocks; the browser runs on the
//! fake launcher. Timing runs on tokio's paused clock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kiosk::{KioskError, StartupPhase};
use shared::{BrowserProcessState, DaemonStatus};
use tokio::time::Instant;

mod common;
use common::{OrchestratorBuilder, TestFixtures};

fn assert_phase(error: KioskError, expected: StartupPhase) -> KioskError {
    match error {
        KioskError::StartupPhaseFailed { phase, source } => {
            assert_eq!(phase, expected);
            *source
        }
        other => panic!("expected a startup phase failure, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_all_phases() {
    let kiosk = OrchestratorBuilder::new()
        .with_web_server(|web| {
            web.expect_start().returning(|| Ok(())).times(1);
            web.expect_stop().returning(|| Ok(())).times(1);
        })
        .build();

    kiosk.orchestrator.start().await.unwrap();

    let spec = kiosk.launcher.last_spec().unwrap();
    assert_eq!(spec.args.last().map(String::as_str), Some(TestFixtures::URL));
    assert!(kiosk.orchestrator.is_monitoring());

    let status = kiosk.orchestrator.status().await;
    assert!(status.is_running);
    assert!(status.start_time.is_some());
    assert!(status.uptime_seconds.is_some());
    assert_eq!(
        status.daemon,
        DaemonStatus {
            is_running: true,
            pid: Some(TestFixtures::DAEMON_PID),
        }
    );
    assert_eq!(status.browser.state, BrowserProcessState::Running);
    assert_eq!(status.system_memory_percent, Some(42.0));
    assert_eq!(status.restart_count, 0);

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();

    let status = kiosk.orchestrator.status().await;
    assert!(!status.is_running);
    assert!(!status.daemon.is_running);
    assert_eq!(status.browser.state, BrowserProcessState::Stopped);
    assert!(!kiosk.orchestrator.is_monitoring());
}

#[tokio::test(start_paused = true)]
async fn test_running_daemon_is_reused() {
    let kiosk = OrchestratorBuilder::new()
        .with_daemon(|daemon| {
            daemon.expect_is_running().returning(|| Ok(true));
            daemon.expect_pid().returning(|| Ok(Some(777)));
            daemon.expect_create_pid_file().times(0);
            daemon.expect_cleanup_pid_file().times(0);
        })
        .with_web_server(|web| {
            web.expect_start().times(0);
            web.expect_stop().returning(|| Ok(())).times(0..);
        })
        .build();

    kiosk.orchestrator.start().await.unwrap();

    let status = kiosk.orchestrator.status().await;
    assert!(status.is_running);
    assert_eq!(status.daemon.pid, Some(777));
    assert_eq!(kiosk.launcher.launch_count(), 1);

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_never_launches_browser() {
    let kiosk = OrchestratorBuilder::new()
        .with_web_server(|web| {
            web.expect_start().returning(|| Ok(())).times(1);
            web.expect_stop().returning(|| Ok(())).times(1);
        })
        .with_probe(|probe| {
            probe.expect_get_ok().returning(|_, _| false);
        })
        .build();

    let started = Instant::now();
    let error = kiosk.orchestrator.start().await.unwrap_err();

    let source = assert_phase(error, StartupPhase::Readiness);
    assert!(matches!(source, KioskError::ReadinessTimeout { .. }));
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(kiosk.launcher.launch_count(), 0);

    let status = kiosk.orchestrator.status().await;
    assert!(!status.is_running);
    assert!(!status.daemon.is_running);
    assert!(status.last_error.unwrap().contains("readiness"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_probe_waits_fixed_delay() {
    let kiosk = OrchestratorBuilder::new().without_probe().build();

    let started = Instant::now();
    kiosk.orchestrator.start().await.unwrap();

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(kiosk.launcher.launch_count(), 1);

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_web_server_failure_stops_in_phase_one() {
    let kiosk = OrchestratorBuilder::new()
        .with_web_server(|web| {
            web.expect_start()
                .returning(|| Err(KioskError::web_server("port 8080 in use")));
            web.expect_stop().returning(|| Ok(())).times(0..);
        })
        .build();

    let error = kiosk.orchestrator.start().await.unwrap_err();

    let source = assert_phase(error, StartupPhase::WebServer);
    assert!(matches!(source, KioskError::WebServerError { .. }));
    assert_eq!(kiosk.launcher.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_browser_failure_cleans_up_web_server() {
    let kiosk = OrchestratorBuilder::new()
        .with_web_server(|web| {
            web.expect_start().returning(|| Ok(())).times(1);
            web.expect_stop().returning(|| Ok(())).times(1);
        })
        .build();
    kiosk.launcher.set_fail(true);

    let error = kiosk.orchestrator.start().await.unwrap_err();

    let source = assert_phase(error, StartupPhase::Browser);
    assert!(matches!(source, KioskError::LaunchFailed { .. }));
    assert_eq!(
        kiosk.orchestrator.browser().state().await,
        BrowserProcessState::Stopped
    );
    assert!(!kiosk.orchestrator.is_monitoring());
}

#[tokio::test(start_paused = true)]
async fn test_monitoring_failure_stops_browser() {
    let kiosk = OrchestratorBuilder::new()
        .with_config(|config| config.health_check_interval_secs = 0)
        .build();

    let error = kiosk.orchestrator.start().await.unwrap_err();

    assert_phase(error, StartupPhase::Monitoring);
    assert_eq!(kiosk.launcher.launch_count(), 1);
    assert!(kiosk.launcher.latest().has_exited());
    assert_eq!(
        kiosk.orchestrator.browser().state().await,
        BrowserProcessState::Stopped
    );
}

#[tokio::test(start_paused = true)]
async fn test_blank_layout_is_rejected_before_any_phase() {
    let kiosk = OrchestratorBuilder::new()
        .with_config(|config| config.target_layout = String::new())
        .with_web_server(|web| {
            web.expect_start().times(0);
            web.expect_stop().returning(|| Ok(())).times(0..);
        })
        .build();

    let error = kiosk.orchestrator.start().await.unwrap_err();

    assert!(matches!(error, KioskError::ConfigurationError { .. }));
    assert_eq!(kiosk.launcher.launch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_succeeds_despite_step_failures() {
    let kiosk = OrchestratorBuilder::new()
        .with_web_server(|web| {
            web.expect_start().returning(|| Ok(()));
            web.expect_stop()
                .returning(|| Err(KioskError::web_server("already gone")));
        })
        .build();

    // Before start
    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();

    kiosk.orchestrator.start().await.unwrap();
    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();

    assert!(kiosk.launcher.latest().has_exited());
    assert!(!kiosk.orchestrator.status().await.is_running);
}

#[tokio::test(start_paused = true)]
async fn test_restart_counts_attempts_even_when_start_fails() {
    let kiosk = OrchestratorBuilder::new().build();
    kiosk.orchestrator.start().await.unwrap();

    kiosk.orchestrator.restart().await.unwrap();
    assert_eq!(kiosk.orchestrator.status().await.restart_count, 1);
    assert_eq!(kiosk.launcher.launch_count(), 2);

    kiosk.launcher.set_fail(true);
    assert!(kiosk.orchestrator.restart().await.is_err());
    assert!(kiosk.orchestrator.restart().await.is_err());

    let status = kiosk.orchestrator.status().await;
    assert_eq!(status.restart_count, 3);
    assert!(!status.is_running);
    assert!(status.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_status_folds_daemon_errors() {
    let kiosk = OrchestratorBuilder::new()
        .with_daemon(|daemon| {
            daemon
                .expect_is_running()
                .returning(|| Err(KioskError::daemon("PID file unreadable")));
            daemon.expect_pid().returning(|| Ok(None)).times(0..);
        })
        .build();

    let status = kiosk.orchestrator.status().await;

    assert!(!status.is_running);
    assert_eq!(status.daemon, DaemonStatus::default());
    assert!(status
        .last_error
        .unwrap()
        .contains("Daemon status unavailable"));
    assert!(status.last_error_time.is_some());
    assert_eq!(status.browser.state, BrowserProcessState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_recovers_both_sides_in_one_tick() {
    let server_healthy = Arc::new(AtomicBool::new(true));
    let starts = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(AtomicUsize::new(0));

    let (healthy, start_count, stop_count) =
        (server_healthy.clone(), starts.clone(), stops.clone());
    let probe_healthy = server_healthy.clone();

    let kiosk = OrchestratorBuilder::new()
        .with_config(|config| config.health_check_interval_secs = 10)
        .with_web_server(move |web| {
            web.expect_start().returning(move || {
                start_count.fetch_add(1, Ordering::SeqCst);
                healthy.store(true, Ordering::SeqCst);
                Ok(())
            });
            web.expect_stop().returning(move || {
                stop_count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        })
        .with_probe(move |probe| {
            probe
                .expect_get_ok()
                .returning(move |_, _| probe_healthy.load(Ordering::SeqCst));
        })
        .build();

    kiosk.orchestrator.start().await.unwrap();
    assert_eq!(starts.load(Ordering::SeqCst), 1);

    // Both sides fail before the first tick
    kiosk.launcher.latest().exit();
    server_healthy.store(false, Ordering::SeqCst);

    tokio::time::sleep(Duration::from_secs(13)).await;

    assert_eq!(stops.load(Ordering::SeqCst), 1);
    assert_eq!(starts.load(Ordering::SeqCst), 2);
    assert_eq!(kiosk.launcher.launch_count(), 2);

    let status = kiosk.orchestrator.status().await;
    assert_eq!(status.browser.state, BrowserProcessState::Running);
    assert_eq!(status.browser.crash_count, 1);
    assert_eq!(status.browser.restart_count, 1);
    // Component recoveries do not count as kiosk restarts
    assert_eq!(status.restart_count, 0);

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_retries_failed_browser() {
    let kiosk = OrchestratorBuilder::new()
        .with_config(|config| config.health_check_interval_secs = 10)
        .build();

    kiosk.orchestrator.start().await.unwrap();

    // The first recovery launch dies during startup
    kiosk.launcher.set_exit_immediately(true);
    kiosk.launcher.latest().exit();
    tokio::time::sleep(Duration::from_secs(15)).await;

    let browser = kiosk.orchestrator.browser();
    assert_eq!(browser.state().await, BrowserProcessState::Failed);
    assert_eq!(kiosk.launcher.launch_count(), 2);

    kiosk.launcher.set_exit_immediately(false);
    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(browser.state().await, BrowserProcessState::Running);
    assert_eq!(kiosk.launcher.launch_count(), 3);
    assert!(!kiosk.launcher.latest().has_exited());

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_health_loop_leaves_healthy_kiosk_alone() {
    let kiosk = OrchestratorBuilder::new()
        .with_config(|config| config.health_check_interval_secs = 10)
        .with_web_server(|web| {
            web.expect_start().returning(|| Ok(())).times(1);
            web.expect_stop().returning(|| Ok(())).times(1);
        })
        .build();

    kiosk.orchestrator.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(45)).await;

    assert_eq!(kiosk.launcher.launch_count(), 1);
    assert!(kiosk.orchestrator.is_monitoring());

    kiosk.orchestrator.stop(Duration::from_secs(4)).await.unwrap();
}
