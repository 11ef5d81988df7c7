//! Main entry point for the kiosk binary
//!
//! Wires the orchestrator to the real process, metrics, probe and PID-file
//! implementations and runs until interrupted.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use kiosk::services::{
    ChildProcessLauncher, CommandWebServer, PidFileDaemon, ReqwestProbe, SysinfoMetrics,
};
use kiosk::{KioskConfig, KioskOrchestrator};
use shared::{logging, process_debug, process_info, Component};

/// Kiosk supervisor for a browser-based calendar display
#[derive(Parser)]
#[command(name = "kiosk")]
#[command(about = "Runs the calendar web server and keeps a kiosk browser pointed at it")]
pub struct Args {
    /// JSON configuration file
    #[arg(long, env = "KIOSK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Layout path to display
    #[arg(long, env = "KIOSK_LAYOUT")]
    pub layout: Option<String>,

    /// Web server port
    #[arg(long, env = "KIOSK_PORT")]
    pub port: Option<u16>,

    /// Browser executable
    #[arg(long, env = "KIOSK_BROWSER")]
    pub browser: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "KIOSK_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Skip HTTP probing and wait a fixed delay for the web server instead
    #[arg(long)]
    pub no_probe: bool,

    /// Forward browser stdout/stderr to this process
    #[arg(long)]
    pub forward_browser_output: bool,
}

impl Args {
    fn resolve_config(&self) -> anyhow::Result<KioskConfig> {
        let mut config = match &self.config {
            Some(path) => KioskConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => KioskConfig::default(),
        };

        if let Some(layout) = &self.layout {
            config.target_layout = layout.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(browser) = &self.browser {
            config.browser.executable = browser.clone();
        }
        if self.forward_browser_output {
            config.browser.forward_output = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let args = Args::parse();
    logging::init_tracing(Some(&args.log_level));

    let config = args.resolve_config()?;
    let url = config.kiosk_url().context("building kiosk URL")?;
    process_debug!(Component::Kiosk, "Target URL: {}", url);

    let web_server = CommandWebServer::new(config.web_server.clone(), config.port)
        .with_shutdown_timeout(config.shutdown_timeout() / 2);
    let daemon = PidFileDaemon::new(config.pid_file.clone());
    let shutdown_timeout = config.shutdown_timeout();

    let mut orchestrator = KioskOrchestrator::new(
        config,
        web_server,
        daemon,
        Arc::new(ChildProcessLauncher::new()),
        Arc::new(SysinfoMetrics::new()),
    );
    if !args.no_probe {
        orchestrator = orchestrator.with_http_probe(Arc::new(ReqwestProbe::new()));
    }

    orchestrator.start().await.context("starting kiosk")?;
    process_info!(Component::Kiosk, "🖥️  Kiosk running at {}", url);

    wait_for_shutdown_signal().await;

    orchestrator.stop(shutdown_timeout).await?;
    let status = orchestrator.status().await;
    process_debug!(
        Component::Kiosk,
        "Final status: {}",
        status.to_json().unwrap_or_else(|e| e.to_string())
    );

    logging::log_success(Component::Kiosk, "Kiosk stopped gracefully");
    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on unix
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        logging::log_shutdown(Component::Kiosk, "Received Ctrl+C signal");
                    }
                    _ = sigterm.recv() => {
                        logging::log_shutdown(Component::Kiosk, "Received SIGTERM");
                    }
                }
                return;
            }
            Err(err) => logging::log_error(Component::Kiosk, "SIGTERM handler", &err),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => logging::log_shutdown(Component::Kiosk, "Received Ctrl+C signal"),
        Err(err) => logging::log_error(Component::Kiosk, "Signal handling", &err),
    }
}
