//! Web server run as a child process of the kiosk

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::config::WebServerCommand;
use crate::error::{KioskError, KioskResult};
use crate::services::process_launcher::ChildProcess;
use crate::traits::{BrowserProcess, LaunchSpec, WebServer};
use shared::{process_info, process_warn, Component};

/// Grace period after spawning before checking for an immediate exit
const SPAWN_CHECK_DELAY: Duration = Duration::from_millis(200);

/// Runs the configured web server command with `--port {port}` appended
pub struct CommandWebServer {
    command: WebServerCommand,
    port: u16,
    forward_output: bool,
    shutdown_timeout: Duration,
    child: Mutex<Option<ChildProcess>>,
}

impl CommandWebServer {
    pub fn new(command: WebServerCommand, port: u16) -> Self {
        Self {
            command,
            port,
            forward_output: false,
            shutdown_timeout: Duration::from_secs(10),
            child: Mutex::new(None),
        }
    }

    /// Forward the server's stdout/stderr (fluent API)
    pub fn with_forward_output(mut self, forward_output: bool) -> Self {
        self.forward_output = forward_output;
        self
    }

    /// Configure how long `stop` waits before force-killing (fluent API)
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn launch_spec(&self) -> LaunchSpec {
        let mut args = self.command.args.clone();
        args.push("--port".to_string());
        args.push(self.port.to_string());

        LaunchSpec {
            program: self.command.program.clone(),
            args,
            env: Vec::new(),
            working_dir: self.command.working_dir.clone(),
            forward_output: self.forward_output,
        }
    }
}

#[async_trait]
impl WebServer for CommandWebServer {
    async fn start(&self) -> KioskResult<()> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if !child.try_exited()? {
                process_info!(Component::WebServer, "Web server already running");
                return Ok(());
            }
        }

        let mut child = ChildProcess::spawn(&self.launch_spec(), "web server")
            .map_err(|e| KioskError::web_server(e.to_string()))?;

        tokio::time::sleep(SPAWN_CHECK_DELAY).await;
        if child.try_exited()? {
            *slot = None;
            return Err(KioskError::web_server(format!(
                "{} exited immediately",
                self.command.program.display()
            )));
        }

        process_info!(
            Component::WebServer,
            "🌍 Web server process started on port {} (PID: {})",
            self.port,
            child.pid().map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
        );
        *slot = Some(child);
        Ok(())
    }

    async fn stop(&self) -> KioskResult<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = child.terminate() {
            process_warn!(Component::WebServer, "⚠️ Graceful stop failed: {}", e);
        }
        if !child.wait_exit(self.shutdown_timeout).await {
            process_warn!(
                Component::WebServer,
                "⏱️ Web server did not exit within {:?}, killing",
                self.shutdown_timeout
            );
            child.kill().await?;
        }
        Ok(())
    }
}
