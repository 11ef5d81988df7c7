//! Child process stdout/stderr handling
//!
//! Output is either inherited from the kiosk process or piped and drained in
//! the background so a chatty child never blocks on a full pipe.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

use shared::{process_debug, Component};

/// Configure stdio for a child process
pub fn configure_child_stdio(cmd: &mut Command, forward_output: bool, process_name: &str) {
    cmd.stdin(Stdio::null());

    if forward_output {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        process_debug!(
            Component::Kiosk,
            "🔗 {} output will be forwarded to parent stdout/stderr",
            process_name
        );
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        process_debug!(Component::Kiosk, "🔇 {} output will be discarded", process_name);
    }
}

/// Drain any piped output of `child` until the pipes close
pub fn spawn_output_consumers(child: &mut Child, process_name: &str) {
    if let Some(stdout) = child.stdout.take() {
        let name = process_name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(process = %name, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let name = process_name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::trace!(process = %name, stream = "stderr", "{}", line);
            }
        });
    }
}
