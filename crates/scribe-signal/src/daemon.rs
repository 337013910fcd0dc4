//! `signal-cli daemon` lifecycle: autostart, readiness detection and
//! scoped termination (spec §4.7, §9 "scoped acquisition of a child
//! process with guaranteed termination on all exit paths of `stop()`").

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{Result, SignalError};

const LISTENING_MARKER: &str = "Listening on";

/// A running daemon subprocess, if this service spawned one. `None`
/// means the daemon was already running and we must never kill it
/// (spec §9 "if the process was not spawned by this service, do not
/// terminate it").
pub struct DaemonHandle {
    child: Option<Child>,
}

impl DaemonHandle {
    pub fn external() -> Self {
        Self { child: None }
    }

    pub fn owned(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// Terminate the subprocess if (and only if) we spawned it, unless
    /// `keep_daemon` is requested (spec §4.7).
    pub async fn stop(mut self, keep_daemon: bool) {
        let Some(mut child) = self.child.take() else { return };
        if keep_daemon {
            info!("leaving signal-cli daemon running (keep_daemon)");
            return;
        }
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "failed to signal signal-cli daemon to stop");
        }
        let _ = child.wait().await;
    }
}

/// Probe whether a daemon is already listening on `host:port`.
pub async fn is_daemon_running(host: &str, port: u16) -> bool {
    TcpStream::connect((host, port)).await.is_ok()
}

/// Spawn `signal-cli daemon` and block until its "Listening on" marker
/// appears on stdout, or `startup_timeout` elapses (spec scenario D).
pub async fn spawn_daemon(cli_path: &str, phone: &str, startup_timeout: Duration) -> Result<DaemonHandle> {
    let mut child = Command::new(cli_path)
        .args(["-u", phone, "daemon", "--tcp"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SignalError::Subprocess(e.to_string()))?;

    let stdout = child.stdout.take().ok_or_else(|| SignalError::Subprocess("daemon has no stdout".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();

    let wait_for_marker = async {
        while let Ok(Some(line)) = lines.next_line().await {
            if line.contains(LISTENING_MARKER) {
                return true;
            }
        }
        false
    };

    match timeout(startup_timeout, wait_for_marker).await {
        Ok(true) => Ok(DaemonHandle::owned(child)),
        Ok(false) => {
            let _ = child.start_kill();
            Err(SignalError::DaemonStartTimeout)
        }
        Err(_) => {
            let _ = child.start_kill();
            Err(SignalError::DaemonStartTimeout)
        }
    }
}
