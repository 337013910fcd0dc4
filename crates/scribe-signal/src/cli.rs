//! Fallback polling transport: `signal-cli -u <phone> receive -t
//! <timeout>` run once per poll tick (spec §4.7).

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::warn;

use crate::envelope::{parse_line, SignalEnvelope};
use crate::error::{Result, SignalError};

/// Run one `receive` invocation and return every envelope it printed.
pub async fn receive_once(cli_path: &str, phone: &str, receive_timeout: Duration) -> Result<Vec<SignalEnvelope>> {
    let output = Command::new(cli_path)
        .args(["-u", phone, "receive", "-t", &receive_timeout.as_secs().to_string(), "--json"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SignalError::Subprocess(e.to_string()))?;

    if !output.status.success() {
        warn!(
            phone,
            status = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "signal-cli receive exited non-zero"
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut envelopes = Vec::new();
    for line in stdout.lines() {
        if let Some(parsed) = parse_line(line) {
            if let Some(envelope) = parsed.envelope {
                envelopes.push(envelope);
            }
        }
    }
    Ok(envelopes)
}
