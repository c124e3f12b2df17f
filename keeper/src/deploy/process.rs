//! Bounded external process execution

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::KeeperError;

/// Run a command to completion, killing it once `timeout` elapses.
///
/// A non-zero exit status is reported as [`KeeperError::ExternalActionFailed`]
/// together with the tail of its stderr.
pub async fn run_with_timeout(
    mut command: Command,
    action: &str,
    timeout: Duration,
) -> Result<(), KeeperError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .map_err(|e| KeeperError::ExternalActionFailed(format!("Failed to run {}: {}", action, e)))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| {
            KeeperError::ExternalActionFailed(format!("Failed to wait for {}: {}", action, e))
        })?,
        Err(_) => {
            warn!("{} timed out after {:?}, killed", action, timeout);
            return Err(KeeperError::ExternalActionFailed(format!(
                "{} timed out after {:?}",
                action, timeout
            )));
        }
    };

    debug!(
        "{} finished with {}: {}",
        action,
        output.status,
        String::from_utf8_lossy(&output.stdout).trim()
    );

    if !output.status.success() {
        return Err(KeeperError::ExternalActionFailed(format!(
            "{} failed ({}): {}",
            action,
            output.status,
            stderr_tail(&output.stderr)
        )));
    }

    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    const MAX_CHARS: usize = 512;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= MAX_CHARS {
        text.to_string()
    } else {
        text.chars().skip(count - MAX_CHARS).collect()
    }
}
