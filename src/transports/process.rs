//! Local command execution through the system shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::trace;

use crate::error::ProtocolError;
use crate::transports::LocalShell;

/// Runs commands through `sh -c` (or `cmd /C` on Windows).
pub struct ProcessShell;

fn shell_invocation() -> (&'static str, &'static str) {
    if cfg!(target_os = "windows") {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

async fn spawn_shell(command: &str) -> Result<std::process::Output> {
    let (shell, flag) = shell_invocation();
    tokio::process::Command::new(shell)
        .arg(flag)
        .arg(command)
        .output()
        .await
        .context("Failed to spawn the system shell")
}

#[async_trait]
impl LocalShell for ProcessShell {
    async fn run(&self, command: &str) -> Result<String, ProtocolError> {
        trace!("Running local command through the system shell");

        // The command may carry substituted credentials; callers re-sanitize
        // the command text in any error they surface.
        let output = spawn_shell(command).await.map_err(|e| ProtocolError::CommandFailed {
            command: command.to_string(),
            output: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            return Err(ProtocolError::CommandFailed {
                command: command.to_string(),
                output: stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
