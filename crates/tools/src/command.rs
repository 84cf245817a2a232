//! Subprocess helper shared by the local tools.

use std::time::Duration;

use deskpilot_core::error::ToolError;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of one shell command.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Run `command` through `sh -c`, killing it if it outlives `timeout`.
pub(crate) async fn run_shell(
    tool_name: &str,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, ToolError> {
    debug!(tool = tool_name, command = %command, "Executing shell command");

    let child = Command::new("sh")
        .args(["-c", command])
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| ToolError::Timeout {
            tool_name: tool_name.to_string(),
            timeout_secs: timeout.as_secs(),
        })?
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: tool_name.to_string(),
            reason: e.to_string(),
        })?;

    let result = CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        code: output.status.code(),
    };

    if !result.success() {
        warn!(tool = tool_name, command = %command, exit_code = ?result.code, "Command failed");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_both_streams() {
        let out = run_shell("test", "echo out; echo err >&2", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let err = run_shell("test", "sleep 5", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
