//! Bash tool: run shell commands for the model.
//!
//! Each command runs in a fresh `sh -c` with a timeout. `restart` is
//! accepted for compatibility with the provider-defined tool and only
//! reports the restart back.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{BuiltinToolSpec, Tool, ToolResult};

use crate::command::run_shell;
use crate::group::ToolRevision;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct BashTool {
    revision: ToolRevision,
    timeout: Duration,
}

impl BashTool {
    pub fn new(revision: ToolRevision) -> Self {
        Self {
            revision,
            timeout: COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Run commands in a bash shell and return stdout/stderr."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to run"
                },
                "restart": {
                    "type": "boolean",
                    "description": "Restart the shell session"
                }
            }
        })
    }

    fn builtin(&self) -> Option<BuiltinToolSpec> {
        Some(BuiltinToolSpec {
            tool_type: format!("bash_{}", self.revision.suffix()),
            options: serde_json::Map::new(),
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError> {
        if input["restart"].as_bool() == Some(true) {
            return Ok(ToolResult::default().with_system("tool has been restarted."));
        }

        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("no command provided.".into()))?;

        let output = run_shell("bash", command, self.timeout).await?;

        let stdout = output.stdout.trim_end_matches('\n');
        let stderr = output.stderr.trim_end_matches('\n');
        Ok(ToolResult {
            output: (!stdout.is_empty()).then(|| stdout.to_string()),
            error: (!stderr.is_empty()).then(|| stderr.to_string()),
            ..ToolResult::default()
        })
    }
}
