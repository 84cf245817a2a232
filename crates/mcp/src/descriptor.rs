//! How to start one remote tool server.

use std::collections::HashMap;
use std::path::Path;

use deskpilot_config::McpServerConfig;

use crate::error::McpError;

/// Command, arguments, and extra environment for a server process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl ServerDescriptor {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    /// Run a server script with the interpreter its extension implies.
    pub fn from_script(path: &str) -> Result<Self, McpError> {
        let command = match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some("py") => "python",
            Some("js") => "node",
            _ => return Err(McpError::UnsupportedScript(path.to_string())),
        };
        Ok(Self::new(command, vec![path.to_string()]))
    }

    pub fn from_config(config: &McpServerConfig) -> Result<Self, McpError> {
        match config {
            McpServerConfig::Command { command, args, env } => Ok(Self {
                command: command.clone(),
                args: args.clone(),
                env: env.clone(),
            }),
            McpServerConfig::Script { script } | McpServerConfig::Path(script) => {
                Self::from_script(script)
            }
        }
    }

    /// The command line, for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
