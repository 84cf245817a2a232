//! MCP gateway errors.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum McpError {
    #[error("Unsupported server script '{0}': must be a .py or .js file")]
    UnsupportedScript(String),

    #[error("Failed to start MCP server '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("MCP transport I/O error: {0}")]
    Io(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("MCP server returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("MCP request timed out: {method}")]
    Timeout { method: String },

    #[error("MCP connection closed")]
    ConnectionClosed,
}
