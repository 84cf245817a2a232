//! # deskpilot-mcp
//!
//! Remote tools served by MCP servers. Each server is a subprocess speaking
//! JSON-RPC 2.0 over newline-delimited stdio.

pub mod connection;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod protocol;

pub use connection::McpConnection;
pub use descriptor::ServerDescriptor;
pub use error::McpError;
pub use gateway::RemoteToolGateway;
