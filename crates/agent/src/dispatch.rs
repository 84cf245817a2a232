//! Tool-call routing between the local registry and remote servers.

use serde_json::Value;
use tracing::debug;

use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolDescriptor, ToolRegistry, ToolResult};
use deskpilot_mcp::RemoteToolGateway;

/// Routes a call to the local registry first, then to the remote gateway.
///
/// Local tools win name collisions: a remote tool sharing a local name is
/// neither published nor reachable.
pub struct ToolDispatcher {
    local: ToolRegistry,
    remote: RemoteToolGateway,
}

impl ToolDispatcher {
    pub fn new(local: ToolRegistry, remote: RemoteToolGateway) -> Self {
        Self { local, remote }
    }

    pub fn local_only(local: ToolRegistry) -> Self {
        Self::new(local, RemoteToolGateway::new())
    }

    pub fn local(&self) -> &ToolRegistry {
        &self.local
    }

    /// Descriptors to publish, local tools first.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors = self.local.descriptors();
        for remote in self.remote.list_tools() {
            if self.local.contains(&remote.name) {
                debug!(tool = %remote.name, "Remote tool shadowed by local tool");
                continue;
            }
            if descriptors.iter().any(|d| d.name == remote.name) {
                continue;
            }
            descriptors.push(remote);
        }
        descriptors
    }

    pub async fn dispatch(&self, name: &str, input: Value) -> Result<ToolResult, ToolError> {
        if self.local.contains(name) {
            return self.local.execute(name, input).await;
        }
        self.remote.call_tool(name, input).await
    }

    /// Release every remote connection.
    pub async fn close(&mut self) {
        self.remote.close().await;
    }
}
