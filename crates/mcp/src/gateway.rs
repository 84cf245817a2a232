//! RemoteToolGateway: the set of MCP servers connected for one session.

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use deskpilot_config::McpServerConfig;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{ToolDescriptor, ToolResult};

use crate::connection::McpConnection;
use crate::descriptor::ServerDescriptor;
use crate::error::McpError;
use crate::protocol::{CallToolResult, McpTool};

/// Owns every remote tool-server connection of a session.
///
/// Tools are advertised in connection order. A call re-queries the servers
/// and goes to the first one that currently lists the tool.
#[derive(Default)]
pub struct RemoteToolGateway {
    connections: Vec<McpConnection>,
    advertised: Vec<McpTool>,
}

impl RemoteToolGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a server, handshake, and record its tools.
    pub async fn connect(&mut self, descriptor: &ServerDescriptor) -> Result<(), McpError> {
        let connection = McpConnection::spawn(descriptor)?;
        self.attach(connection).await
    }

    /// Handshake over an already-open connection and take ownership of it.
    pub async fn attach(&mut self, connection: McpConnection) -> Result<(), McpError> {
        let init = match connection.initialize().await {
            Ok(init) => init,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };
        let tools = match connection.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };

        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        info!(
            server = %connection.name(),
            remote = init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            tools = ?names,
            "Connected to MCP server"
        );

        self.advertised.extend(tools);
        self.connections.push(connection);
        Ok(())
    }

    /// Connect every configured server. Failures are logged and skipped.
    pub async fn connect_all(&mut self, servers: &[McpServerConfig]) -> usize {
        let mut connected = 0;
        for server in servers {
            let result = match ServerDescriptor::from_config(server) {
                Ok(descriptor) => self.connect(&descriptor).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => connected += 1,
                Err(e) => warn!(error = %e, "Skipping MCP server"),
            }
        }
        connected
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Descriptors for every tool advertised at connect time.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.advertised
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name.clone(),
                description: tool.description.clone().unwrap_or_default(),
                input_schema: tool.input_schema.clone(),
                builtin: None,
            })
            .collect()
    }

    /// Invoke `name` on whichever server owns it right now.
    pub async fn call_tool(&self, name: &str, input: Value) -> Result<ToolResult, ToolError> {
        if self.connections.is_empty() {
            return Err(ToolError::NoActiveConnection);
        }

        for connection in &self.connections {
            let tools = match connection.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %connection.name(), error = %e, "Could not list MCP tools");
                    continue;
                }
            };
            if !tools.iter().any(|t| t.name == name) {
                continue;
            }

            debug!(server = %connection.name(), tool = name, "Dispatching remote tool");
            let result = connection
                .call_tool(name, input)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: e.to_string(),
                })?;
            return into_tool_result(result);
        }

        Err(ToolError::UnknownTool(name.to_string()))
    }

    /// Close every connection.
    pub async fn close(&mut self) {
        if self.connections.is_empty() {
            return;
        }
        join_all(self.connections.iter().map(McpConnection::close)).await;
        info!(count = self.connections.len(), "Closed MCP connections");
        self.connections.clear();
        self.advertised.clear();
    }
}

/// Classify the first content item of a call result.
fn into_tool_result(result: CallToolResult) -> Result<ToolResult, ToolError> {
    let Some(first) = result.content.first() else {
        return Ok(ToolResult::default());
    };

    let kind = first.get("type").and_then(Value::as_str).unwrap_or("missing");
    let field = |key: &str| {
        first
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ToolError::UnsupportedResultType(format!("{kind} without {key}")))
    };

    match kind {
        "text" if result.is_error => Ok(ToolResult::error(field("text")?)),
        "text" => Ok(ToolResult::output(field("text")?)),
        "image" => {
            let data = field("data")?;
            if result.is_error {
                Ok(ToolResult::error("remote tool reported an error").with_image(data))
            } else {
                Ok(ToolResult::image(data))
            }
        }
        other => Err(ToolError::UnsupportedResultType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, duplex};

    /// A fake server that answers the handshake, lists `tools`, and replies to
    /// `tools/call` with `call_result`.
    fn fake_connection(name: &str, tools: Vec<&'static str>, call_result: Value) -> McpConnection {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let msg: Value = serde_json::from_str(&line).unwrap();
                let Some(id) = msg.get("id").cloned() else { continue };
                let result = match msg["method"].as_str().unwrap() {
                    "initialize" => json!({"protocolVersion": "2024-11-05"}),
                    "tools/list" => json!({
                        "tools": tools.iter().map(|t| json!({"name": t, "description": format!("{t} tool")})).collect::<Vec<_>>()
                    }),
                    "tools/call" => call_result.clone(),
                    _ => json!({}),
                };
                let mut out = serde_json::to_string(&json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap();
                out.push('\n');
                write.write_all(out.as_bytes()).await.unwrap();
            }
        });
        let (read, write) = tokio::io::split(client);
        McpConnection::from_io(name, read, write)
    }

    #[tokio::test]
    async fn empty_gateway_has_no_connection() {
        let gateway = RemoteToolGateway::new();
        let err = gateway.call_tool("anything", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::NoActiveConnection));
    }

    #[tokio::test]
    async fn routes_to_owning_server() {
        let mut gateway = RemoteToolGateway::new();
        gateway
            .attach(fake_connection("files", vec!["read_file"], json!({"content": [{"type": "text", "text": "from files"}]})))
            .await
            .unwrap();
        gateway
            .attach(fake_connection("web", vec!["fetch"], json!({"content": [{"type": "text", "text": "from web"}]})))
            .await
            .unwrap();

        let names: Vec<String> = gateway.list_tools().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["read_file", "fetch"]);

        let result = gateway.call_tool("fetch", json!({"url": "x"})).await.unwrap();
        assert_eq!(result.output.as_deref(), Some("from web"));

        let err = gateway.call_tool("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));

        gateway.close().await;
        assert!(gateway.is_empty());
    }

    #[tokio::test]
    async fn image_results_become_base64() {
        let mut gateway = RemoteToolGateway::new();
        gateway
            .attach(fake_connection(
                "shots",
                vec!["snap"],
                json!({"content": [{"type": "image", "data": "iVBORw0KGgo=", "mimeType": "image/png"}]}),
            ))
            .await
            .unwrap();
        let result = gateway.call_tool("snap", json!({})).await.unwrap();
        assert_eq!(result.base64_image.as_deref(), Some("iVBORw0KGgo="));
        assert!(result.output.is_none());
    }

    #[test]
    fn classifies_content() {
        let unsupported = CallToolResult {
            content: vec![json!({"type": "resource", "resource": {}})],
            is_error: false,
        };
        assert!(matches!(
            into_tool_result(unsupported),
            Err(ToolError::UnsupportedResultType(kind)) if kind == "resource"
        ));

        let failed = CallToolResult {
            content: vec![json!({"type": "text", "text": "no such file"})],
            is_error: true,
        };
        let result = into_tool_result(failed).unwrap();
        assert_eq!(result.error.as_deref(), Some("no such file"));

        let empty = CallToolResult {
            content: vec![],
            is_error: false,
        };
        assert_eq!(into_tool_result(empty).unwrap(), ToolResult::default());
    }
}
