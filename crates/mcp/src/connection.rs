//! One MCP server connection.
//!
//! Requests are written as newline-delimited JSON-RPC on the server's stdin.
//! A reader task consumes stdout and completes the pending request waiting
//! on each response id.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::descriptor::ServerDescriptor;
use crate::error::McpError;
use crate::protocol::*;

type ResponseWaiter = oneshot::Sender<JsonRpcResponse>;
type PendingMap = Arc<Mutex<HashMap<u64, ResponseWaiter>>>;
type Writer = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

pub struct McpConnection {
    name: String,
    writer: Writer,
    pending: PendingMap,
    next_id: AtomicU64,
    request_timeout: Duration,
    reader: JoinHandle<()>,
    child: Mutex<Option<Child>>,
    closed: AtomicBool,
}

impl McpConnection {
    /// Spawn the server process described by `descriptor` and wire up its stdio.
    pub fn spawn(descriptor: &ServerDescriptor) -> Result<Self, McpError> {
        let mut child = Command::new(&descriptor.command)
            .args(&descriptor.args)
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn {
                command: descriptor.display(),
                reason: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(McpError::Spawn {
                command: descriptor.display(),
                reason: "stdio was not captured".into(),
            });
        };

        if let Some(stderr) = child.stderr.take() {
            let server = descriptor.display();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %server, "{line}");
                }
            });
        }

        let mut connection = Self::from_io(descriptor.display(), stdout, stdin);
        connection.child = Mutex::new(Some(child));
        Ok(connection)
    }

    /// Build a connection over an arbitrary byte stream pair.
    pub fn from_io(
        name: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        let name = name.into();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let writer: Writer = Arc::new(Mutex::new(Box::new(writer)));

        let reader = tokio::spawn(Self::handle_messages(
            name.clone(),
            reader,
            pending.clone(),
            writer.clone(),
        ));

        Self {
            name,
            writer,
            pending,
            next_id: AtomicU64::new(1),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reader,
            child: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn handle_messages(
        name: String,
        reader: impl AsyncRead + Unpin,
        pending: PendingMap,
        writer: Writer,
    ) {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!(server = %name, error = %e, "MCP stdout read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match IncomingMessage::parse(&line) {
                Ok(IncomingMessage::Response(response)) => {
                    let Some(id) = response.id.as_u64() else {
                        warn!(server = %name, id = %response.id, "Response with non-numeric id");
                        continue;
                    };
                    match pending.lock().await.remove(&id) {
                        Some(waiter) => {
                            let _ = waiter.send(response);
                        }
                        None => warn!(server = %name, id, "Received response for unknown request ID"),
                    }
                }
                Ok(IncomingMessage::Notification { method }) => {
                    debug!(server = %name, method = %method, "Received MCP notification");
                }
                Ok(IncomingMessage::Request { id, method }) => {
                    let reply = if method == "ping" {
                        json!({"jsonrpc": JSONRPC_VERSION, "id": id, "result": {}})
                    } else {
                        json!({
                            "jsonrpc": JSONRPC_VERSION,
                            "id": id,
                            "error": {"code": -32601, "message": format!("Method not found: {method}")}
                        })
                    };
                    if let Err(e) = Self::write_line(&writer, &reply).await {
                        warn!(server = %name, error = %e, "Failed to answer server request");
                    }
                }
                Err(e) => {
                    debug!(server = %name, error = %e, "Ignoring unparseable MCP output");
                }
            }
        }

        // Dropping the waiters fails every in-flight request.
        pending.lock().await.clear();
        debug!(server = %name, "MCP reader finished");
    }

    async fn write_line(writer: &Writer, message: &Value) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message).map_err(|e| McpError::Protocol(e.to_string()))?;
        line.push('\n');
        let mut writer = writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| McpError::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| McpError::Io(e.to_string()))
    }

    /// Send a request and wait for its response.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, McpError> {
        if self.closed.load(Ordering::Acquire) || self.reader.is_finished() {
            return Err(McpError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = JsonRpcRequest::new(id, method, params);
        let message = serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;
        if let Err(e) = Self::write_line(&self.writer, &message).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(McpError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<(), McpError> {
        let message = serde_json::to_value(JsonRpcNotification::new(method))
            .map_err(|e| McpError::Protocol(e.to_string()))?;
        Self::write_line(&self.writer, &message).await
    }

    /// Perform the initialize handshake.
    pub async fn initialize(&self) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "deskpilot", "version": env!("CARGO_PKG_VERSION")},
        });
        let result: InitializeResult = self.request("initialize", Some(params)).await?.into_result()?;
        self.notify("notifications/initialized").await?;
        debug!(server = %self.name, protocol = %result.protocol_version, "MCP session initialized");
        Ok(result)
    }

    /// List every tool the server advertises, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let page: ToolsListResult = self.request("tools/list", params).await?.into_result()?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        debug!(server = %self.name, tool = name, "Calling MCP tool");
        self.request("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await?
            .into_result()
    }

    /// Stop the reader and terminate the server process.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.reader.abort();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(server = %self.name, error = %e, "MCP server already exited");
            }
        }
        self.pending.lock().await.clear();
        debug!(server = %self.name, "MCP connection closed");
    }
}
