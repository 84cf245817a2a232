//! Shared fixtures for sampling-loop tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;

use deskpilot_agent::{LoopConfig, SessionCallbacks};
use deskpilot_config::AppConfig;
use deskpilot_core::error::{ProviderError, ToolError};
use deskpilot_core::message::ContentBlock;
use deskpilot_core::provider::{ApiExchange, ApiRequestRecord, Provider, ProviderRequest, ProviderResponse};
use deskpilot_core::tool::{Tool, ToolRegistry, ToolResult};
use deskpilot_mcp::McpConnection;

/// A provider that replays scripted turns and records every request.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Result<Vec<ContentBlock>, ProviderError>>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
    caching: bool,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Result<Vec<ContentBlock>, ProviderError>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            caching: false,
        }
    }

    pub fn with_caching(mut self) -> Self {
        self.caching = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn supports_prompt_caching(&self) -> bool {
        self.caching
    }

    async fn send(&self, request: ProviderRequest) -> ApiExchange {
        self.requests.lock().unwrap().push(request);
        let record = ApiRequestRecord {
            method: "POST".into(),
            url: "mock://v1/messages".into(),
            body: json!({}),
        };
        let next = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted provider ran out of turns");
        ApiExchange {
            request: record,
            response: None,
            result: next.map(|content| ProviderResponse {
                id: "msg_test".into(),
                model: "mock".into(),
                content,
                stop_reason: None,
                usage: None,
            }),
        }
    }
}

/// Everything the loop reported through its callbacks.
#[derive(Default)]
pub struct Recorded {
    pub blocks: Mutex<Vec<ContentBlock>>,
    pub tool_outputs: Mutex<Vec<(String, ToolResult)>>,
    pub api_calls: Mutex<Vec<Option<String>>>,
}

impl SessionCallbacks for Recorded {
    fn on_content(&self, block: &ContentBlock) {
        self.blocks.lock().unwrap().push(block.clone());
    }

    fn on_tool_output(&self, result: &ToolResult, tool_use_id: &str) {
        self.tool_outputs
            .lock()
            .unwrap()
            .push((tool_use_id.to_string(), result.clone()));
    }

    fn on_api_response(&self, exchange: &ApiExchange) {
        self.api_calls
            .lock()
            .unwrap()
            .push(exchange.error().map(|e| e.to_string()));
    }
}

/// Echoes its input as text.
pub struct Echo;

#[async_trait]
impl Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Echo the input back"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"text": {"type": "string"}}})
    }
    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::output(input["text"].as_str().unwrap_or_default()))
    }
}

/// Returns a fake screenshot tagged with a running counter.
#[derive(Default)]
pub struct Screenshot {
    taken: Mutex<usize>,
}

#[async_trait]
impl Tool for Screenshot {
    fn name(&self) -> &str {
        "screenshot"
    }
    fn description(&self) -> &str {
        "Capture the screen"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object"})
    }
    async fn execute(&self, _input: Value) -> Result<ToolResult, ToolError> {
        let mut taken = self.taken.lock().unwrap();
        *taken += 1;
        Ok(ToolResult::image(format!("shot-{taken}")))
    }
}

pub fn local_tools() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(Echo));
    registry.register(Box::new(Screenshot::default()));
    registry
}

pub fn config() -> LoopConfig {
    LoopConfig::from_app_config(&AppConfig::default())
}

pub fn tool_use(id: &str, name: &str, input: Value) -> ContentBlock {
    ContentBlock::tool_use(id, name, input)
}

/// An in-memory MCP server that owns `tools` and answers every call with
/// `"{name} ran remotely"`.
pub fn fake_mcp_server(tools: Vec<&'static str>) -> McpConnection {
    watched_mcp_server(tools).0
}

/// Like [`fake_mcp_server`], plus a receiver that resolves once the server
/// sees the client's stream end.
pub fn watched_mcp_server(tools: Vec<&'static str>) -> (McpConnection, oneshot::Receiver<()>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (hung_up, hung_up_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let msg: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = msg.get("id").cloned() else { continue };
            let result = match msg["method"].as_str().unwrap_or_default() {
                "initialize" => json!({"protocolVersion": "2024-11-05", "serverInfo": {"name": "fake"}}),
                "tools/list" => json!({
                    "tools": tools.iter().map(|t| json!({"name": t, "inputSchema": {"type": "object"}})).collect::<Vec<_>>()
                }),
                "tools/call" => json!({
                    "content": [{"type": "text", "text": format!("{} ran remotely", msg["params"]["name"].as_str().unwrap_or_default())}]
                }),
                _ => json!({}),
            };
            let mut out = serde_json::to_string(&json!({"jsonrpc": "2.0", "id": id, "result": result})).unwrap();
            out.push('\n');
            if write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
        let _ = hung_up.send(());
    });
    let (read, write) = tokio::io::split(client);
    (McpConnection::from_io("fake-mcp", read, write), hung_up_rx)
}

/// Wait until a watched server has been hung up on.
pub async fn assert_hung_up(hung_up: oneshot::Receiver<()>) {
    tokio::time::timeout(Duration::from_secs(5), hung_up)
        .await
        .expect("remote server was never disconnected")
        .expect("fake server task dropped its signal");
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
