//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header, beta flags in `anthropic-beta`
//! - System prompt as a top-level block list, cacheable
//! - Native and provider-defined tools
//! - Extended thinking with signatures kept verbatim
//!
//! The body builder and response parser here are shared with the Bedrock and
//! Vertex transports, which speak the same Messages shape.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ProviderError;
use deskpilot_core::message::ContentBlock;
use deskpilot_core::provider::*;
use deskpilot_core::tool::ToolDescriptor;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;

use crate::http::HttpTransport;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_RETRIES: usize = 4;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    transport: HttpTransport,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with default transport settings.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_transport(
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            None,
            DEFAULT_MAX_RETRIES,
        )
    }

    /// Create with explicit timeout, optional proxy, and retry count.
    pub fn with_transport(
        api_key: impl Into<String>,
        timeout: Duration,
        proxy: Option<&str>,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            transport: HttpTransport::new(timeout, proxy, max_retries)?,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn headers(&self, betas: &[String]) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", header_value(&self.api_key)?);
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        if !betas.is_empty() {
            headers.insert("anthropic-beta", header_value(&betas.join(","))?);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_prompt_caching(&self) -> bool {
        true
    }

    async fn send(&self, request: ProviderRequest) -> ApiExchange {
        let url = format!("{}/v1/messages", self.base_url);
        let mut body = messages_body(&request);
        body["model"] = json!(request.model);

        tracing::debug!(provider = "anthropic", model = %request.model, "Sending messages request");

        match self.headers(&request.betas) {
            Ok(headers) => self.transport.post(&url, headers, body, parse_response).await,
            Err(e) => ApiExchange::failed(
                ApiRequestRecord {
                    method: "POST".into(),
                    url,
                    body,
                },
                e,
            ),
        }
    }
}

pub(crate) fn header_value(value: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(value)
        .map_err(|_| ProviderError::NotConfigured("credential contains invalid header characters".into()))
}

/// Build the Messages-API body shared by every transport.
///
/// Carries everything but the model and the beta flags, whose placement
/// differs per backend.
pub(crate) fn messages_body(request: &ProviderRequest) -> serde_json::Value {
    let mut system = json!({"type": "text", "text": request.system.text});
    if let Some(marker) = request.system.cache_control {
        system["cache_control"] = json!(marker);
    }

    let mut body = json!({
        "max_tokens": request.max_tokens,
        "messages": request.messages,
        "system": [system],
        "temperature": request.temperature,
    });

    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools.iter().map(to_api_tool).collect::<Vec<_>>());
    }

    if let Some(budget) = request.thinking_budget {
        body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
    }

    body
}

/// Convert a tool descriptor to Anthropic's tool format.
///
/// Provider-defined tools are sent as their type tag plus options, not a schema.
fn to_api_tool(tool: &ToolDescriptor) -> serde_json::Value {
    match &tool.builtin {
        Some(builtin) => {
            let mut value = json!({"type": builtin.tool_type, "name": tool.name});
            for (key, option) in &builtin.options {
                value[key] = option.clone();
            }
            value
        }
        None => json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        }),
    }
}

/// Parse a Messages-API response body.
///
/// Empty text blocks are dropped. A block with an unrecognized type fails the
/// whole response rather than being skipped.
pub(crate) fn parse_response(body: &str) -> Result<ProviderResponse, ProviderError> {
    let resp: AnthropicResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

    let content = resp
        .content
        .into_iter()
        .filter(|block| !matches!(block, ContentBlock::Text { text, .. } if text.is_empty()))
        .collect();

    Ok(ProviderResponse {
        id: resp.id,
        model: resp.model,
        content,
        stop_reason: resp.stop_reason,
        usage: resp.usage,
    })
}

// --- Anthropic API types ---

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    stop_reason: Option<String>,
}
