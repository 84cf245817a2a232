//! Amazon Bedrock transport for Anthropic models.
//!
//! Authenticates with a Bedrock API key sent as a bearer token. The model ID
//! goes in the URL path, and the API version and beta flags travel in the
//! body. Prompt caching is not enabled on this backend.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ProviderError;
use deskpilot_core::provider::*;
use reqwest::header::HeaderMap;
use serde_json::json;

use crate::anthropic::{header_value, messages_body, parse_response};
use crate::http::HttpTransport;

const BEDROCK_VERSION: &str = "bedrock-2023-05-31";

pub struct BedrockProvider {
    base_url: String,
    api_key: String,
    transport: HttpTransport,
}

impl BedrockProvider {
    pub fn new(
        region: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: format!("https://bedrock-runtime.{region}.amazonaws.com"),
            api_key: api_key.into(),
            transport: HttpTransport::new(timeout, None, max_retries)?,
        })
    }

    /// Override the endpoint (e.g., a VPC endpoint or a test server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, model: &str) -> String {
        format!("{}/model/{model}/invoke", self.base_url)
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn send(&self, request: ProviderRequest) -> ApiExchange {
        let url = self.url(&request.model);
        let mut body = messages_body(&request);
        body["anthropic_version"] = json!(BEDROCK_VERSION);
        if !request.betas.is_empty() {
            body["anthropic_beta"] = json!(request.betas);
        }

        tracing::debug!(provider = "bedrock", model = %request.model, "Sending invoke request");

        let mut headers = HeaderMap::new();
        match header_value(&format!("Bearer {}", self.api_key)) {
            Ok(value) => {
                headers.insert("authorization", value);
                self.transport.post(&url, headers, body, parse_response).await
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server;
    use deskpilot_core::message::Message;

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "us.anthropic.claude-3-7-sonnet-20250219-v1:0".into(),
            system: SystemPrompt::new("sys"),
            messages: vec![Message::user("hi")],
            tools: vec![],
            max_tokens: 1024,
            temperature: 0.0,
            thinking_budget: None,
            betas: vec!["computer-use-2025-01-24".into()],
        }
    }

    #[test]
    fn regional_endpoint() {
        let provider = BedrockProvider::new("us-west-2", "key", Duration::from_secs(5), 0).unwrap();
        assert_eq!(
            provider.url("anthropic.claude-3-7-sonnet-20250219-v1:0"),
            "https://bedrock-runtime.us-west-2.amazonaws.com/model/anthropic.claude-3-7-sonnet-20250219-v1:0/invoke"
        );
        assert!(!provider.supports_prompt_caching());
    }

    #[tokio::test]
    async fn send_puts_version_and_betas_in_body() {
        let (base, captured) = test_server::serve(vec![(
            200,
            r#"{"id":"msg_1","model":"claude","content":[{"type":"text","text":"ok"}]}"#.into(),
        )])
        .await;

        let provider = BedrockProvider::new("us-east-1", "brk-key", Duration::from_secs(5), 0)
            .unwrap()
            .with_base_url(&base);
        let exchange = provider.send(request()).await;
        assert!(exchange.result.is_ok());
        assert!(exchange.request.body.get("model").is_none());
        assert_eq!(exchange.request.body["anthropic_version"], BEDROCK_VERSION);
        assert_eq!(exchange.request.body["anthropic_beta"][0], "computer-use-2025-01-24");

        let captured = captured.lock().unwrap();
        let head = captured[0].head.to_ascii_lowercase();
        assert!(head.starts_with("post /model/us.anthropic.claude-3-7-sonnet-20250219-v1:0/invoke"));
        assert!(head.contains("authorization: bearer brk-key"));
    }
}
