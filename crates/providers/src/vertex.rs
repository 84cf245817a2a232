//! Google Vertex AI transport for Anthropic models.
//!
//! Uses an OAuth access token as a bearer credential. The model ID goes in the
//! URL path; prompt caching is not enabled on this backend.

use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ProviderError;
use deskpilot_core::provider::*;
use reqwest::header::HeaderMap;
use serde_json::json;

use crate::anthropic::{header_value, messages_body, parse_response};
use crate::http::HttpTransport;

const VERTEX_VERSION: &str = "vertex-2023-10-16";
const DEFAULT_REGION: &str = "us-east5";

pub struct VertexProvider {
    base_url: String,
    project_id: String,
    region: String,
    access_token: String,
    transport: HttpTransport,
}

impl VertexProvider {
    pub fn new(
        project_id: impl Into<String>,
        region: Option<&str>,
        access_token: impl Into<String>,
        timeout: Duration,
        max_retries: usize,
    ) -> Result<Self, ProviderError> {
        let region = region.unwrap_or(DEFAULT_REGION).to_string();
        Ok(Self {
            base_url: format!("https://{region}-aiplatform.googleapis.com"),
            project_id: project_id.into(),
            region,
            access_token: access_token.into(),
            transport: HttpTransport::new(timeout, None, max_retries)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, model: &str) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/anthropic/models/{model}:rawPredict",
            self.base_url, self.project_id, self.region
        )
    }

    fn headers(&self, betas: &[String]) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", header_value(&format!("Bearer {}", self.access_token))?);
        if !betas.is_empty() {
            headers.insert("anthropic-beta", header_value(&betas.join(","))?);
        }
        Ok(headers)
    }
}

#[async_trait]
impl Provider for VertexProvider {
    fn name(&self) -> &str {
        "vertex"
    }

    async fn send(&self, request: ProviderRequest) -> ApiExchange {
        let url = self.url(&request.model);
        let mut body = messages_body(&request);
        body["anthropic_version"] = json!(VERTEX_VERSION);

        tracing::debug!(provider = "vertex", model = %request.model, "Sending rawPredict request");

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
