//! Provider trait: the abstraction over LLM backends.
//!
//! A Provider knows how to send a transcript to a model and get the next
//! assistant turn back. Every call yields an [`ApiExchange`] carrying the raw
//! request, the raw response (if one arrived), and the parsed outcome, so the
//! caller can report each attempt to its observer exactly once.
//!
//! Implementations: Anthropic first-party, Bedrock, Vertex.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::{CacheControl, ContentBlock, Message};
use crate::tool::ToolDescriptor;

/// The system instruction block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemPrompt {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl SystemPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cache_control: None,
        }
    }
}

/// One "send conversation, get next turn" request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-3-7-sonnet-20250219")
    pub model: String,

    /// The system instruction
    pub system: SystemPrompt,

    /// The transcript
    pub messages: Vec<Message>,

    /// Tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature; the loop always sends 0
    #[serde(default)]
    pub temperature: f32,

    /// Extended-thinking token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,

    /// Beta feature flags to enable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub betas: Vec<String>,
}

/// A parsed assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Provider message ID
    pub id: String,

    /// Which model actually responded
    pub model: String,

    /// Ordered response blocks
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub stop_reason: Option<String>,

    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u32>,
}

/// The HTTP request as it was sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequestRecord {
    pub method: String,
    pub url: String,
    pub body: serde_json::Value,
}

/// The HTTP response as it was received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponseRecord {
    pub status: u16,
    pub body: String,
}

/// Everything observable about one `send`.
#[derive(Debug, Clone)]
pub struct ApiExchange {
    pub request: ApiRequestRecord,

    /// The final raw response, absent when no response arrived
    pub response: Option<ApiResponseRecord>,

    pub result: Result<ProviderResponse, ProviderError>,
}

impl ApiExchange {
    /// An exchange that failed before any response arrived.
    pub fn failed(request: ApiRequestRecord, error: ProviderError) -> Self {
        Self {
            request,
            response: None,
            result: Err(error),
        }
    }

    pub fn error(&self) -> Option<&ProviderError> {
        self.result.as_ref().err()
    }
}

/// The core Provider trait.
///
/// Every backend implements this trait. The sampling loop calls `send()`
/// without knowing which transport is in use; only the capability flags
/// differ.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "bedrock").
    fn name(&self) -> &str;

    /// Whether the backend honours prefix-cache markers.
    fn supports_prompt_caching(&self) -> bool {
        false
    }

    /// Send a request. Retries, if any, happen inside and are not observable.
    async fn send(&self, request: ProviderRequest) -> ApiExchange;
}
