//! Provider selection from configuration.

use std::sync::Arc;
use std::time::Duration;

use deskpilot_config::{ApiProvider, AppConfig};
use deskpilot_core::error::ProviderError;
use deskpilot_core::provider::Provider;

use crate::anthropic::AnthropicProvider;
use crate::bedrock::BedrockProvider;
use crate::vertex::VertexProvider;

/// Build the provider selected by `config.provider`.
///
/// Fails with `NotConfigured` when the selected backend lacks a credential or
/// a required location setting.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let timeout = Duration::from_secs(config.request_timeout_secs);

    let provider: Arc<dyn Provider> = match config.provider {
        ApiProvider::Anthropic => {
            let api_key = config.api_key.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("set ANTHROPIC_API_KEY or api_key in config".into())
            })?;
            Arc::new(AnthropicProvider::with_transport(
                api_key,
                timeout,
                config.proxy.as_deref(),
                config.max_retries,
            )?)
        }
        ApiProvider::Bedrock => {
            let region = config.bedrock.region.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("set AWS_REGION or bedrock.region".into())
            })?;
            let api_key = config.bedrock.api_key.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("set AWS_BEARER_TOKEN_BEDROCK or bedrock.api_key".into())
            })?;
            Arc::new(BedrockProvider::new(region, api_key, timeout, config.max_retries)?)
        }
        ApiProvider::Vertex => {
            let project_id = config.vertex.project_id.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("set ANTHROPIC_VERTEX_PROJECT_ID or vertex.project_id".into())
            })?;
            let access_token = config.vertex.access_token.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("set VERTEX_ACCESS_TOKEN or vertex.access_token".into())
            })?;
            Arc::new(VertexProvider::new(
                project_id,
                config.vertex.region.as_deref(),
                access_token,
                timeout,
                config.max_retries,
            )?)
        }
    };

    tracing::info!(provider = provider.name(), model = %config.model, "Provider ready");
    Ok(provider)
}
