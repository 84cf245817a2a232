//! The sampling loop implementation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use deskpilot_config::{AppConfig, DisplayConfig, ExecMode, McpServerConfig, ToolVersion};
use deskpilot_core::error::ProviderError;
use deskpilot_core::message::{CacheControl, ContentBlock, Conversation, Message};
use deskpilot_core::provider::{Provider, ProviderRequest, SystemPrompt};
use deskpilot_core::tool::{ToolDescriptor, ToolResult};
use deskpilot_mcp::RemoteToolGateway;
use deskpilot_tools::ToolGroup;

use crate::context::{DEFAULT_CACHE_HINTS, place_cache_hints, prune_images};
use crate::dispatch::ToolDispatcher;
use crate::prompt::{PromptContext, system_prompt};
use crate::session::SessionContext;

pub const PROMPT_CACHING_BETA: &str = "prompt-caching-2024-07-31";
pub const TOKEN_EFFICIENT_TOOLS_BETA: &str = "token-efficient-tools-2025-02-19";

/// Generation and tool settings for one loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub max_tokens: u32,
    pub tool_version: ToolVersion,
    pub exec_mode: ExecMode,
    pub system_prompt_suffix: String,
    pub thinking_budget: Option<u32>,
    pub token_efficient_tools: bool,
    /// `(keep, chunk)` for screenshot pruning
    pub image_retention: Option<(usize, usize)>,
    pub mcp_servers: Vec<McpServerConfig>,
    pub display: DisplayConfig,
}

impl LoopConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            tool_version: config.tool_version,
            exec_mode: config.exec_mode,
            system_prompt_suffix: config.system_prompt_suffix.clone(),
            thinking_budget: config.thinking_budget,
            token_efficient_tools: config.token_efficient_tools,
            image_retention: config.image_retention(),
            mcp_servers: config.mcp_servers.clone(),
            display: config.display.clone(),
        }
    }
}

/// Why the loop returned.
#[derive(Debug)]
pub enum StopReason {
    /// The model answered without requesting a tool
    Completed,
    /// The timeout predicate fired before a provider call
    TimedOut,
    /// The provider call failed; the transcript holds every completed turn
    ProviderFailed(ProviderError),
}

#[derive(Debug)]
pub struct LoopOutcome {
    pub stop: StopReason,
    pub provider_calls: usize,
}

/// Drives the model until it stops asking for tools.
pub struct SamplingLoop {
    provider: Arc<dyn Provider>,
    config: LoopConfig,
    prompt_context: PromptContext,
}

impl SamplingLoop {
    pub fn new(provider: Arc<dyn Provider>, config: LoopConfig) -> Self {
        let prompt_context = PromptContext::current(config.display.display_num);
        Self {
            provider,
            config,
            prompt_context,
        }
    }

    /// Override the host facts embedded in the system prompt.
    pub fn with_prompt_context(mut self, ctx: PromptContext) -> Self {
        self.prompt_context = ctx;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn system_prompt(&self) -> String {
        system_prompt(
            &ToolGroup::for_version(self.config.tool_version),
            self.config.exec_mode,
            &self.config.system_prompt_suffix,
            &self.prompt_context,
        )
    }

    /// Load local tools and connect remote servers for one session.
    pub async fn build_dispatcher(&self) -> ToolDispatcher {
        let local = deskpilot_tools::registry_for(
            self.config.tool_version,
            self.config.exec_mode,
            &self.config.display,
        );
        let mut remote = RemoteToolGateway::new();
        if self.config.exec_mode.uses_remote_tools() && !self.config.mcp_servers.is_empty() {
            let connected = remote.connect_all(&self.config.mcp_servers).await;
            info!(
                connected,
                configured = self.config.mcp_servers.len(),
                "Remote tool servers ready"
            );
        }
        ToolDispatcher::new(local, remote)
    }

    /// Run with a dispatcher built from the loop's configuration.
    pub async fn run(&self, conversation: &mut Conversation, session: &SessionContext) -> LoopOutcome {
        let dispatcher = self.build_dispatcher().await;
        self.run_with_tools(conversation, session, dispatcher).await
    }

    /// Run with the given tools. Remote connections are closed on return,
    /// whatever the stop reason.
    pub async fn run_with_tools(
        &self,
        conversation: &mut Conversation,
        session: &SessionContext,
        mut dispatcher: ToolDispatcher,
    ) -> LoopOutcome {
        let outcome = self.drive(conversation, session, &dispatcher).await;
        dispatcher.close().await;
        info!(
            conversation_id = %conversation.id,
            stop = ?outcome.stop,
            provider_calls = outcome.provider_calls,
            "Sampling loop finished"
        );
        outcome
    }

    /// The beta flags for the next request.
    fn betas(&self, group: &ToolGroup, caching: bool) -> Vec<String> {
        let mut betas: Vec<String> = group.beta_flag.map(str::to_string).into_iter().collect();
        if self.config.token_efficient_tools {
            betas.push(TOKEN_EFFICIENT_TOOLS_BETA.to_string());
        }
        if caching {
            betas.push(PROMPT_CACHING_BETA.to_string());
        }
        betas
    }

    async fn drive(
        &self,
        conversation: &mut Conversation,
        session: &SessionContext,
        dispatcher: &ToolDispatcher,
    ) -> LoopOutcome {
        let group = ToolGroup::for_version(self.config.tool_version);
        let tools: Vec<ToolDescriptor> = dispatcher.descriptors();
        let system_text = self.system_prompt();
        let caching = self.provider.supports_prompt_caching();
        let mut provider_calls = 0;

        info!(
            conversation_id = %conversation.id,
            provider = self.provider.name(),
            model = %self.config.model,
            tools = tools.len(),
            caching,
            "Starting sampling loop"
        );

        loop {
            if session.timed_out() {
                info!(conversation_id = %conversation.id, "Timeout reached, stopping before next call");
                return LoopOutcome {
                    stop: StopReason::TimedOut,
                    provider_calls,
                };
            }

            let mut system = SystemPrompt::new(system_text.clone());
            // Image retention is off while caching.
            let retention = if caching {
                place_cache_hints(&mut conversation.messages, DEFAULT_CACHE_HINTS);
                system.cache_control = Some(CacheControl::Ephemeral);
                None
            } else {
                self.config.image_retention
            };
            if let Some((keep, chunk)) = retention {
                prune_images(&mut conversation.messages, keep, chunk);
            }

            let request = ProviderRequest {
                model: self.config.model.clone(),
                system,
                messages: conversation.messages.clone(),
                tools: tools.clone(),
                max_tokens: self.config.max_tokens,
                temperature: 0.0,
                thinking_budget: self.config.thinking_budget,
                betas: self.betas(&group, caching),
            };

            debug!(
                conversation_id = %conversation.id,
                turns = conversation.len(),
                call = provider_calls + 1,
                "Sending transcript"
            );
            let exchange = self.provider.send(request).await;
            provider_calls += 1;
            session.callbacks().on_api_response(&exchange);

            let response = match exchange.result {
                Ok(response) => response,
                Err(e) => {
                    warn!(conversation_id = %conversation.id, error = %e, "Provider call failed");
                    return LoopOutcome {
                        stop: StopReason::ProviderFailed(e),
                        provider_calls,
                    };
                }
            };
            if let Some(usage) = &response.usage {
                debug!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    cache_read = usage.cache_read_input_tokens.unwrap_or(0),
                    "Token usage"
                );
            }

            let blocks: Vec<ContentBlock> = response
                .content
                .into_iter()
                .filter(|block| !matches!(block, ContentBlock::Text { text, .. } if text.is_empty()))
                .collect();
            conversation.push(Message::assistant(blocks.clone()));

            let mut results = Vec::new();
            for block in &blocks {
                session.callbacks().on_content(block);
                let ContentBlock::ToolUse { id, name, input, .. } = block else {
                    continue;
                };

                session.record_tool_start(name, input);
                let result = match dispatcher.dispatch(name, input.clone()).await {
                    Ok(result) => result,
                    Err(e) => {
                        warn!(tool = %name, error = %e, "Tool call failed");
                        ToolResult::from(e)
                    }
                };
                session.record_tool_end(name, &result);

                results.push(result.to_block(id.as_str()));
                session.callbacks().on_tool_output(&result, id);
            }

            if results.is_empty() {
                return LoopOutcome {
                    stop: StopReason::Completed,
                    provider_calls,
                };
            }
            debug!(count = results.len(), "Appending tool results");
            conversation.push(Message::tool_results(results));
        }
    }
}
