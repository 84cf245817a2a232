//! `deskpilot run`: headless multi-turn session.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use deskpilot_agent::{LoopConfig, LoopOutcome, SamplingLoop, SessionContext, StopReason};
use deskpilot_config::{ApiProvider, AppConfig, ExecMode, ToolVersion};
use deskpilot_core::event::EventBus;
use deskpilot_core::message::{Conversation, Message};

use super::events::spawn_event_log;
use super::terminal::TerminalCallbacks;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Send a single message instead of entering interactive mode
    #[arg(short, long)]
    pub message: Option<String>,

    /// Stop after this many user messages
    #[arg(long)]
    pub max_turns: Option<usize>,

    /// Stop calling the model once this many seconds have passed
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Append tool-call events to this file as JSON lines
    #[arg(long)]
    pub events_log: Option<PathBuf>,

    /// Task id attached to recorded events (defaults to the conversation id)
    #[arg(long)]
    pub task_id: Option<String>,

    /// Override the provider
    #[arg(long)]
    pub provider: Option<ApiProvider>,

    /// Override the model
    #[arg(long)]
    pub model: Option<String>,

    /// Override the tool-set version
    #[arg(long)]
    pub tool_version: Option<ToolVersion>,

    /// Override the exec mode (mixed, api, local)
    #[arg(long)]
    pub exec_mode: Option<ExecMode>,

    /// Override the response token limit
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Enable extended thinking with this token budget
    #[arg(long)]
    pub thinking_budget: Option<u32>,

    /// Keep only this many recent screenshots in the transcript
    #[arg(long)]
    pub only_n_most_recent_images: Option<usize>,

    /// Text appended to the system prompt
    #[arg(long)]
    pub system_prompt_suffix: Option<String>,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded config.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(provider) = self.provider {
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(version) = self.tool_version {
            config.tool_version = version;
        }
        if let Some(mode) = self.exec_mode {
            config.exec_mode = mode;
        }
        if let Some(max_tokens) = self.max_tokens {
            config.max_tokens = max_tokens;
        }
        if self.thinking_budget.is_some() {
            config.thinking_budget = self.thinking_budget;
        }
        if self.only_n_most_recent_images.is_some() {
            config.only_n_most_recent_images = self.only_n_most_recent_images;
        }
        if let Some(suffix) = &self.system_prompt_suffix {
            config.system_prompt_suffix = suffix.clone();
        }
    }
}

pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load().context("Failed to load config")?;
    args.apply(&mut config);

    if !config.has_credentials() {
        bail!(
            "No credential configured for provider '{}'. Set ANTHROPIC_API_KEY \
             (or AWS_BEARER_TOKEN_BEDROCK / VERTEX_ACCESS_TOKEN), or add it to {}",
            config.provider,
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    let provider = deskpilot_providers::build_from_config(&config).context("Failed to set up provider")?;
    let agent = SamplingLoop::new(provider, LoopConfig::from_app_config(&config));
    let mut conversation = Conversation::new();

    let bus = Arc::new(EventBus::default());
    let event_log = args
        .events_log
        .clone()
        .map(|path| spawn_event_log(bus.subscribe(), path));

    let mut session = SessionContext::new(Arc::new(TerminalCallbacks));
    if event_log.is_some() || args.task_id.is_some() {
        let task_id = args
            .task_id
            .clone()
            .unwrap_or_else(|| conversation.id.to_string());
        session = session.with_recorder(bus.clone(), task_id);
    }
    if let Some(secs) = args.timeout_secs {
        session = session.with_deadline(Instant::now() + Duration::from_secs(secs));
    }

    info!(
        provider = %config.provider,
        model = %config.model,
        tool_version = %config.tool_version,
        "Session started"
    );

    let result = match &args.message {
        Some(message) => one_shot(&agent, &session, &mut conversation, message).await,
        None => repl(&agent, &session, &mut conversation, args.max_turns).await,
    };

    // Closing the bus lets the log writer drain and finish.
    drop(session);
    drop(bus);
    if let Some(handle) = event_log {
        match handle.await {
            Ok(Ok(written)) => info!(events = written, "Event log written"),
            Ok(Err(e)) => warn!(error = %e, "Event log failed"),
            Err(e) => warn!(error = %e, "Event log task panicked"),
        }
    }

    result
}

async fn one_shot(
    agent: &SamplingLoop,
    session: &SessionContext,
    conversation: &mut Conversation,
    message: &str,
) -> anyhow::Result<()> {
    conversation.push(Message::user(message));
    let outcome = agent.run(conversation, session).await;
    match outcome.stop {
        StopReason::ProviderFailed(e) => Err(e).context("Model request failed"),
        StopReason::TimedOut => {
            eprintln!("\nSession timed out.");
            Ok(())
        }
        StopReason::Completed => Ok(()),
    }
}

async fn repl(
    agent: &SamplingLoop,
    session: &SessionContext,
    conversation: &mut Conversation,
    max_turns: Option<usize>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut turns = 0;

    while max_turns.is_none_or(|max| turns < max) {
        println!("{}", "-".repeat(30));
        print!("You: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!("\nExiting.");
            break;
        };
        let input = line.trim();
        if is_exit(input) {
            println!("Exiting.");
            break;
        }
        if input.is_empty() {
            continue;
        }

        conversation.push(Message::user(input));
        let outcome = agent.run(conversation, session).await;
        turns += 1;
        report(&outcome);
        if matches!(outcome.stop, StopReason::TimedOut) {
            break;
        }
    }
    Ok(())
}

fn is_exit(input: &str) -> bool {
    input.eq_ignore_ascii_case("quit") || input.eq_ignore_ascii_case("exit")
}

fn report(outcome: &LoopOutcome) {
    match &outcome.stop {
        StopReason::Completed => {}
        StopReason::TimedOut => eprintln!("\nSession timed out."),
        StopReason::ProviderFailed(e) => {
            eprintln!("\n[Error during agent loop]: {e}");
            eprintln!("You can try again or type 'quit' to exit.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_config_values() {
        let args = RunArgs {
            model: Some("claude-sonnet-4-20250514".into()),
            exec_mode: Some(ExecMode::Api),
            tool_version: Some(ToolVersion::ComputerOnly),
            only_n_most_recent_images: Some(3),
            ..RunArgs::default()
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.exec_mode, ExecMode::Api);
        assert_eq!(config.tool_version, ToolVersion::ComputerOnly);
        assert_eq!(config.image_retention(), Some((3, 3)));
    }

    #[test]
    fn unset_overrides_keep_config() {
        let mut config = AppConfig {
            thinking_budget: Some(2048),
            ..AppConfig::default()
        };
        RunArgs::default().apply(&mut config);
        assert_eq!(config.thinking_budget, Some(2048));
        assert_eq!(config.max_tokens, AppConfig::default().max_tokens);
    }

    #[test]
    fn exit_words() {
        assert!(is_exit("quit"));
        assert!(is_exit("EXIT"));
        assert!(!is_exit("exit now"));
    }
}
