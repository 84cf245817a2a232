//! Configuration loading, validation, and management for deskpilot.
//!
//! Loads configuration from `~/.deskpilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deskpilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// First-party API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Which backend serves the model
    #[serde(default)]
    pub provider: ApiProvider,

    /// Model ID
    #[serde(default = "default_model")]
    pub model: String,

    /// Max output tokens per response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Which local tool set to load
    #[serde(default)]
    pub tool_version: ToolVersion,

    /// Extended-thinking budget; unset disables thinking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,

    /// Request token-efficient tool encoding
    #[serde(default)]
    pub token_efficient_tools: bool,

    /// Keep only this many tool-result images in the transcript
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub only_n_most_recent_images: Option<usize>,

    /// Remove images in multiples of this many (defaults to the retention count)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_truncation_threshold: Option<usize>,

    /// Appended to the system prompt
    #[serde(default)]
    pub system_prompt_suffix: String,

    /// Which tool families are available
    #[serde(default)]
    pub exec_mode: ExecMode,

    /// Remote tool servers
    #[serde(default)]
    pub mcp_servers: Vec<McpServerConfig>,

    /// HTTP proxy for the first-party API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    /// Transport-level retries for the first-party API
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub bedrock: BedrockConfig,

    #[serde(default)]
    pub vertex: VertexConfig,

    #[serde(default)]
    pub display: DisplayConfig,
}

fn default_model() -> String {
    "claude-3-7-sonnet-20250219".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_retries() -> usize {
    4
}
fn default_request_timeout_secs() -> u64 {
    300
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("tool_version", &self.tool_version)
            .field("thinking_budget", &self.thinking_budget)
            .field("token_efficient_tools", &self.token_efficient_tools)
            .field("only_n_most_recent_images", &self.only_n_most_recent_images)
            .field("image_truncation_threshold", &self.image_truncation_threshold)
            .field("system_prompt_suffix", &self.system_prompt_suffix)
            .field("exec_mode", &self.exec_mode)
            .field("mcp_servers", &self.mcp_servers)
            .field("proxy", &self.proxy)
            .field("max_retries", &self.max_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("bedrock", &self.bedrock)
            .field("vertex", &self.vertex)
            .field("display", &self.display)
            .finish()
    }
}

/// The backend transport for the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    /// First-party API; the only backend with prompt caching enabled
    #[default]
    Anthropic,
    Bedrock,
    Vertex,
}

impl std::str::FromStr for ApiProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "bedrock" => Ok(Self::Bedrock),
            "vertex" => Ok(Self::Vertex),
            other => Err(ConfigError::ValidationError(format!("unknown provider '{other}'"))),
        }
    }
}

impl std::fmt::Display for ApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::Vertex => "vertex",
        };
        f.write_str(name)
    }
}

/// Named local tool sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolVersion {
    #[default]
    #[serde(rename = "computer_use_20250124")]
    ComputerUse20250124,
    #[serde(rename = "computer_use_20241022")]
    ComputerUse20241022,
    #[serde(rename = "computer_only")]
    ComputerOnly,
}

impl ToolVersion {
    pub const ALL: [ToolVersion; 3] = [
        Self::ComputerUse20250124,
        Self::ComputerUse20241022,
        Self::ComputerOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComputerUse20250124 => "computer_use_20250124",
            Self::ComputerUse20241022 => "computer_use_20241022",
            Self::ComputerOnly => "computer_only",
        }
    }
}

impl std::str::FromStr for ToolVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| ConfigError::ValidationError(format!("unknown tool version '{s}'")))
    }
}

impl std::fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tool families a session may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Local tools plus remote servers
    #[default]
    Mixed,
    /// Remote servers plus local tools that do not drive the screen
    Api,
    /// Local tools only; remote servers are not started
    Local,
}

impl ExecMode {
    pub fn uses_remote_tools(&self) -> bool {
        matches!(self, Self::Mixed | Self::Api)
    }

    pub fn allows_computer_tools(&self) -> bool {
        !matches!(self, Self::Api)
    }
}

impl std::str::FromStr for ExecMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mixed" => Ok(Self::Mixed),
            "api" => Ok(Self::Api),
            "local" => Ok(Self::Local),
            other => Err(ConfigError::ValidationError(format!("unknown exec mode '{other}'"))),
        }
    }
}

/// A remote tool server entry.
///
/// Either an explicit command, or the path of a `.py`/`.js` server script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Script {
        script: String,
    },
    Path(String),
}

impl McpServerConfig {
    /// The script path, for script-style entries.
    pub fn script_path(&self) -> Option<&str> {
        match self {
            Self::Script { script } | Self::Path(script) => Some(script),
            Self::Command { .. } => None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Bedrock API key (bearer token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for BedrockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("region", &self.region)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VertexConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// OAuth access token (e.g. from `gcloud auth print-access-token`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for VertexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexConfig")
            .field("project_id", &self.project_id)
            .field("region", &self.region)
            .field("access_token", &redact(&self.access_token))
            .finish()
    }
}

/// The X display the computer tool drives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_num: Option<u32>,
}

fn default_width() -> u32 {
    1024
}
fn default_height() -> u32 {
    768
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            display_num: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deskpilot/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Secrets from the environment only fill gaps left by the file; the
    /// provider and model selectors always win.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            self.api_key = lookup("DESKPILOT_API_KEY").or_else(|| lookup("ANTHROPIC_API_KEY"));
        }
        if let Some(provider) = lookup("DESKPILOT_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if let Some(model) = lookup("DESKPILOT_MODEL") {
            self.model = model;
        }

        if self.bedrock.api_key.is_none() {
            self.bedrock.api_key = lookup("AWS_BEARER_TOKEN_BEDROCK");
        }
        if self.bedrock.region.is_none() {
            self.bedrock.region = lookup("AWS_REGION");
        }

        if self.vertex.access_token.is_none() {
            self.vertex.access_token = lookup("VERTEX_ACCESS_TOKEN");
        }
        if self.vertex.project_id.is_none() {
            self.vertex.project_id = lookup("ANTHROPIC_VERTEX_PROJECT_ID");
        }
        if self.vertex.region.is_none() {
            self.vertex.region = lookup("CLOUD_ML_REGION");
        }

        if let Some(width) = lookup("WIDTH") {
            self.display.width = parse_env_number("WIDTH", &width)?;
        }
        if let Some(height) = lookup("HEIGHT") {
            self.display.height = parse_env_number("HEIGHT", &height)?;
        }
        if let Some(num) = lookup("DISPLAY_NUM") {
            self.display.display_num = Some(parse_env_number("DISPLAY_NUM", &num)?);
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deskpilot")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".into()));
        }

        if let Some(budget) = self.thinking_budget {
            if budget >= self.max_tokens {
                return Err(ConfigError::ValidationError(
                    "thinking_budget must be lower than max_tokens".into(),
                ));
            }
        }

        if self.image_truncation_threshold.is_some() && self.only_n_most_recent_images.is_none() {
            return Err(ConfigError::ValidationError(
                "image_truncation_threshold requires only_n_most_recent_images".into(),
            ));
        }

        for server in &self.mcp_servers {
            if let Some(script) = server.script_path() {
                if !(script.ends_with(".py") || script.ends_with(".js")) {
                    return Err(ConfigError::ValidationError(format!(
                        "MCP server script must be a .py or .js file: {script}"
                    )));
                }
            }
        }

        match self.provider {
            ApiProvider::Bedrock if self.bedrock.region.is_none() => Err(
                ConfigError::ValidationError("bedrock provider requires bedrock.region".into()),
            ),
            ApiProvider::Vertex if self.vertex.project_id.is_none() => Err(
                ConfigError::ValidationError("vertex provider requires vertex.project_id".into()),
            ),
            _ => Ok(()),
        }
    }

    /// The configured image retention target, with the removal chunk size.
    ///
    /// The chunk defaults to the retention count itself.
    pub fn image_retention(&self) -> Option<(usize, usize)> {
        let keep = self.only_n_most_recent_images.filter(|n| *n > 0)?;
        Some((keep, self.image_truncation_threshold.unwrap_or(keep)))
    }

    /// Check if a credential for the selected provider is available.
    pub fn has_credentials(&self) -> bool {
        match self.provider {
            ApiProvider::Anthropic => self.api_key.is_some(),
            ApiProvider::Bedrock => self.bedrock.api_key.is_some(),
            ApiProvider::Vertex => self.vertex.access_token.is_some(),
        }
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env_number(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} must be a number, got '{value}'")))
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: ApiProvider::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            tool_version: ToolVersion::default(),
            thinking_budget: None,
            token_efficient_tools: false,
            only_n_most_recent_images: None,
            image_truncation_threshold: None,
            system_prompt_suffix: String::new(),
            exec_mode: ExecMode::default(),
            mcp_servers: vec![],
            proxy: None,
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            bedrock: BedrockConfig::default(),
            vertex: VertexConfig::default(),
            display: DisplayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
