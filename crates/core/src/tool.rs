//! Tool trait: the abstraction over agent capabilities.
//!
//! A tool is an opaque capability identified by name and input schema. The
//! local [`ToolRegistry`] holds the capabilities that run in-process; remote
//! ones are reached through the MCP gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::message::{ImageSource, ToolResultBlock, ToolResultContent};

/// Provider-defined tool type published in place of a JSON schema
/// (e.g. `computer_20250124` with its display dimensions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltinToolSpec {
    /// The provider's tool type tag
    #[serde(rename = "type")]
    pub tool_type: String,

    /// Extra fields sent alongside the type tag
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// A tool description published to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name, unique across local and remote registries
    pub name: String,

    /// Description of what the tool does
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the tool's input
    #[serde(default)]
    pub input_schema: serde_json::Value,

    /// Set for provider-defined tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<BuiltinToolSpec>,
}

/// The outcome of executing a capability.
///
/// `error` and `output` are mutually exclusive in well-formed results; when
/// both are set, `error` wins on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// PNG, base64-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,

    /// Annotation prepended to the text as `<system>…</system>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl ToolResult {
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::default()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn image(base64_image: impl Into<String>) -> Self {
        Self {
            base64_image: Some(base64_image.into()),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.base64_image = Some(base64_image.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// The error text, treating an empty string as no error.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }

    /// The output text, treating an empty string as no output.
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_deref().filter(|o| !o.is_empty())
    }

    pub fn is_error(&self) -> bool {
        self.error_text().is_some()
    }

    fn annotate(&self, text: &str) -> String {
        match self.system.as_deref().filter(|s| !s.is_empty()) {
            Some(system) => format!("<system>{system}</system>\n{text}"),
            None => text.to_string(),
        }
    }

    /// Translate into the `tool_result` block answering `tool_use_id`.
    pub fn to_block(&self, tool_use_id: impl Into<String>) -> ToolResultBlock {
        let mut content = Vec::new();
        let is_error = self.is_error();

        if let Some(error) = self.error_text() {
            content.push(ToolResultContent::Text {
                text: self.annotate(error),
            });
        } else {
            if let Some(output) = self.output_text() {
                content.push(ToolResultContent::Text {
                    text: self.annotate(output),
                });
            }
            if let Some(image) = self.base64_image.as_deref().filter(|i| !i.is_empty()) {
                content.push(ToolResultContent::Image {
                    source: ImageSource::png(image),
                });
            }
        }

        ToolResultBlock {
            tool_use_id: tool_use_id.into(),
            content,
            is_error,
            cache_control: None,
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        Self::error(err.to_string())
    }
}

/// The core Tool trait.
///
/// Each local capability (computer, bash, str_replace_editor) implements this
/// trait and is registered in a [`ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "computer", "bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> serde_json::Value;

    /// Provider-defined type, for tools the model knows natively.
    fn builtin(&self) -> Option<BuiltinToolSpec> {
        None
    }

    /// Execute the tool with the given input.
    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into the descriptor published to the model.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            builtin: self.builtin(),
        }
    }
}

/// The registry of in-process tools for one session.
///
/// Registration order is preserved so descriptors are published
/// deterministically.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Keep only the tools whose name satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.tools.retain(|t| keep(t.name()));
    }

    /// Get all tool descriptors (for sending to the LLM).
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(input).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError> {
            let text = input["text"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments("missing text".into()))?;
            Ok(ToolResult::output(text))
        }
    }

    struct ComputerStub;

    #[async_trait]
    impl Tool for ComputerStub {
        fn name(&self) -> &str { "computer" }
        fn description(&self) -> &str { "" }
        fn input_schema(&self) -> serde_json::Value { serde_json::json!({}) }
        async fn execute(&self, _input: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::image("iVBOR"))
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        assert!(registry.contains("echo"));
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_preserves_order_and_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ComputerStub));
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(ComputerStub));
        assert_eq!(registry.names(), vec!["computer", "echo"]);
    }

    #[test]
    fn registry_retain_filters_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ComputerStub));
        registry.register(Box::new(EchoTool));
        registry.retain(|name| !name.contains("computer"));
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let result = registry
            .execute("echo", serde_json::json!({"text": "hello world"}))
            .await
            .unwrap();
        assert_eq!(result.output.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("nonexistent", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn error_takes_precedence_on_the_wire() {
        let result = ToolResult {
            output: Some("partial".into()),
            error: Some("boom".into()),
            base64_image: Some("AAAA".into()),
            system: None,
        };
        let block = result.to_block("toolu_9");
        assert!(block.is_error);
        assert_eq!(block.content, vec![ToolResultContent::Text { text: "boom".into() }]);
    }

    #[test]
    fn output_then_image_with_system_prefix() {
        let result = ToolResult::output("done")
            .with_image("AAAA")
            .with_system("tool was restarted");
        let block = result.to_block("toolu_1");
        assert!(!block.is_error);
        assert_eq!(block.content.len(), 2);
        assert_eq!(
            block.content[0],
            ToolResultContent::Text {
                text: "<system>tool was restarted</system>\ndone".into()
            }
        );
        assert!(block.content[1].is_image());
    }

    #[test]
    fn empty_result_has_no_content() {
        let block = ToolResult::default().to_block("toolu_2");
        assert!(block.content.is_empty());
        assert!(!block.is_error);
    }

    #[test]
    fn builtin_descriptor_serialization() {
        let mut options = serde_json::Map::new();
        options.insert("display_width_px".into(), serde_json::json!(1024));
        let descriptor = ToolDescriptor {
            name: "computer".into(),
            description: String::new(),
            input_schema: serde_json::Value::Null,
            builtin: Some(BuiltinToolSpec {
                tool_type: "computer_20250124".into(),
                options,
            }),
        };
        let value = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(value["builtin"]["type"], "computer_20250124");
        assert_eq!(value["builtin"]["display_width_px"], 1024);
    }
}
