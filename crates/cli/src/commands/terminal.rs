//! Terminal rendering of a session.

use deskpilot_agent::SessionCallbacks;
use deskpilot_core::message::ContentBlock;
use deskpilot_core::provider::ApiExchange;
use deskpilot_core::tool::ToolResult;

/// Prints assistant output and tool results to stdout, API errors to stderr.
pub struct TerminalCallbacks;

impl SessionCallbacks for TerminalCallbacks {
    fn on_content(&self, block: &ContentBlock) {
        if let Some(text) = render_block(block) {
            println!("\n{text}");
        }
    }

    fn on_tool_output(&self, result: &ToolResult, tool_use_id: &str) {
        println!("\n{}", render_tool_result(result, tool_use_id));
    }

    fn on_api_response(&self, exchange: &ApiExchange) {
        if let Some(error) = exchange.error() {
            eprintln!("\n[API Error]: {error}");
        }
        tracing::debug!(
            url = %exchange.request.url,
            status = exchange.response.as_ref().map(|r| r.status),
            "API exchange"
        );
    }
}

pub fn render_block(block: &ContentBlock) -> Option<String> {
    match block {
        ContentBlock::Text { text, .. } => Some(format!("Assistant: {text}")),
        ContentBlock::ToolUse { name, input, .. } => {
            Some(format!("Assistant wants to use Tool: {name}\nInput: {input}"))
        }
        ContentBlock::Thinking { thinking, .. } => Some(format!("Assistant [Thinking]:\n{thinking}\n")),
        ContentBlock::RedactedThinking { .. } => Some("Assistant [Thinking]: (redacted)".to_string()),
        ContentBlock::Image { .. } | ContentBlock::ToolResult(_) => None,
    }
}

pub fn render_tool_result(result: &ToolResult, tool_use_id: &str) -> String {
    let mut lines = vec![format!("[Tool Result for ID: {tool_use_id}]")];
    if let Some(system) = result.system.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("System: {system}"));
    }
    if let Some(output) = result.output_text() {
        lines.push(format!("Output: {output}"));
    }
    if let Some(error) = result.error_text() {
        lines.push(format!("Error: {error}"));
    }
    if result.base64_image.as_deref().is_some_and(|i| !i.is_empty()) {
        lines.push("[Screenshot captured (omitted in headless mode)]".to_string());
    }
    lines.join("\n")
}
