//! Computer tool: screen, keyboard, and mouse control on an X display.
//!
//! Drives `xdotool` for input and `scrot` for screenshots. Every action except
//! `cursor_position` returns a fresh screenshot so the model can see the
//! effect of what it did.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use deskpilot_config::DisplayConfig;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{BuiltinToolSpec, Tool, ToolResult};
use serde_json::Value;

use crate::command::run_shell;
use crate::group::ToolRevision;

const TOOL_NAME: &str = "computer";
const TYPING_DELAY_MS: u32 = 12;
const TYPING_CHUNK: usize = 50;
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Quote `s` for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

fn invalid(reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArguments(reason.into())
}

pub struct ComputerTool {
    revision: ToolRevision,
    width: u32,
    height: u32,
    display_num: Option<u32>,
    screenshot_delay: Duration,
}

impl ComputerTool {
    pub fn new(revision: ToolRevision, display: &DisplayConfig) -> Self {
        Self {
            revision,
            width: display.width,
            height: display.height,
            display_num: display.display_num,
            screenshot_delay: Duration::from_secs(2),
        }
    }

    fn display_prefix(&self) -> String {
        match self.display_num {
            Some(n) => format!("DISPLAY=:{n} "),
            None => String::new(),
        }
    }

    fn xdotool(&self, args: &str) -> String {
        format!("{}xdotool {args}", self.display_prefix())
    }

    fn coordinate(&self, input: &Value) -> Result<Option<(u32, u32)>, ToolError> {
        let Some(value) = input.get("coordinate").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let pair = value
            .as_array()
            .filter(|a| a.len() == 2)
            .ok_or_else(|| invalid(format!("{value} must be a tuple of length 2")))?;
        let (x, y) = match (pair[0].as_u64(), pair[1].as_u64()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(invalid(format!("{value} must be a tuple of non-negative ints"))),
        };
        if x > u64::from(self.width) || y > u64::from(self.height) {
            return Err(invalid(format!(
                "Coordinates {x}, {y} are out of bounds for a {}x{} display",
                self.width, self.height
            )));
        }
        Ok(Some((x as u32, y as u32)))
    }

    fn text(input: &Value) -> Option<&str> {
        input["text"].as_str()
    }

    fn duration(input: &Value) -> Result<f64, ToolError> {
        let duration = input["duration"]
            .as_f64()
            .ok_or_else(|| invalid("duration is required"))?;
        if !(0.0..=100.0).contains(&duration) {
            return Err(invalid("duration must be between 0 and 100 seconds"));
        }
        Ok(duration)
    }

    fn is_extended_action(action: &str) -> bool {
        matches!(
            action,
            "left_mouse_down" | "left_mouse_up" | "scroll" | "hold_key" | "wait" | "triple_click"
        )
    }

    /// Build the shell command for `action`. `None` means screenshot only.
    fn action_command(&self, action: &str, input: &Value) -> Result<Option<String>, ToolError> {
        if Self::is_extended_action(action) && self.revision == ToolRevision::V20241022 {
            return Err(invalid(format!("Invalid action: {action}")));
        }

        let coordinate = self.coordinate(input)?;
        let text = Self::text(input);

        let command = match action {
            "mouse_move" | "left_click_drag" => {
                if text.is_some() {
                    return Err(invalid(format!("text is not accepted for {action}")));
                }
                let (x, y) = coordinate.ok_or_else(|| invalid(format!("coordinate is required for {action}")))?;
                if action == "mouse_move" {
                    self.xdotool(&format!("mousemove --sync {x} {y}"))
                } else {
                    self.xdotool(&format!("mousedown 1 mousemove --sync {x} {y} mouseup 1"))
                }
            }
            "key" => {
                let keys = text.ok_or_else(|| invalid("text is required for key"))?;
                self.xdotool(&format!("key -- {keys}"))
            }
            "type" => {
                let text = text.ok_or_else(|| invalid("text is required for type"))?;
                let chars: Vec<char> = text.chars().collect();
                chars
                    .chunks(TYPING_CHUNK)
                    .map(|chunk| {
                        let chunk: String = chunk.iter().collect();
                        self.xdotool(&format!("type --delay {TYPING_DELAY_MS} -- {}", shell_quote(&chunk)))
                    })
                    .collect::<Vec<_>>()
                    .join(" && ")
            }
            "left_click" | "right_click" | "middle_click" | "double_click" | "triple_click" => {
                if text.is_some() && self.revision == ToolRevision::V20241022 {
                    return Err(invalid(format!("text is not accepted for {action}")));
                }
                let click = match action {
                    "left_click" => "click 1",
                    "right_click" => "click 3",
                    "middle_click" => "click 2",
                    "double_click" => "click --repeat 2 --delay 10 1",
                    _ => "click --repeat 3 --delay 10 1",
                };
                let mut args = Vec::new();
                if let Some((x, y)) = coordinate {
                    args.push(format!("mousemove --sync {x} {y}"));
                }
                match input["key"].as_str() {
                    Some(key) => {
                        args.push(format!("keydown {key}"));
                        args.push(click.to_string());
                        args.push(format!("keyup {key}"));
                    }
                    None => args.push(click.to_string()),
                }
                self.xdotool(&args.join(" "))
            }
            "left_mouse_down" => self.xdotool("mousedown 1"),
            "left_mouse_up" => self.xdotool("mouseup 1"),
            "scroll" => {
                let button = match input["scroll_direction"].as_str() {
                    Some("up") => 4,
                    Some("down") => 5,
                    Some("left") => 6,
                    Some("right") => 7,
                    _ => return Err(invalid("scroll_direction must be 'up', 'down', 'left', or 'right'")),
                };
                let amount = input["scroll_amount"]
                    .as_u64()
                    .ok_or_else(|| invalid("scroll_amount must be a non-negative int"))?;
                let mut args = Vec::new();
                if let Some((x, y)) = coordinate {
                    args.push(format!("mousemove --sync {x} {y}"));
                }
                let scroll = format!("click --repeat {amount} {button}");
                match text {
                    Some(modifier) => {
                        args.push(format!("keydown {modifier}"));
                        args.push(scroll);
                        args.push(format!("keyup {modifier}"));
                    }
                    None => args.push(scroll),
                }
                self.xdotool(&args.join(" "))
            }
            "hold_key" => {
                let key = text.ok_or_else(|| invalid("text is required for hold_key"))?;
                let duration = Self::duration(input)?;
                format!(
                    "{} && sleep {duration} && {}",
                    self.xdotool(&format!("keydown {key}")),
                    self.xdotool(&format!("keyup {key}"))
                )
            }
            "wait" => format!("sleep {}", Self::duration(input)?),
            "screenshot" => return Ok(None),
            other => return Err(invalid(format!("Invalid action: {other}"))),
        };

        Ok(Some(command))
    }

    async fn screenshot(&self) -> Result<String, ToolError> {
        let path = std::env::temp_dir().join(format!("screenshot_{}.png", uuid::Uuid::new_v4().simple()));
        let shot = run_shell(
            TOOL_NAME,
            &format!("{}scrot -p {}", self.display_prefix(), shell_quote(&path.to_string_lossy())),
            COMMAND_TIMEOUT,
        )
        .await?;

        let bytes = tokio::fs::read(&path).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: TOOL_NAME.into(),
            reason: format!("Failed to take screenshot: {e} {}", shot.stderr.trim()),
        })?;
        let _ = tokio::fs::remove_file(&path).await;

        Ok(BASE64.encode(bytes))
    }

    async fn cursor_position(&self) -> Result<ToolResult, ToolError> {
        let out = run_shell(TOOL_NAME, &self.xdotool("getmouselocation --shell"), COMMAND_TIMEOUT).await?;
        let field = |name: &str| {
            out.stdout
                .lines()
                .find_map(|l| l.strip_prefix(name))
                .map(str::trim)
                .unwrap_or("")
                .to_string()
        };
        if !out.success() {
            return Ok(ToolResult::error(out.stderr.trim()));
        }
        Ok(ToolResult::output(format!("X={},Y={}", field("X="), field("Y="))))
    }
}

#[async_trait]
impl Tool for ComputerTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Control the screen, keyboard, and mouse of the desktop."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": { "type": "string" },
                "text": { "type": "string" },
                "coordinate": { "type": "array", "items": { "type": "integer" } },
                "scroll_direction": { "type": "string", "enum": ["up", "down", "left", "right"] },
                "scroll_amount": { "type": "integer" },
                "duration": { "type": "number" },
                "key": { "type": "string" }
            },
            "required": ["action"]
        })
    }

    fn builtin(&self) -> Option<BuiltinToolSpec> {
        let mut options = serde_json::Map::new();
        options.insert("display_width_px".into(), self.width.into());
        options.insert("display_height_px".into(), self.height.into());
        if let Some(n) = self.display_num {
            options.insert("display_number".into(), n.into());
        }
        Some(BuiltinToolSpec {
            tool_type: format!("computer_{}", self.revision.suffix()),
            options,
        })
    }

    async fn execute(&self, input: Value) -> Result<ToolResult, ToolError> {
        let action = input["action"]
            .as_str()
            .ok_or_else(|| invalid("Missing 'action' argument"))?;

        if action == "cursor_position" {
            return self.cursor_position().await;
        }

        let Some(command) = self.action_command(action, &input)? else {
            return Ok(ToolResult::image(self.screenshot().await?));
        };

        let out = run_shell(TOOL_NAME, &command, COMMAND_TIMEOUT).await?;
        tokio::time::sleep(self.screenshot_delay).await;
        let image = self.screenshot().await?;

        let stdout = out.stdout.trim();
        let stderr = out.stderr.trim();
        Ok(ToolResult {
            output: (!stdout.is_empty()).then(|| stdout.to_string()),
            error: (!stderr.is_empty()).then(|| stderr.to_string()),
            base64_image: Some(image),
            system: None,
        })
    }
}
