//! File editor tool (`str_replace_editor`).
//!
//! Commands: `view`, `create`, `str_replace`, `insert`, `undo_edit`.
//! Paths must be absolute. Every write records the previous content so the
//! last edit to a file can be undone.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use deskpilot_core::error::ToolError;
use deskpilot_core::tool::{BuiltinToolSpec, Tool, ToolResult};

use crate::command::run_shell;
use crate::group::ToolRevision;

const TOOL_NAME: &str = "str_replace_editor";
const SNIPPET_LINES: usize = 4;

fn fail(reason: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: TOOL_NAME.into(),
        reason: reason.into(),
    }
}

fn required<'a>(input: &'a serde_json::Value, key: &str, command: &str) -> Result<&'a str, ToolError> {
    input[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Parameter `{key}` is required for command: {command}")))
}

/// Number lines the way `cat -n` does, starting at `first_line`.
fn numbered(content: &str, first_line: usize) -> String {
    content
        .split('\n')
        .enumerate()
        .map(|(i, line)| format!("{:6}\t{line}", i + first_line))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct EditTool {
    revision: ToolRevision,
    history: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl EditTool {
    pub fn new(revision: ToolRevision) -> Self {
        Self {
            revision,
            history: Mutex::new(HashMap::new()),
        }
    }

    fn push_history(&self, path: &Path, content: String) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.entry(path.to_path_buf()).or_default().push(content);
    }

    fn pop_history(&self, path: &Path) -> Option<String> {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.get_mut(path).and_then(Vec::pop)
    }

    fn validate_path(command: &str, path: &Path) -> Result<(), ToolError> {
        if !path.is_absolute() {
            return Err(fail(format!(
                "The path {} is not an absolute path, it should start with `/`.",
                path.display()
            )));
        }
        if command == "create" {
            if path.exists() {
                return Err(fail(format!(
                    "File already exists at: {}. Cannot overwrite files using command `create`.",
                    path.display()
                )));
            }
            return Ok(());
        }
        if !path.exists() {
            return Err(fail(format!(
                "The path {} does not exist. Please provide a valid path.",
                path.display()
            )));
        }
        if path.is_dir() && command != "view" {
            return Err(fail(format!(
                "The path {} is a directory and only the `view` command can be used on directories",
                path.display()
            )));
        }
        Ok(())
    }

    async fn read(path: &Path) -> Result<String, ToolError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| fail(format!("Ran into {e} while trying to read {}", path.display())))
    }

    async fn write(path: &Path, content: &str) -> Result<(), ToolError> {
        tokio::fs::write(path, content)
            .await
            .map_err(|e| fail(format!("Ran into {e} while trying to write to {}", path.display())))
    }

    async fn view(&self, path: &Path, range: Option<(i64, i64)>) -> Result<ToolResult, ToolError> {
        if path.is_dir() {
            if range.is_some() {
                return Err(fail("The `view_range` parameter is not allowed when `path` points to a directory."));
            }
            let listing = run_shell(
                TOOL_NAME,
                &format!("find '{}' -maxdepth 2 -not -path '*/\\.*'", path.display()),
                Duration::from_secs(30),
            )
            .await?;
            return Ok(ToolResult::output(format!(
                "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
                path.display(),
                listing.stdout
            )));
        }

        let content = Self::read(path).await?;
        let (shown, first_line) = match range {
            None => (content, 1),
            Some((start, end)) => {
                let lines: Vec<&str> = content.split('\n').collect();
                let total = lines.len() as i64;
                if start < 1 || start > total {
                    return Err(fail(format!(
                        "Invalid `view_range`: [{start}, {end}]. Its first element `{start}` should be within the range of lines of the file: [1, {total}]"
                    )));
                }
                if end != -1 && (end < start || end > total) {
                    return Err(fail(format!(
                        "Invalid `view_range`: [{start}, {end}]. Its second element `{end}` should be -1 or within [{start}, {total}]"
                    )));
                }
                let end = if end == -1 { total } else { end };
                (lines[(start - 1) as usize..end as usize].join("\n"), start as usize)
            }
        };

        Ok(ToolResult::output(format!(
            "Here's the result of running `cat -n` on {}:\n{}\n",
            path.display(),
            numbered(&shown, first_line)
        )))
    }

    async fn create(&self, path: &Path, text: &str) -> Result<ToolResult, ToolError> {
        Self::write(path, text).await?;
        self.push_history(path, text.to_string());
        Ok(ToolResult::output(format!("File created successfully at: {}", path.display())))
    }

    async fn str_replace(&self, path: &Path, old: &str, new: &str) -> Result<ToolResult, ToolError> {
        let content = Self::read(path).await?;

        let occurrences: Vec<usize> = content.match_indices(old).map(|(i, _)| i).collect();
        match occurrences.len() {
            0 => {
                return Err(fail(format!(
                    "No replacement was performed, old_str `{old}` did not appear verbatim in {}.",
                    path.display()
                )));
            }
            1 => {}
            _ => {
                let lines: Vec<String> = occurrences
                    .iter()
                    .map(|i| (content[..*i].matches('\n').count() + 1).to_string())
                    .collect();
                return Err(fail(format!(
                    "No replacement was performed. Multiple occurrences of old_str `{old}` in lines {}. Please ensure it is unique",
                    lines.join(", ")
                )));
            }
        }

        let replacement_line = content[..occurrences[0]].matches('\n').count();
        let updated = content.replacen(old, new, 1);
        Self::write(path, &updated).await?;
        self.push_history(path, content);

        let start = replacement_line.saturating_sub(SNIPPET_LINES);
        let end = replacement_line + SNIPPET_LINES + new.matches('\n').count();
        let snippet: Vec<&str> = updated.split('\n').skip(start).take(end - start + 1).collect();

        Ok(ToolResult::output(format!(
            "The file {} has been edited. Here's the result of running `cat -n` on a snippet of {}:\n{}\nReview the changes and make sure they are as expected. Edit the file again if necessary.",
            path.display(),
            path.display(),
            numbered(&snippet.join("\n"), start + 1)
        )))
    }

    async fn insert(&self, path: &Path, line: i64, text: &str) -> Result<ToolResult, ToolError> {
        let content = Self::read(path).await?;
        let mut lines: Vec<&str> = content.split('\n').collect();
        let total = lines.len() as i64;
        if line < 0 || line > total {
            return Err(fail(format!(
                "Invalid `insert_line` parameter: {line}. It should be within the range of lines of the file: [0, {total}]"
            )));
        }

        let at = line as usize;
        let inserted: Vec<&str> = text.split('\n').collect();
        let inserted_len = inserted.len();
        lines.splice(at..at, inserted);
        let updated = lines.join("\n");
        Self::write(path, &updated).await?;
        self.push_history(path, content);

        let start = at.saturating_sub(SNIPPET_LINES);
        let snippet: Vec<&str> = updated
            .split('\n')
            .skip(start)
            .take(at - start + inserted_len + SNIPPET_LINES)
            .collect();

        Ok(ToolResult::output(format!(
            "The file {} has been edited. Here's the result of running `cat -n` on a snippet of the edited file:\n{}\nReview the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.",
            path.display(),
            numbered(&snippet.join("\n"), start + 1)
        )))
    }

    async fn undo(&self, path: &Path) -> Result<ToolResult, ToolError> {
        let previous = self
            .pop_history(path)
            .ok_or_else(|| fail(format!("No edit history found for {}.", path.display())))?;
        Self::write(path, &previous).await?;
        Ok(ToolResult::output(format!(
            "Last edit to {} undone successfully. Here's the result of running `cat -n` on {}:\n{}\n",
            path.display(),
            path.display(),
            numbered(&previous, 1)
        )))
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "View, create, and edit files with exact string replacement and line inserts."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "enum": ["view", "create", "str_replace", "insert", "undo_edit"]
                },
                "path": { "type": "string", "description": "Absolute path to a file or directory" },
                "file_text": { "type": "string" },
                "view_range": { "type": "array", "items": { "type": "integer" } },
                "old_str": { "type": "string" },
                "new_str": { "type": "string" },
                "insert_line": { "type": "integer" }
            },
            "required": ["command", "path"]
        })
    }

    fn builtin(&self) -> Option<BuiltinToolSpec> {
        Some(BuiltinToolSpec {
            tool_type: format!("text_editor_{}", self.revision.suffix()),
            options: serde_json::Map::new(),
        })
    }

    async fn execute(&self, input: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let path = PathBuf::from(required(&input, "path", command)?);

        Self::validate_path(command, &path)?;

        match command {
            "view" => {
                let range = match input.get("view_range").filter(|v| !v.is_null()) {
                    None => None,
                    Some(value) => match value.as_array().map(|a| a.as_slice()) {
                        Some([start, end]) => match (start.as_i64(), end.as_i64()) {
                            (Some(start), Some(end)) => Some((start, end)),
                            _ => return Err(fail("Invalid `view_range`. It should be a list of two integers.")),
                        },
                        _ => return Err(fail("Invalid `view_range`. It should be a list of two integers.")),
                    },
                };
                self.view(&path, range).await
            }
            "create" => self.create(&path, required(&input, "file_text", command)?).await,
            "str_replace" => {
                let old = required(&input, "old_str", command)?;
                let new = input["new_str"].as_str().unwrap_or("");
                self.str_replace(&path, old, new).await
            }
            "insert" => {
                let line = input["insert_line"].as_i64().ok_or_else(|| {
                    ToolError::InvalidArguments("Parameter `insert_line` is required for command: insert".into())
                })?;
                self.insert(&path, line, required(&input, "new_str", command)?).await
            }
            "undo_edit" => self.undo(&path).await,
            other => Err(ToolError::InvalidArguments(format!(
                "Unrecognized command {other}. The allowed commands for the {TOOL_NAME} tool are: view, create, str_replace, insert, undo_edit"
            ))),
        }
    }
}
