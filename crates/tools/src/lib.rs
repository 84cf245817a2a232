//! Local tool implementations for deskpilot.
//!
//! Tools give the agent hands on the desktop: a `computer` tool for screen,
//! keyboard, and mouse, a `bash` tool, and the `str_replace_editor` file
//! editor. Which of them load depends on the tool-set version and the
//! execution mode.

pub mod bash;
mod command;
pub mod computer;
pub mod edit;
pub mod group;

use deskpilot_config::{DisplayConfig, ExecMode, ToolVersion};
use deskpilot_core::tool::{Tool, ToolRegistry};

pub use bash::BashTool;
pub use computer::ComputerTool;
pub use edit::EditTool;
pub use group::{ToolGroup, ToolKind, ToolRevision};

/// Build the local registry for one session.
///
/// In `api` mode every tool whose name contains "computer" is removed before
/// descriptors are published, so screen control can only happen through
/// remote tools.
pub fn registry_for(version: ToolVersion, exec_mode: ExecMode, display: &DisplayConfig) -> ToolRegistry {
    let group = ToolGroup::for_version(version);
    let mut registry = ToolRegistry::new();

    for kind in group.tools {
        let tool: Box<dyn Tool> = match kind {
            ToolKind::Computer => Box::new(ComputerTool::new(group.revision, display)),
            ToolKind::Edit => Box::new(EditTool::new(group.revision)),
            ToolKind::Bash => Box::new(BashTool::new(group.revision)),
        };
        registry.register(tool);
    }

    if !exec_mode.allows_computer_tools() {
        registry.retain(|name| !name.contains("computer"));
    }

    tracing::debug!(version = %version, mode = ?exec_mode, tools = ?registry.names(), "Local tools loaded");
    registry
}
