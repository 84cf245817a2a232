//! Tool groups: which local tools a tool-set version loads, and the beta flag
//! it needs.

use deskpilot_config::ToolVersion;

/// Revision of the provider-defined tool types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolRevision {
    V20241022,
    V20250124,
}

impl ToolRevision {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::V20241022 => "20241022",
            Self::V20250124 => "20250124",
        }
    }
}

/// Local tool families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Computer,
    Edit,
    Bash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolGroup {
    pub version: ToolVersion,
    pub revision: ToolRevision,
    pub beta_flag: Option<&'static str>,
    pub tools: &'static [ToolKind],
}

impl ToolGroup {
    pub fn for_version(version: ToolVersion) -> Self {
        match version {
            ToolVersion::ComputerUse20250124 => Self {
                version,
                revision: ToolRevision::V20250124,
                beta_flag: Some("computer-use-2025-01-24"),
                tools: &[ToolKind::Computer, ToolKind::Edit, ToolKind::Bash],
            },
            ToolVersion::ComputerUse20241022 => Self {
                version,
                revision: ToolRevision::V20241022,
                beta_flag: Some("computer-use-2024-10-22"),
                tools: &[ToolKind::Computer, ToolKind::Edit, ToolKind::Bash],
            },
            ToolVersion::ComputerOnly => Self {
                version,
                revision: ToolRevision::V20250124,
                beta_flag: Some("computer-use-2025-01-24"),
                tools: &[ToolKind::Computer],
            },
        }
    }

    /// Whether the group gives the model a shell.
    pub fn has_shell(&self) -> bool {
        self.tools.contains(&ToolKind::Bash)
    }
}
