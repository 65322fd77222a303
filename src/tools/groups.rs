//! Version catalog
//!
//! Each supported tool-schema version maps to a frozen, ordered list of tool
//! factories. The table is a process-wide constant; sessions pick one group
//! and instantiate it into a `ToolCollection`.

use std::fmt;
use std::sync::Arc;

use crate::error::{HarnessError, Result};

use super::context::ToolContext;
use super::{
    AssertTool, BashTool, ComputerTool, DbQueryTool, DbReporterTool, EditTool, JavaScriptInspectorTool,
    NetworkInspectorTool, Tool,
};

/// Builds one tool instance for a session
pub type ToolFactory = fn(&ToolContext) -> Arc<dyn Tool>;

/// An immutable, versioned bundle of tools
pub struct ToolGroup {
    pub version: &'static str,
    /// Advertisement order
    pub tools: &'static [ToolFactory],
    /// Beta flag to send upstream with requests using this group
    pub beta_flag: Option<&'static str>,
}

pub const DEFAULT_VERSION: &str = "computer_use_20250124";

/// Every supported tool version, keyed uniquely by `version`
pub static TOOL_GROUPS: &[ToolGroup] = &[
    ToolGroup {
        version: "computer_use_20241022",
        tools: &[ComputerTool::v20241022, EditTool::v20241022, BashTool::v20241022],
        beta_flag: Some("computer-use-2024-10-22"),
    },
    ToolGroup {
        version: "computer_use_20250124",
        tools: &[ComputerTool::v20250124, EditTool::v20250124, BashTool::v20250124],
        beta_flag: Some("computer-use-2025-01-24"),
    },
    ToolGroup {
        version: "computer_use_20250429",
        tools: &[ComputerTool::v20250124, EditTool::v20250429, BashTool::v20250124],
        beta_flag: Some("computer-use-2025-01-24"),
    },
    ToolGroup {
        version: "qa_20250429",
        tools: &[
            ComputerTool::v20250124,
            EditTool::v20250429,
            BashTool::v20250124,
            JavaScriptInspectorTool::factory,
            NetworkInspectorTool::factory,
            AssertTool::factory,
            DbReporterTool::factory,
            DbQueryTool::factory,
        ],
        beta_flag: Some("computer-use-2025-01-24"),
    },
];

/// Look up a group by version identifier
pub fn tool_group(version: &str) -> Result<&'static ToolGroup> {
    TOOL_GROUPS
        .iter()
        .find(|g| g.version == version)
        .ok_or_else(|| HarnessError::UnknownVersion {
            version: version.to_string(),
            known: versions().collect::<Vec<_>>().join(", "),
        })
}

/// Version identifiers in catalog order
pub fn versions() -> impl Iterator<Item = &'static str> {
    TOOL_GROUPS.iter().map(|g| g.version)
}

impl fmt::Debug for ToolGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolGroup")
            .field("version", &self.version)
            .field("tools", &self.tools.len())
            .field("beta_flag", &self.beta_flag)
            .finish()
    }
}

impl ToolGroup {
    /// Instantiate every tool in order
    pub fn instantiate(&self, ctx: &ToolContext) -> Vec<Arc<dyn Tool>> {
        self.tools.iter().map(|factory| factory(ctx)).collect()
    }
}
