//! Tool system - the capability interface, version catalog, and dispatch
//!
//! Concrete tools (shell, editor, computer, inspectors, assertions, database)
//! implement [`Tool`]. A [`ToolGroup`] names the tools active for one schema
//! version, and a [`ToolCollection`] instantiates a group for one session and
//! routes calls to it.

mod assert_tool;
mod bash;
mod collection;
mod computer;
mod context;
mod db_query;
mod db_reporter;
mod edit;
mod groups;
mod inspect_js;
mod inspect_network;
mod report_store;
mod result;
mod schema;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

pub use assert_tool::AssertTool;
pub use bash::BashTool;
pub use collection::{TeardownFailure, TeardownReport, ToolCall, ToolCollection};
pub use computer::{ComputerAction, ComputerTool, ComputerVersion, MouseButton, ScrollDirection};
pub use context::{ToolContext, ToolError};
pub use db_query::DbQueryTool;
pub use db_reporter::DbReporterTool;
pub use edit::EditTool;
pub use groups::{DEFAULT_VERSION, TOOL_GROUPS, ToolFactory, ToolGroup, tool_group, versions};
pub use inspect_js::JavaScriptInspectorTool;
pub use inspect_network::NetworkInspectorTool;
pub use report_store::{ReportStore, RunSummary, TestReport, TestStatus};
pub use result::{ContentBlock, ToolErrorKind, ToolResult};
pub use schema::ToolInputSchema;

/// A capability the agent can call by name
///
/// Implementations translate their own failures into `ToolResult::Error`.
/// Returning `Err` (or panicking) is still survivable: the dispatcher turns
/// it into a `ToolExecutionFailed` result.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the model's tool_use name)
    fn name(&self) -> &'static str;

    /// Schema advertised to the model
    fn schema(&self) -> ToolInputSchema;

    /// Execute the tool
    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error>;

    /// Deadline for a single call, overriding the collection default
    fn call_timeout(&self) -> Option<Duration> {
        None
    }

    /// Release session state (processes, connections)
    async fn teardown(&self) -> Result<(), eyre::Error> {
        Ok(())
    }
}

/// Truncate long output on a char boundary
pub(crate) fn truncate_output(output: String, max_chars: usize) -> String {
    match output.char_indices().nth(max_chars) {
        Some((cut, _)) => format!(
            "{}...\n[truncated, {} chars total]",
            &output[..cut],
            output.chars().count()
        ),
        None => output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_output_unchanged() {
        assert_eq!(truncate_output("short".to_string(), 10), "short");
        assert_eq!(truncate_output("exactly10!".to_string(), 10), "exactly10!");
    }

    #[test]
    fn test_truncate_long_output() {
        let out = truncate_output("a".repeat(20), 5);
        assert!(out.starts_with("aaaaa..."));
        assert!(out.contains("20 chars total"));
    }

    #[test]
    fn test_truncate_multibyte_boundary() {
        let out = truncate_output("héllo wörld".to_string(), 2);
        assert!(out.starts_with("hé..."));
    }
}
