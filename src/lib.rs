//! toolharness - versioned tool registry and dispatch for computer-use agents
//!
//! An agent picks a tool version, gets a [`tools::ToolCollection`] holding
//! that version's tools, and routes every `tool_use` through it. Whatever a
//! tool does internally, the agent gets back one [`tools::ToolResult`].

pub mod cli;
pub mod config;
pub mod error;
pub mod id;
pub mod tools;

pub use config::Config;
pub use error::{HarnessError, Result};
pub use tools::{DEFAULT_VERSION, Tool, ToolCall, ToolCollection, ToolContext, ToolResult};
