//! Normalized tool outcomes
//!
//! Every tool invocation, whatever it did internally, ends up as one
//! `ToolResult`: either a success carrying ordered content blocks (text or
//! image) plus an optional system note, or an error with a kind.

use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block of result content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Base64-encoded image data
    Image { media_type: String, data: String },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn png(data: impl Into<String>) -> Self {
        Self::Image {
            media_type: "image/png".to_string(),
            data: data.into(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }

    fn to_api(&self) -> Value {
        match self {
            Self::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            Self::Image { media_type, data } => serde_json::json!({
                "type": "image",
                "source": { "type": "base64", "media_type": media_type, "data": data }
            }),
        }
    }
}

/// Why a call produced an error result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// No tool with the requested name in the collection
    ToolNotFound,
    /// The tool returned an error or panicked instead of producing a result
    ToolExecutionFailed,
    /// The per-call deadline elapsed
    Timeout,
    /// The tool rejected its input
    InvalidInput,
    /// The tool ran and reported a failure of its own
    ToolFailed,
}

impl fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ToolNotFound => "tool_not_found",
            Self::ToolExecutionFailed => "tool_execution_failed",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
            Self::ToolFailed => "tool_failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a single tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        content: Vec<ContentBlock>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    },
    Error {
        message: String,
        kind: ToolErrorKind,
    },
}

impl ToolResult {
    /// Success with a single text block
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success {
            content: vec![ContentBlock::text(text)],
            system: None,
        }
    }

    /// Success with a single base64 image block
    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::from_blocks(vec![ContentBlock::Image {
            media_type: media_type.into(),
            data: data.into(),
        }])
    }

    /// Success with no content
    pub fn empty() -> Self {
        Self::Success {
            content: Vec::new(),
            system: None,
        }
    }

    /// Success carrying the given blocks
    pub fn from_blocks(content: Vec<ContentBlock>) -> Self {
        Self::Success { content, system: None }
    }

    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            kind,
        }
    }

    /// Error reported by the tool itself
    pub fn failed(message: impl Into<String>) -> Self {
        Self::error(ToolErrorKind::ToolFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::error(ToolErrorKind::InvalidInput, message)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            Self::Success { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message, .. } => Some(message),
            Self::Success { .. } => None,
        }
    }

    /// Content blocks; empty for errors
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::Success { content, .. } => content,
            Self::Error { .. } => &[],
        }
    }

    pub fn system(&self) -> Option<&str> {
        match self {
            Self::Success { system, .. } => system.as_deref(),
            Self::Error { .. } => None,
        }
    }

    /// All text blocks joined by newlines, or the error message
    pub fn text(&self) -> String {
        match self {
            Self::Success { content, .. } => content
                .iter()
                .filter_map(ContentBlock::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Error { message, .. } => message.clone(),
        }
    }

    /// Concatenate two results; the first error encountered wins
    pub fn combine(self, other: ToolResult) -> ToolResult {
        match (self, other) {
            (err @ Self::Error { .. }, _) => err,
            (_, err @ Self::Error { .. }) => err,
            (
                Self::Success {
                    mut content,
                    system: left,
                },
                Self::Success {
                    content: more,
                    system: right,
                },
            ) => {
                content.extend(more);
                Self::Success {
                    content,
                    system: join_notes(left, right),
                }
            }
        }
    }

    /// Append blocks to a success; errors are returned unchanged
    pub fn append(self, blocks: impl IntoIterator<Item = ContentBlock>) -> ToolResult {
        match self {
            Self::Success { mut content, system } => {
                content.extend(blocks);
                Self::Success { content, system }
            }
            err @ Self::Error { .. } => {
                log::debug!("Dropped content append onto error result");
                err
            }
        }
    }

    /// Attach a system note to a success; errors are returned unchanged
    pub fn with_system(self, note: impl Into<String>) -> ToolResult {
        match self {
            Self::Success { content, system } => Self::Success {
                content,
                system: join_notes(system, Some(note.into())),
            },
            err @ Self::Error { .. } => {
                log::debug!("Dropped system note on error result");
                err
            }
        }
    }

    /// Replace the content of a success, keeping its system note
    pub fn replace_content(self, blocks: Vec<ContentBlock>) -> ToolResult {
        match self {
            Self::Success { system, .. } => Self::Success {
                content: blocks,
                system,
            },
            err @ Self::Error { .. } => {
                log::debug!("Dropped content replacement on error result");
                err
            }
        }
    }

    /// Render as a provider `tool_result` block
    pub fn to_api_block(&self, tool_use_id: &str) -> Value {
        let (content, is_error) = match self {
            Self::Success { content, system } => {
                let mut blocks: Vec<Value> = Vec::with_capacity(content.len() + 1);
                let mut prefix = system.as_ref().map(|s| format!("<system>{}</system>\n", s));
                for block in content {
                    match (block, prefix.take()) {
                        (ContentBlock::Text { text }, Some(p)) => {
                            blocks.push(serde_json::json!({ "type": "text", "text": format!("{}{}", p, text) }));
                        }
                        (block, p) => {
                            prefix = p;
                            blocks.push(block.to_api());
                        }
                    }
                }
                if let Some(p) = prefix {
                    blocks.insert(0, serde_json::json!({ "type": "text", "text": p.trim_end() }));
                }
                (blocks, false)
            }
            Self::Error { message, .. } => (vec![serde_json::json!({ "type": "text", "text": message })], true),
        };

        serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "is_error": is_error,
            "content": content,
        })
    }
}

impl Add for ToolResult {
    type Output = ToolResult;

    fn add(self, rhs: ToolResult) -> ToolResult {
        self.combine(rhs)
    }
}

fn join_notes(left: Option<String>, right: Option<String>) -> Option<String> {
    match (left, right) {
        (Some(l), Some(r)) => Some(format!("{}\n{}", l, r)),
        (l, r) => l.or(r),
    }
}
