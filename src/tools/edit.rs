//! File editing tool - view, create, str_replace, insert, undo_edit

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::context::{ToolContext, ToolError};
use super::{Tool, ToolInputSchema, ToolResult, truncate_output};

const SNIPPET_LINES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EditVersion {
    V20241022,
    V20250124,
    V20250429,
}

impl EditVersion {
    fn api_type(self) -> &'static str {
        match self {
            Self::V20241022 => "text_editor_20241022",
            Self::V20250124 => "text_editor_20250124",
            Self::V20250429 => "text_editor_20250429",
        }
    }

    fn tool_name(self) -> &'static str {
        match self {
            Self::V20241022 | Self::V20250124 => "str_replace_editor",
            Self::V20250429 => "str_replace_based_edit_tool",
        }
    }

    fn commands(self) -> &'static [&'static str] {
        match self {
            Self::V20241022 | Self::V20250124 => &["view", "create", "str_replace", "insert", "undo_edit"],
            Self::V20250429 => &["view", "create", "str_replace", "insert"],
        }
    }
}

/// Filesystem editor with per-file undo history
pub struct EditTool {
    version: EditVersion,
    ctx: ToolContext,
    history: Mutex<HashMap<PathBuf, Vec<String>>>,
}

impl EditTool {
    fn new(version: EditVersion, ctx: &ToolContext) -> Self {
        Self {
            version,
            ctx: ctx.clone(),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn v20241022(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(EditVersion::V20241022, ctx))
    }

    pub fn v20250124(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(EditVersion::V20250124, ctx))
    }

    pub fn v20250429(ctx: &ToolContext) -> Arc<dyn Tool> {
        Arc::new(Self::new(EditVersion::V20250429, ctx))
    }

    /// Check the path is absolute, allowed, and consistent with the command
    fn validate_path(&self, command: &str, path: &Path) -> Result<PathBuf, ToolError> {
        if !path.is_absolute() {
            return Err(ToolError::NotAbsolute(path.to_path_buf()));
        }
        let path = self.ctx.validate_path(path)?;

        if !path.exists() && command != "create" {
            return Err(ToolError::FileNotFound(path));
        }
        if path.exists() && command == "create" {
            return Err(ToolError::InvalidInput(format!(
                "File already exists at: {}. Cannot overwrite files using command `create`.",
                path.display()
            )));
        }
        if path.is_dir() && command != "view" {
            return Err(ToolError::InvalidInput(format!(
                "The path {} is a directory and only the `view` command can be used on directories",
                path.display()
            )));
        }
        Ok(path)
    }

    async fn view(&self, path: &Path, view_range: Option<&Value>) -> Result<ToolResult, ToolError> {
        if path.is_dir() {
            if view_range.is_some() {
                return Err(ToolError::InvalidInput(
                    "The `view_range` parameter is not allowed when `path` points to a directory.".to_string(),
                ));
            }
            return self.view_dir(path);
        }

        let content = read_file(path).await?;
        let lines: Vec<&str> = content.lines().collect();
        let (start, end) = match view_range {
            None => (1, lines.len()),
            Some(range) => parse_view_range(range, lines.len())?,
        };

        let selected = lines
            .get(start.saturating_sub(1)..end)
            .unwrap_or_default()
            .join("\n");
        Ok(ToolResult::success(truncate_output(
            make_output(&selected, &path.display().to_string(), start),
            self.ctx.config().max_output_chars,
        )))
    }

    fn view_dir(&self, path: &Path) -> Result<ToolResult, ToolError> {
        let mut entries = vec![path.display().to_string()];
        for pattern in ["*", "*/*"] {
            let full = path.join(pattern);
            let matches = glob::glob(&full.to_string_lossy())
                .map_err(|e| ToolError::InvalidInput(format!("Invalid directory path: {}", e)))?;
            for entry in matches.filter_map(|r| r.ok()) {
                let relative = entry.strip_prefix(path).unwrap_or(&entry);
                let hidden = relative
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
                if !hidden {
                    entries.push(entry.display().to_string());
                }
            }
        }
        entries[1..].sort();

        Ok(ToolResult::success(format!(
            "Here's the files and directories up to 2 levels deep in {}, excluding hidden items:\n{}\n",
            path.display(),
            entries.join("\n")
        )))
    }

    async fn create(&self, path: &Path, file_text: &str) -> Result<ToolResult, ToolError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::io("create parent directories", e))?;
        }
        write_file(path, file_text).await?;
        Ok(ToolResult::success(format!("File created successfully at: {}", path.display())))
    }

    async fn str_replace(&self, path: &Path, old_str: &str, new_str: &str) -> Result<ToolResult, ToolError> {
        let mut history = self.history.lock().await;
        let content = expand_tabs(&read_file(path).await?);
        let old_str = expand_tabs(old_str);
        let new_str = expand_tabs(new_str);

        let occurrences = content.matches(old_str.as_str()).count();
        if occurrences == 0 {
            return Err(ToolError::InvalidInput(format!(
                "No replacement was performed, old_str `{}` did not appear verbatim in {}.",
                old_str,
                path.display()
            )));
        }
        if occurrences > 1 {
            let lines: Vec<String> = content
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains(old_str.as_str()))
                .map(|(i, _)| (i + 1).to_string())
                .collect();
            return Err(ToolError::InvalidInput(format!(
                "No replacement was performed. Multiple occurrences of old_str `{}` in lines [{}]. Please ensure it is unique",
                old_str,
                lines.join(", ")
            )));
        }

        let new_content = content.replacen(old_str.as_str(), &new_str, 1);
        write_file(path, &new_content).await?;
        history.entry(path.to_path_buf()).or_default().push(content.clone());

        let prefix = content.split(old_str.as_str()).next().unwrap_or_default();
        let replacement_line = prefix.matches('\n').count();
        let start = replacement_line.saturating_sub(SNIPPET_LINES);
        let end = replacement_line + SNIPPET_LINES + new_str.matches('\n').count();
        let snippet: Vec<&str> = new_content.lines().skip(start).take(end - start + 1).collect();

        Ok(ToolResult::success(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected. Edit the file again if necessary.",
            path.display(),
            make_output(&snippet.join("\n"), &format!("a snippet of {}", path.display()), start + 1)
        )))
    }

    async fn insert(&self, path: &Path, insert_line: usize, new_str: &str) -> Result<ToolResult, ToolError> {
        let mut history = self.history.lock().await;
        let content = expand_tabs(&read_file(path).await?);
        let new_str = expand_tabs(new_str);
        let lines: Vec<&str> = content.lines().collect();

        if insert_line > lines.len() {
            return Err(ToolError::InvalidInput(format!(
                "Invalid `insert_line` parameter: {}. It should be within the range of lines of the file: [0, {}]",
                insert_line,
                lines.len()
            )));
        }

        let new_lines: Vec<&str> = new_str.lines().collect();
        let mut updated: Vec<&str> = Vec::with_capacity(lines.len() + new_lines.len());
        updated.extend_from_slice(&lines[..insert_line]);
        updated.extend_from_slice(&new_lines);
        updated.extend_from_slice(&lines[insert_line..]);

        let mut new_content = updated.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        write_file(path, &new_content).await?;
        history.entry(path.to_path_buf()).or_default().push(content.clone());

        let start = insert_line.saturating_sub(SNIPPET_LINES);
        let end = (insert_line + new_lines.len() + SNIPPET_LINES).min(updated.len());
        let snippet = updated[start..end].join("\n");

        Ok(ToolResult::success(format!(
            "The file {} has been edited. {}Review the changes and make sure they are as expected (correct indentation, no duplicate lines, etc). Edit the file again if necessary.",
            path.display(),
            make_output(&snippet, "a snippet of the edited file", start + 1)
        )))
    }

    async fn undo_edit(&self, path: &Path) -> Result<ToolResult, ToolError> {
        let mut history = self.history.lock().await;
        let Some(previous) = history.get_mut(path).and_then(Vec::pop) else {
            return Err(ToolError::InvalidInput(format!("No edit history found for {}.", path.display())));
        };
        write_file(path, &previous).await?;

        Ok(ToolResult::success(format!(
            "Last edit to {} undone successfully. {}",
            path.display(),
            make_output(&previous, &path.display().to_string(), 1)
        )))
    }

    async fn dispatch(&self, input: &Value) -> Result<ToolResult, ToolError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("command is required".to_string()))?;
        if !self.version.commands().contains(&command) {
            return Err(ToolError::InvalidInput(format!(
                "Unrecognized command {}. The allowed commands for the {} tool are: {}",
                command,
                self.version.tool_name(),
                self.version.commands().join(", ")
            )));
        }

        let raw_path = input["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidInput("path is required".to_string()))?;
        let path = self.validate_path(command, Path::new(raw_path))?;

        match command {
            "view" => self.view(&path, input.get("view_range").filter(|v| !v.is_null())).await,
            "create" => {
                let file_text = input["file_text"].as_str().ok_or_else(|| {
                    ToolError::InvalidInput("Parameter `file_text` is required for command: create".to_string())
                })?;
                self.create(&path, file_text).await
            }
            "str_replace" => {
                let old_str = input["old_str"].as_str().ok_or_else(|| {
                    ToolError::InvalidInput("Parameter `old_str` is required for command: str_replace".to_string())
                })?;
                let new_str = input["new_str"].as_str().unwrap_or_default();
                self.str_replace(&path, old_str, new_str).await
            }
            "insert" => {
                let insert_line = input["insert_line"].as_u64().ok_or_else(|| {
                    ToolError::InvalidInput("Parameter `insert_line` is required for command: insert".to_string())
                })? as usize;
                let new_str = input["new_str"].as_str().ok_or_else(|| {
                    ToolError::InvalidInput("Parameter `new_str` is required for command: insert".to_string())
                })?;
                self.insert(&path, insert_line, new_str).await
            }
            "undo_edit" => self.undo_edit(&path).await,
            other => Err(ToolError::InvalidInput(format!("Unrecognized command {}", other))),
        }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &'static str {
        self.version.tool_name()
    }

    fn schema(&self) -> ToolInputSchema {
        ToolInputSchema::new(
            self.version.tool_name(),
            "View, create and edit files. Paths must be absolute.",
        )
        .with_api_type(self.version.api_type())
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "enum": self.version.commands() },
                "path": { "type": "string", "description": "Absolute path to file or directory" },
                "file_text": { "type": "string" },
                "view_range": { "type": "array" },
                "old_str": { "type": "string" },
                "new_str": { "type": "string" },
                "insert_line": { "type": "integer" }
            },
            "required": ["command", "path"]
        }))
    }

    async fn invoke(&self, input: Value) -> Result<ToolResult, eyre::Error> {
        if let Err(message) = self.schema().validate(&input) {
            return Ok(ToolResult::invalid_input(message));
        }
        Ok(self.dispatch(&input).await.unwrap_or_else(ToolResult::from))
    }
}

async fn read_file(path: &Path) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ToolError::io(format!("read {}", path.display()), e))
}

async fn write_file(path: &Path, content: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, content)
        .await
        .map_err(|e| ToolError::io(format!("write {}", path.display()), e))
}

fn expand_tabs(text: &str) -> String {
    text.replace('\t', "        ")
}

fn parse_view_range(range: &Value, line_count: usize) -> Result<(usize, usize), ToolError> {
    let invalid = |msg: String| ToolError::InvalidInput(format!("Invalid `view_range`: {}", msg));

    let bounds: Vec<i64> = range
        .as_array()
        .filter(|a| a.len() == 2)
        .and_then(|a| a.iter().map(Value::as_i64).collect())
        .ok_or_else(|| invalid("it should be a list of two integers.".to_string()))?;
    let (start, end) = (bounds[0], bounds[1]);

    if start < 1 || start as usize > line_count.max(1) {
        return Err(invalid(format!(
            "{:?}. Its first element `{}` should be within the range of lines of the file: [1, {}]",
            bounds, start, line_count
        )));
    }
    if end == -1 {
        return Ok((start as usize, line_count));
    }
    if end < start {
        return Err(invalid(format!(
            "{:?}. Its second element `{}` should be larger or equal than its first `{}`",
            bounds, end, start
        )));
    }
    if end as usize > line_count {
        return Err(invalid(format!(
            "{:?}. Its second element `{}` should be smaller than the number of lines in the file: `{}`",
            bounds, end, line_count
        )));
    }
    Ok((start as usize, end as usize))
}

/// Format content cat -n style
fn make_output(content: &str, descriptor: &str, first_line: usize) -> String {
    let numbered: Vec<String> = expand_tabs(content)
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>6}\t{}", i + first_line, line))
        .collect();
    format!(
        "Here's the result of running `cat -n` on {}:\n{}\n",
        descriptor,
        numbered.join("\n")
    )
}
