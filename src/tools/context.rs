//! Session environment handed to tool factories

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::ToolsConfig;

use super::result::ToolResult;

/// Execution context for tools - scoped to a single session
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Working directory - relative paths resolve here
    pub working_dir: PathBuf,

    /// Session ID (used as default run id for reports)
    pub session_id: String,

    /// Whether file paths are confined to the working directory
    pub sandbox_enabled: bool,

    config: Arc<ToolsConfig>,
}

impl ToolContext {
    pub fn new(working_dir: PathBuf, session_id: String) -> Self {
        Self {
            working_dir,
            session_id,
            sandbox_enabled: false,
            config: Arc::new(ToolsConfig::default()),
        }
    }

    /// Build a context from configuration
    pub fn from_config(config: ToolsConfig, session_id: String) -> Self {
        Self {
            working_dir: config.working_dir.clone(),
            session_id,
            sandbox_enabled: config.sandbox,
            config: Arc::new(config),
        }
    }

    /// Create a context confined to its working directory
    pub fn new_sandboxed(working_dir: PathBuf, session_id: String) -> Self {
        Self {
            sandbox_enabled: true,
            ..Self::new(working_dir, session_id)
        }
    }

    /// Replace the tool settings, keeping working dir and sandbox flag
    pub fn with_config(mut self, config: ToolsConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    /// Normalize a path relative to the working directory
    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.working_dir.join(path) }
    }

    /// Validate path is within the working directory (sandbox enforcement)
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let resolved = resolve(&self.normalize_path(path));

        if !self.sandbox_enabled {
            return Ok(resolved);
        }

        let root = self.working_dir.canonicalize().map_err(|e| ToolError::Io {
            operation: "canonicalize working directory".to_string(),
            source: e,
        })?;

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                root: self.working_dir.clone(),
            })
        }
    }
}

/// Canonicalize a path that may not exist yet
///
/// The nearest existing ancestor is canonicalized (following symlinks) and
/// the missing components are re-applied on top of it.
fn resolve(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        if let Ok(canonical) = current.canonicalize() {
            let mut out = canonical;
            for component in missing.iter().rev() {
                match component {
                    Component::ParentDir => {
                        out.pop();
                    }
                    Component::CurDir => {}
                    other => out.push(other.as_os_str()),
                }
            }
            return out;
        }
        match (current.parent(), current.components().next_back()) {
            (Some(parent), Some(last)) => {
                missing.push(last);
                current = parent;
            }
            _ => return lexical_normalize(path),
        }
    }
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Errors that can occur inside a tool before it produces a result
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Path {path} escapes working directory {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("The path {0} is not an absolute path, it should start with `/`")]
    NotAbsolute(PathBuf),

    #[error("The path {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    CommandTimeout(String),

    #[error("{0}")]
    SessionClosed(String),

    #[error("{0}")]
    CommandFailed(String),

    #[error("IO error during {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl ToolError {
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

impl From<ToolError> for ToolResult {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput(_)
            | ToolError::NotAbsolute(_)
            | ToolError::SandboxViolation { .. }
            | ToolError::FileNotFound(_) => ToolResult::invalid_input(err.to_string()),
            ToolError::CommandTimeout(_) => {
                ToolResult::error(super::result::ToolErrorKind::Timeout, err.to_string())
            }
            _ => ToolResult::failed(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_context_creation() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf(), "session_001".to_string());

        assert_eq!(ctx.session_id, "session_001");
        assert!(!ctx.sandbox_enabled);
        assert_eq!(ctx.config().max_output_chars, 30_000);
    }

    #[test]
    fn test_from_config() {
        let config = ToolsConfig {
            working_dir: PathBuf::from("/srv/app"),
            sandbox: true,
            max_output_chars: 10,
            ..ToolsConfig::default()
        };
        let ctx = ToolContext::from_config(config, "s".to_string());

        assert_eq!(ctx.working_dir, PathBuf::from("/srv/app"));
        assert!(ctx.sandbox_enabled);
        assert_eq!(ctx.config().max_output_chars, 10);
    }

    #[test]
    fn test_path_validation_inside_working_dir() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new_sandboxed(dir.path().to_path_buf(), "s".to_string());

        std::fs::write(dir.path().join("test.txt"), "content").unwrap();

        assert!(ctx.validate_path(Path::new("test.txt")).is_ok());
        assert!(ctx.validate_path(&dir.path().join("new.txt")).is_ok());
    }

    #[test]
    fn test_path_validation_outside_working_dir() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new_sandboxed(dir.path().to_path_buf(), "s".to_string());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));

        let result = ctx.validate_path(Path::new("../../escape.txt"));
        assert!(matches!(result, Err(ToolError::SandboxViolation { .. })));
    }

    #[test]
    fn test_path_validation_through_symlink() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let ctx = ToolContext::new_sandboxed(dir.path().to_path_buf(), "s".to_string());

        for candidate in ["link/escaped.txt", "link/newdir/escaped.txt", "link/a/b/../escaped.txt"] {
            let result = ctx.validate_path(&dir.path().join(candidate));
            assert!(
                matches!(result, Err(ToolError::SandboxViolation { .. })),
                "{} was accepted",
                candidate
            );
        }

        // Missing directories under a real subdirectory stay inside
        std::fs::create_dir(dir.path().join("real")).unwrap();
        let inside = ctx.validate_path(&dir.path().join("real/newdir/ok.txt")).unwrap();
        assert!(inside.starts_with(dir.path().canonicalize().unwrap()));
        assert!(inside.ends_with("real/newdir/ok.txt"));
    }

    #[test]
    fn test_path_validation_without_sandbox() {
        let dir = tempdir().unwrap();
        let ctx = ToolContext::new(dir.path().to_path_buf(), "s".to_string());

        assert!(ctx.validate_path(Path::new("/tmp")).is_ok());
    }

    #[test]
    fn test_tool_error_into_result() {
        let result: ToolResult = ToolError::InvalidInput("bad".to_string()).into();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::InvalidInput));

        let result: ToolResult = ToolError::CommandTimeout("slow".to_string()).into();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::Timeout));

        let result: ToolResult = ToolError::SessionClosed("gone".to_string()).into();
        assert_eq!(result.error_kind(), Some(ToolErrorKind::ToolFailed));
        assert_eq!(result.error_message(), Some("gone"));
    }
}
