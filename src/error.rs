//! Error types for toolharness
//!
//! Construction-time and session-level failures. Call-time failures never
//! surface here: they are returned as data in a `ToolResult`.

use thiserror::Error;

/// All error types that can stop a harness session
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Requested tool version is not in the catalog
    #[error("Unknown tool version '{version}' (known: {known})")]
    UnknownVersion { version: String, known: String },

    /// Two tools in one group declared the same name
    #[error("Duplicate tool name '{name}' in tool group '{version}'")]
    DuplicateName { name: String, version: String },

    /// One or more tools failed to release their session state
    #[error("Teardown failed: {0}")]
    TeardownFailed(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_version_error() {
        let err = HarnessError::UnknownVersion {
            version: "v9".to_string(),
            known: "v1, v2".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown tool version 'v9' (known: v1, v2)");
    }

    #[test]
    fn test_duplicate_name_error() {
        let err = HarnessError::DuplicateName {
            name: "bash".to_string(),
            version: "v1".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate tool name 'bash' in tool group 'v1'");
    }

    #[test]
    fn test_teardown_failed_error() {
        let err = HarnessError::TeardownFailed("bash: kill failed".to_string());
        assert_eq!(err.to_string(), "Teardown failed: bash: kill failed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: HarnessError = json_err.into();
        assert!(matches!(err, HarnessError::Json(_)));
    }
}
