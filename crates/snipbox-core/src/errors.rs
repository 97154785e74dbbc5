//! Error types for the execution engine
//!
//! Two layers are kept apart on purpose: [`LaunchError`] describes what went
//! wrong while driving a container runtime, while [`EngineError`] is the small,
//! caller-facing taxonomy that ends up in an execution result. A snippet that
//! exits non-zero is never an error at either layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Stable identifiers surfaced as `error_kind` in failure results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedLanguage,
    RuntimeUnavailable,
    Timeout,
    UnexpectedFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedLanguage => "unsupported_language",
            ErrorKind::RuntimeUnavailable => "runtime_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnexpectedFailure => "unexpected_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Execution exceeded the time limit of {limit:?}")]
    Timeout { limit: Duration },
    #[error("Unexpected failure: {0}")]
    UnexpectedFailure(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnsupportedLanguage(_) => ErrorKind::UnsupportedLanguage,
            EngineError::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::UnexpectedFailure(_) => ErrorKind::UnexpectedFailure,
        }
    }
}

// Specific error for the sandbox launcher and container runtimes
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Runtime '{runtime}' is not available: {reason}")]
    RuntimeUnavailable { runtime: String, reason: String },
    #[error("Container invocation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("I/O error during sandbox operation: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Could not prepare working directory: {0}")]
    WorkspaceError(String),
    #[error("Container runtime failed: {0}")]
    RuntimeFailed(String),
}

impl From<LaunchError> for EngineError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::RuntimeUnavailable { .. } => {
                EngineError::RuntimeUnavailable(err.to_string())
            }
            LaunchError::Timeout(limit) => EngineError::Timeout { limit },
            other => EngineError::UnexpectedFailure(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid dependency pattern for language '{language}': {source}")]
    InvalidPattern {
        language: String,
        source: regex::Error,
    },
    #[error("Invalid environment override {name}='{value}': {reason}")]
    InvalidOverride {
        name: String,
        value: String,
        reason: String,
    },
    #[error("Configuration error: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_errors_map_onto_engine_kinds() {
        let unavailable = LaunchError::RuntimeUnavailable {
            runtime: "docker".to_string(),
            reason: "not found on PATH".to_string(),
        };
        assert_eq!(
            EngineError::from(unavailable).kind(),
            ErrorKind::RuntimeUnavailable
        );

        let timeout = EngineError::from(LaunchError::Timeout(Duration::from_secs(3)));
        assert_eq!(timeout, EngineError::Timeout { limit: Duration::from_secs(3) });

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let mapped = EngineError::from(LaunchError::from(io));
        assert_eq!(mapped.kind(), ErrorKind::UnexpectedFailure);
        assert!(mapped.to_string().contains("denied"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedLanguage).unwrap();
        assert_eq!(json, "\"unsupported_language\"");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
