//! Normalization of launcher outcomes into the result returned to callers.

use crate::errors::{EngineError, ErrorKind, LaunchError};
use crate::launcher::LaunchOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The snippet ran to completion. `exit_code` may well be non-zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub execution_time_ms: f64,
    pub completed_at: DateTime<Utc>,
}

/// The sandbox itself could not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub error_kind: ErrorKind,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Success(ExecutionReport),
    Failure(ExecutionFailure),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            ExecutionResult::Success(report) => Some(report),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(failure) => Some(failure.error_kind),
        }
    }
}

impl From<EngineError> for ExecutionResult {
    fn from(err: EngineError) -> Self {
        ExecutionResult::Failure(ExecutionFailure {
            error_kind: err.kind(),
            error_message: err.to_string(),
        })
    }
}

impl From<LaunchOutcome> for ExecutionReport {
    fn from(outcome: LaunchOutcome) -> Self {
        ExecutionReport {
            stdout: outcome.output.stdout,
            stderr: outcome.output.stderr,
            exit_code: outcome.output.exit_code,
            execution_time_ms: outcome.elapsed.as_secs_f64() * 1000.0,
            completed_at: outcome.completed_at,
        }
    }
}

impl From<LaunchOutcome> for ExecutionResult {
    fn from(outcome: LaunchOutcome) -> Self {
        ExecutionResult::Success(outcome.into())
    }
}

/// Maps a raw launcher outcome onto the single result shape.
pub fn report(outcome: Result<LaunchOutcome, LaunchError>) -> ExecutionResult {
    match outcome {
        Ok(outcome) => outcome.into(),
        Err(err) => {
            let err = EngineError::from(err);
            log::warn!("Execution failed ({}): {}", err.kind(), err);
            err.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RawOutput;
    use std::time::Duration;

    fn outcome(exit_code: i64) -> LaunchOutcome {
        LaunchOutcome {
            output: RawOutput {
                stdout: "hi\n".to_string(),
                stderr: String::new(),
                exit_code,
            },
            elapsed: Duration::from_millis(1500),
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_non_zero_exit_is_still_a_success() {
        let result = report(Ok(outcome(1)));
        assert!(result.is_success());
        let report = result.report().unwrap();
        assert_eq!(report.exit_code, 1);
        assert_eq!(report.stdout, "hi\n");
        assert!((report.execution_time_ms - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_launch_errors_become_failures() {
        let cases = vec![
            (
                LaunchError::RuntimeUnavailable {
                    runtime: "docker".to_string(),
                    reason: "cannot find binary path".to_string(),
                },
                ErrorKind::RuntimeUnavailable,
            ),
            (
                LaunchError::Timeout(Duration::from_secs(1)),
                ErrorKind::Timeout,
            ),
            (
                LaunchError::RuntimeFailed("invalid mount".to_string()),
                ErrorKind::UnexpectedFailure,
            ),
        ];
        for (err, kind) in cases {
            let result = report(Err(err));
            assert!(!result.is_success());
            assert_eq!(result.error_kind(), Some(kind));
        }
    }

    #[test]
    fn test_success_serializes_flat() {
        let json = serde_json::to_value(report(Ok(outcome(0)))).unwrap();
        assert_eq!(json["stdout"], "hi\n");
        assert_eq!(json["exit_code"], 0);
        assert!(json["completed_at"].is_string());
        assert!(json.get("error_kind").is_none());
    }

    #[test]
    fn test_failure_serializes_with_kind_and_message() {
        let result = ExecutionResult::from(EngineError::UnsupportedLanguage("ruby".to_string()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["error_kind"], "unsupported_language");
        assert_eq!(json["error_message"], "Unsupported language: ruby");
        assert!(json.get("stdout").is_none());

        let back: ExecutionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
