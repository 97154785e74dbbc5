//! Sandboxed execution of untrusted code snippets.
//!
//! A snippet and a language identifier go in; captured stdout, stderr and an
//! exit code come out. Every request runs in a fresh, resource-limited
//! container with the snippet mounted from a private working directory.
//!
//! # Architecture Overview
//!
//! - **Language registry**: per-language images, commands and dependency rules
//! - **Dependency extraction**: infers third-party packages from the source text
//! - **Execution planning**: orders environment, install, run and teardown stages
//! - **Sandbox launcher**: owns the working directory and the wall-clock budget
//! - **Container runtimes**: the docker CLI or the Docker Engine API
//! - **Result reporting**: one serializable shape for successes and failures
//! - **Configuration system**: YAML files with environment overrides

pub mod cache;
pub mod config;
pub mod engine;
pub mod errors;
pub mod extract;
pub mod launcher;
pub mod planner;
pub mod registry;
pub mod reporter;
pub mod runtime;
pub mod shell;

pub use cache::DependencyCache;
pub use config::*;
pub use engine::{ExecutionEngine, ExecutionRequest, PlannedExecution};
pub use errors::{ConfigError, EngineError, ErrorKind, LaunchError};
pub use extract::extract_dependencies;
pub use launcher::{Constraints, SandboxLauncher};
pub use planner::{plan, ExecutionPlan, Stage};
pub use registry::{LanguageProfile, LanguageRegistry};
pub use reporter::{ExecutionFailure, ExecutionReport, ExecutionResult};
pub use runtime::{ContainerRuntime, ContainerSpec, RawOutput};
