//! Container runtimes the launcher can drive.
//!
//! A runtime runs one fully-described container to completion and reports its
//! output. It does not enforce the wall-clock budget itself: the launcher
//! drops the `run` future when the budget expires and then calls
//! [`ContainerRuntime::terminate`] with the container name.

pub mod api;
pub mod cli;

pub use api::DockerApi;
pub use cli::DockerCli;

use crate::config::{NetworkPolicy, RuntimeBackend, RuntimeConfig};
use crate::errors::LaunchError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

/// Fixed path of the per-request working directory inside every container.
pub const CONTAINER_WORKDIR: &str = "/app";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: String,
}

impl BindMount {
    pub fn new(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
        }
    }

    /// `host:container`, as understood by `-v` and the Engine API `Binds` field.
    pub fn to_bind_spec(&self) -> String {
        format!("{}:{}", self.host.display(), self.container)
    }
}

/// Everything needed to start one sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// The working-directory mount comes first, the dependency cache (if any) second.
    pub mounts: Vec<BindMount>,
    pub memory_limit: String,
    pub network: NetworkPolicy,
    pub working_dir: String,
    pub command: Vec<String>,
}

/// What the container printed and how it exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, spec: &ContainerSpec) -> Result<RawOutput, LaunchError>;

    /// Force-stops and removes a container that outlived its budget.
    async fn terminate(&self, container_name: &str) -> Result<(), LaunchError>;
}

/// Builds the runtime selected by configuration.
pub fn runtime_from_config(
    config: &RuntimeConfig,
) -> Result<Arc<dyn ContainerRuntime>, LaunchError> {
    match config.backend {
        RuntimeBackend::Cli => Ok(Arc::new(DockerCli::new(config.binary.clone()))),
        RuntimeBackend::Api => Ok(Arc::new(DockerApi::connect()?)),
    }
}
