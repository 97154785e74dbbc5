//! The sandboxed execution engine.
//!
//! Wires the registry, extractor, planner, launcher and reporter together.
//! An engine is cheap to clone and every clone shares the same read-only
//! registry, so one instance can serve concurrent requests from many tasks.

use crate::cache::DependencyCache;
use crate::config::EngineConfig;
use crate::errors::{ConfigError, EngineError, LaunchError};
use crate::extract::extract_dependencies;
use crate::launcher::{Constraints, LaunchOutcome, SandboxLauncher};
use crate::planner::{plan, ExecutionPlan};
use crate::registry::{LanguageProfile, LanguageRegistry};
use crate::reporter::{self, ExecutionReport, ExecutionResult};
use crate::runtime::{runtime_from_config, ContainerRuntime};
use crate::shell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_text: String,
    pub language_id: String,
}

impl ExecutionRequest {
    pub fn new(source_text: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            language_id: language_id.into(),
        }
    }
}

/// Everything decided about a request before a container is started.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedExecution {
    pub language_id: String,
    pub image: String,
    pub dependencies: Vec<String>,
    pub plan: ExecutionPlan,
    pub entry_command: Vec<String>,
}

/// Dry run against `registry`: no container runtime is needed.
pub fn prepare(
    registry: &LanguageRegistry,
    request: &ExecutionRequest,
) -> Result<PlannedExecution, EngineError> {
    let profile = registry.resolve(&request.language_id)?;
    let dependencies = extract_dependencies(&request.source_text, profile);
    let plan = plan(profile, &dependencies);
    let entry_command = shell::entry_command(&plan);
    Ok(PlannedExecution {
        language_id: profile.language_id.clone(),
        image: profile.image.clone(),
        dependencies,
        plan,
        entry_command,
    })
}

#[derive(Clone)]
pub struct ExecutionEngine {
    registry: Arc<LanguageRegistry>,
    launcher: SandboxLauncher,
    constraints: Constraints,
}

impl ExecutionEngine {
    /// Builds the registry and runtime described by `config`.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = LanguageRegistry::builtin()?.with_definitions(config.languages.clone())?;
        let runtime = runtime_from_config(&config.runtime).map_err(|e| {
            ConfigError::Invalid(format!("Cannot initialise container runtime: {}", e))
        })?;
        Ok(Self::new(Arc::new(registry), runtime, config))
    }

    pub fn new(
        registry: Arc<LanguageRegistry>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &EngineConfig,
    ) -> Self {
        let mut launcher = SandboxLauncher::new(runtime, config.resolved_workspace_root());
        if config.cache.enabled {
            launcher = launcher.with_cache(DependencyCache::new(config.cache.resolved_root()));
        }

        Self {
            registry,
            launcher,
            constraints: Constraints {
                memory_limit: config.limits.memory.clone(),
                network: config.network,
                timeout: config.limits.timeout(),
            },
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Resolves, extracts and plans without touching the filesystem or runtime.
    pub fn prepare(&self, request: &ExecutionRequest) -> Result<PlannedExecution, EngineError> {
        prepare(&self.registry, request)
    }

    /// Runs the request, returning the report or the engine-level error.
    pub async fn try_execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionReport, EngineError> {
        let profile = self.registry.resolve(&request.language_id)?;
        let outcome = self
            .launch(profile, request)
            .await
            .map_err(EngineError::from)?;
        Ok(outcome.into())
    }

    /// Runs the request. Always returns a result; sandbox failures are
    /// reported through [`ExecutionResult::Failure`].
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let profile = match self.registry.resolve(&request.language_id) {
            Ok(profile) => profile,
            Err(err) => {
                log::warn!("Rejected request: {}", err);
                return err.into();
            }
        };
        reporter::report(self.launch(profile, request).await)
    }

    async fn launch(
        &self,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
    ) -> Result<LaunchOutcome, LaunchError> {
        log::debug!(
            "Resolved language '{}' to image {}",
            profile.language_id,
            profile.image
        );
        let dependencies = extract_dependencies(&request.source_text, profile);
        if !dependencies.is_empty() {
            log::info!(
                "Inferred {} dependencies for '{}': {}",
                dependencies.len(),
                profile.language_id,
                dependencies.join(", ")
            );
        }
        let plan = plan(profile, &dependencies);

        self.launcher
            .launch(profile, &request.source_text, &plan, &self.constraints)
            .await
    }
}
