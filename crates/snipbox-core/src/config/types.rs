//! Configuration types for the execution engine

use crate::errors::ConfigError;
use crate::registry::ProfileDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Network policy applied to every sandbox.
///
/// No default exists: whether snippets may reach the network
/// (and therefore install packages) is a deployment decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPolicy {
    /// No network interface besides loopback.
    #[serde(rename = "none")]
    Isolated,
    /// The runtime's default connectivity.
    #[serde(rename = "default")]
    Default,
}

impl NetworkPolicy {
    /// Value passed to the runtime's `--network` flag.
    pub fn as_network_mode(&self) -> &'static str {
        match self {
            NetworkPolicy::Isolated => "none",
            NetworkPolicy::Default => "default",
        }
    }
}

impl fmt::Display for NetworkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_network_mode())
    }
}

impl FromStr for NetworkPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "isolated" => Ok(NetworkPolicy::Isolated),
            "default" => Ok(NetworkPolicy::Default),
            other => Err(format!(
                "unknown network policy '{}', expected 'none' or 'default'",
                other
            )),
        }
    }
}

/// Container runtime backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeBackend {
    /// Spawn the runtime binary (`docker run ...`).
    #[default]
    Cli,
    /// Talk to the Docker Engine API directly.
    Api,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub backend: RuntimeBackend,
    #[serde(default = "default_runtime_binary")]
    pub binary: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: RuntimeBackend::default(),
            binary: default_runtime_binary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_memory_limit")]
    pub memory: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            memory: default_memory_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn memory_bytes(&self) -> Result<i64, ConfigError> {
        parse_memory_limit(&self.memory)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            root: None,
        }
    }
}

impl CacheConfig {
    /// Configured root, or `<user cache dir>/snipbox`.
    pub fn resolved_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("snipbox")
        })
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    pub network: NetworkPolicy,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub languages: Vec<ProfileDefinition>,
}

impl EngineConfig {
    /// Configuration with defaults everywhere except the network policy.
    pub fn new(network: NetworkPolicy) -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            limits: LimitsConfig::default(),
            network,
            cache: CacheConfig::default(),
            workspace_root: None,
            languages: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.limits.timeout_secs = timeout_secs;
        self
    }

    pub fn with_memory_limit(mut self, memory: impl Into<String>) -> Self {
        self.limits.memory = memory.into();
        self
    }

    pub fn with_backend(mut self, backend: RuntimeBackend) -> Self {
        self.runtime.backend = backend;
        self
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache.root = Some(root.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    pub fn resolved_workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.binary.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Runtime binary cannot be empty".to_string(),
            ));
        }

        if self.limits.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "Timeout must be greater than 0 seconds".to_string(),
            ));
        }

        self.limits.memory_bytes()?;

        for language in &self.languages {
            if language.language.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Language identifier cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parses a runtime memory limit such as `256m` or `1g` into bytes.
pub fn parse_memory_limit(value: &str) -> Result<i64, ConfigError> {
    let trimmed = value.trim();
    let invalid = |reason: &str| {
        ConfigError::Invalid(format!("Invalid memory limit '{}': {}", value, reason))
    };

    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    if digits.is_empty() {
        return Err(invalid("expected a number"));
    }

    let amount: i64 = digits.parse().map_err(|_| invalid("number out of range"))?;
    let multiplier: i64 = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return Err(invalid("unit must be one of b, k, m, g")),
    };

    if amount == 0 {
        return Err(invalid("must be greater than zero"));
    }

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("number out of range"))
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_memory_limit() -> String {
    "256m".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}
