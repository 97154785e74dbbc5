//! Configuration loader for YAML files and environment overrides
//!
//! Loading happens in three steps: parse the YAML document, apply the
//! `SNIPBOX_*` environment overrides, then validate the result.

use crate::config::types::{EngineConfig, NetworkPolicy};
use crate::errors::ConfigError;
use std::env;
use std::path::Path;
use tokio::fs;

pub const ENV_TIMEOUT_SECS: &str = "SNIPBOX_TIMEOUT_SECS";
pub const ENV_MEMORY_LIMIT: &str = "SNIPBOX_MEMORY_LIMIT";
pub const ENV_NETWORK: &str = "SNIPBOX_NETWORK";
pub const ENV_RUNTIME_BINARY: &str = "SNIPBOX_RUNTIME_BINARY";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("Read configuration from {}", path.display());
        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<EngineConfig, ConfigError> {
        let mut config: EngineConfig = serde_yaml::from_str(content)?;
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `SNIPBOX_*` environment variables on top of `config`.
    pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
        if let Some(value) = read_env(ENV_TIMEOUT_SECS) {
            let secs = value
                .parse::<u64>()
                .map_err(|err| invalid_override(ENV_TIMEOUT_SECS, &value, err.to_string()))?;
            if secs == 0 {
                return Err(invalid_override(
                    ENV_TIMEOUT_SECS,
                    &value,
                    "must be greater than 0 seconds".to_string(),
                ));
            }
            log::info!("Timeout overridden by {}: {}s", ENV_TIMEOUT_SECS, secs);
            config.limits.timeout_secs = secs;
        }

        if let Some(value) = read_env(ENV_MEMORY_LIMIT) {
            crate::config::types::parse_memory_limit(&value)
                .map_err(|err| invalid_override(ENV_MEMORY_LIMIT, &value, err.to_string()))?;
            config.limits.memory = value;
        }

        if let Some(value) = read_env(ENV_NETWORK) {
            let policy = value
                .parse::<NetworkPolicy>()
                .map_err(|reason| invalid_override(ENV_NETWORK, &value, reason))?;
            log::info!("Network policy overridden by {}: {}", ENV_NETWORK, policy);
            config.network = policy;
        }

        if let Some(value) = read_env(ENV_RUNTIME_BINARY) {
            config.runtime.binary = value;
        }

        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => None,
    }
}

fn invalid_override(name: &str, value: &str, reason: String) -> ConfigError {
    ConfigError::InvalidOverride {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    }
}
