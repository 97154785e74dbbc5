//! Configuration module for the execution engine
//!
//! Supports YAML configuration files, `SNIPBOX_*` environment overrides and
//! programmatic construction through [`EngineConfig::new`].

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::ConfigError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    ConfigLoader::from_file(path).await
}
