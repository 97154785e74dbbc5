//! Execution profiles: how one language is provisioned and run inside a sandbox.

use crate::errors::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Placeholder substituted with the entry filename in run commands.
pub const ENTRY_PLACEHOLDER: &str = "{file}";

/// Commands that create and remove a throwaway package environment
/// (a Python virtualenv, for instance) around the run stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolatedEnvironment {
    pub create: Vec<String>,
    pub teardown: Vec<String>,
}

/// Serializable description of a profile, as written in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDefinition {
    pub language: String,
    pub image: String,
    pub entry_filename: String,
    pub run_command: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub standard_library: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<IsolatedEnvironment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub package_aliases: BTreeMap<String, String>,
}

/// Immutable, validated execution profile for one language.
#[derive(Debug, Clone)]
pub struct LanguageProfile {
    pub language_id: String,
    pub image: String,
    pub entry_filename: String,
    pub run_command: Vec<String>,
    pub dependency_install_command: Option<Vec<String>>,
    pub dependency_pattern: Option<Regex>,
    pub standard_library: BTreeSet<String>,
    pub isolated_environment: Option<IsolatedEnvironment>,
    /// Package-manager cache path inside the image, mounted from the host cache.
    pub cache_path: Option<String>,
    /// Module name to installable package name, where they differ.
    pub package_aliases: BTreeMap<String, String>,
}

impl LanguageProfile {
    /// Run command with the entry filename substituted in.
    pub fn run_argv(&self) -> Vec<String> {
        self.run_command
            .iter()
            .map(|part| part.replace(ENTRY_PLACEHOLDER, &self.entry_filename))
            .collect()
    }

    /// Package name to hand to the installer for a detected module.
    /// Subpath imports (`lodash/fp`, `@scope/pkg/sub`) install their package root.
    pub fn package_for<'a>(&'a self, module: &'a str) -> &'a str {
        self.package_aliases
            .get(module)
            .map(String::as_str)
            .unwrap_or_else(|| package_root(module))
    }

    pub fn installs_dependencies(&self) -> bool {
        self.dependency_install_command.is_some()
    }
}

fn package_root(module: &str) -> &str {
    let segments = if module.starts_with('@') { 2 } else { 1 };
    match module.match_indices('/').nth(segments - 1) {
        Some((index, _)) => &module[..index],
        None => module,
    }
}

impl TryFrom<ProfileDefinition> for LanguageProfile {
    type Error = ConfigError;

    fn try_from(def: ProfileDefinition) -> Result<Self, Self::Error> {
        let language = def.language.trim().to_string();
        if language.is_empty() {
            return Err(ConfigError::Invalid(
                "Language identifier cannot be empty".to_string(),
            ));
        }
        if def.image.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Language '{}' image cannot be empty",
                language
            )));
        }
        if def.entry_filename.is_empty()
            || def.entry_filename.contains('/')
            || def.entry_filename.contains('\\')
            || def.entry_filename == "."
            || def.entry_filename == ".."
        {
            return Err(ConfigError::Invalid(format!(
                "Language '{}' entry_filename must be a plain file name, got '{}'",
                language, def.entry_filename
            )));
        }
        if def.run_command.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Language '{}' run_command cannot be empty",
                language
            )));
        }
        if matches!(&def.install_command, Some(cmd) if cmd.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "Language '{}' install_command cannot be an empty list",
                language
            )));
        }
        if let Some(env) = &def.environment {
            if env.create.is_empty() || env.teardown.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Language '{}' environment needs both create and teardown commands",
                    language
                )));
            }
        }

        let dependency_pattern = match &def.dependency_pattern {
            Some(pattern) => {
                let regex =
                    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                        language: language.clone(),
                        source,
                    })?;
                // Group 0 is the whole match; at least one capture group must name the module.
                if regex.captures_len() < 2 {
                    return Err(ConfigError::Invalid(format!(
                        "Language '{}' dependency_pattern has no capture group",
                        language
                    )));
                }
                Some(regex)
            }
            None => None,
        };

        if dependency_pattern.is_some() && def.install_command.is_none() {
            log::warn!(
                "Language '{}' detects dependencies but has no install command; they will not be installed",
                language
            );
        }

        Ok(LanguageProfile {
            language_id: language,
            image: def.image,
            entry_filename: def.entry_filename,
            run_command: def.run_command,
            dependency_install_command: def.install_command,
            dependency_pattern,
            standard_library: def.standard_library.into_iter().collect(),
            isolated_environment: def.environment,
            cache_path: def.cache_path,
            package_aliases: def.package_aliases,
        })
    }
}
