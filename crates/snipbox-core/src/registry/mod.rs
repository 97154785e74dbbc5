//! Language registry
//!
//! The registry is assembled once at startup from the built-in profiles plus
//! any profiles declared in configuration, and is read-only afterwards. It is
//! shared between concurrent executions behind an `Arc` without locking.

mod builtin;
pub mod profile;

pub use profile::{IsolatedEnvironment, LanguageProfile, ProfileDefinition, ENTRY_PLACEHOLDER};

use crate::errors::{ConfigError, EngineError};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    profiles: BTreeMap<String, LanguageProfile>,
}

impl LanguageRegistry {
    /// Registry holding the built-in `python`, `javascript` and `bash` profiles.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_definitions(builtin::definitions())
    }

    /// Builds a registry from definitions; a later definition for the same
    /// language replaces an earlier one.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ProfileDefinition>,
    {
        Self::default().with_definitions(definitions)
    }

    /// Consumes the registry and returns one extended with `definitions`.
    pub fn with_definitions<I>(mut self, definitions: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ProfileDefinition>,
    {
        for definition in definitions {
            let profile = LanguageProfile::try_from(definition)?;
            if self.profiles.contains_key(&profile.language_id) {
                log::info!("Overriding language profile '{}'", profile.language_id);
            }
            self.profiles.insert(profile.language_id.clone(), profile);
        }
        Ok(self)
    }

    pub fn get(&self, language_id: &str) -> Option<&LanguageProfile> {
        self.profiles.get(language_id)
    }

    /// Case-sensitive lookup used by the engine before any resource is allocated.
    pub fn resolve(&self, language_id: &str) -> Result<&LanguageProfile, EngineError> {
        self.get(language_id)
            .ok_or_else(|| EngineError::UnsupportedLanguage(language_id.to_string()))
    }

    pub fn language_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn profiles(&self) -> impl Iterator<Item = &LanguageProfile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
