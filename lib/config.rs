//! Map configuration settings.
//!
//! A [`MapConfig`] may be written inline or loaded from a TOML file:
//!
//! ```toml
//! initial-capacity = 64
//! overwrite = "first-wins"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Largest `initial-capacity` a configuration may request. Capacity is only a sizing hint, and
/// pre-allocating beyond this buys nothing but memory.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;

/// What [`put`](crate::cache::blocking::BlockingMap::put) does when the key already has a value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Replace the resolved entry with a fresh one holding the new value. The latest `put` is what
    /// later reads observe.
    #[default]
    Replace,
    /// Keep the first published value; later `put`s to a resolved key are no-ops.
    FirstWins,
}

/// Construction settings for a [`BlockingMap`](crate::cache::blocking::BlockingMap).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MapConfig {
    /// Expected number of keys. A sizing hint only. Signed because TOML integers are.
    #[serde(default)]
    pub initial_capacity: Option<i64>,

    /// Policy applied when a resolved key is written again.
    #[serde(default)]
    pub overwrite: OverwritePolicy,
}

/// Failure to load a [`MapConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration parsed but is not usable.
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    /// The text is not valid TOML for [`MapConfig`].
    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MapConfig {
    /// Validate the correctness of the configuration.
    ///
    /// Returns `Err` with one message per problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if let Some(capacity) = self.initial_capacity {
            if capacity < 0 {
                errors.push(format!(
                    "initial-capacity must not be negative, got {capacity}."
                ));
            } else if !usize::try_from(capacity).is_ok_and(|c| c <= MAX_INITIAL_CAPACITY) {
                errors.push(format!(
                    "initial-capacity must be at most {MAX_INITIAL_CAPACITY}, got {capacity}."
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text is not valid TOML for this struct or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate().map_err(ConfigError::ValidationErrors)?;
        Ok(config)
    }

    /// Load and validate a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::IoError`] if the file cannot be read, otherwise the same errors as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading map configuration file.");
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
