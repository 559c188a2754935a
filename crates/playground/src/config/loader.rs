//! Configuration file loading for the playground engine
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};
use regex::Regex;

use crate::config::{Config, ConfigError};
use crate::types::BackendKind;

const INVALID_EXTENSION_CHARS: [char; 2] = ['/', '.'];

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.source_extension.is_empty() {
            return Err(ConfigError::Invalid("source_extension is empty".to_owned()));
        }
        if self
            .source_extension
            .chars()
            .any(|c| INVALID_EXTENSION_CHARS.contains(&c))
        {
            return Err(ConfigError::InvalidExtensionChars);
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "default_timeout_ms must be positive".to_owned(),
            ));
        }
        if self.max_timeout_ms < self.default_timeout_ms {
            return Err(ConfigError::Invalid(
                "max_timeout_ms is smaller than default_timeout_ms".to_owned(),
            ));
        }
        if self.startup_timeout_ms == 0 || self.compile_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "startup and compile timeouts must be positive".to_owned(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be positive".to_owned()));
        }
        if self.default_entry_class.trim().is_empty() {
            return Err(ConfigError::Invalid("default_entry_class is empty".to_owned()));
        }
        if let Some(bad) = self.security.env.iter().find(|e| !e.contains('=')) {
            return Err(ConfigError::Invalid(format!(
                "security env entry '{bad}' is not KEY=VALUE"
            )));
        }
        let security = &self.security;
        if let Some(bad) = security
            .read_only_paths
            .iter()
            .chain(&security.devices)
            .find(|p| !p.is_absolute())
        {
            return Err(ConfigError::Invalid(format!(
                "jail path '{}' is not absolute",
                bad.display()
            )));
        }
        let covering = self.scratch_root.as_ref().and_then(|scratch| {
            security
                .read_only_paths
                .iter()
                .find(|p| scratch.starts_with(p))
        });
        if let (true, Some(covering)) = (security.isolation, covering) {
            return Err(ConfigError::Invalid(format!(
                "scratch_root lies under read-only jail path '{}'",
                covering.display()
            )));
        }

        for kind in BackendKind::ALL {
            let backend = self.backend(kind);
            if backend.name.is_empty() {
                return Err(ConfigError::Invalid(format!("backend '{kind}' has empty name")));
            }
            if backend.compile.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "backend '{kind}' has empty compile command"
                )));
            }
            if backend.run.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "backend '{kind}' has empty run command"
                )));
            }
            for pattern in &backend.unsupported_patterns {
                Regex::new(pattern).map_err(|e| ConfigError::Pattern(kind.to_string(), e))?;
            }
        }

        Ok(())
    }
}
