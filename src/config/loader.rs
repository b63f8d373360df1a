//! Configuration loading functionality.
//!
//! This module provides the [`ConfigLoader`] type for loading workflow
//! configuration from YAML.

use std::fs;
use std::path::Path;

use crate::error::{EngineError, EngineResult};

use super::types::WorkflowConfig;

/// Loads and validates workflow configuration.
///
/// Every field is optional in the YAML; missing fields take their defaults.
/// The loaded configuration is validated before it is returned, so a
/// `ConfigLoader` always holds a usable [`WorkflowConfig`].
///
/// # Example
///
/// ```no_run
/// use timesheet_ingest::config::ConfigLoader;
///
/// let loader = ConfigLoader::load("./config/workflow.yaml").unwrap();
/// println!("Batch size: {}", loader.config().batch_size);
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: WorkflowConfig,
}

impl ConfigLoader {
    /// Loads configuration from a YAML file.
    ///
    /// # Returns
    ///
    /// Returns a `ConfigLoader` on success, or an error if:
    /// - The file does not exist or cannot be read (`ConfigNotFound`)
    /// - The file is not valid YAML for a [`WorkflowConfig`] (`ConfigParseError`)
    /// - A value is out of range (`InvalidConfig`)
    pub fn load<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|_| EngineError::ConfigNotFound {
            path: path_str.clone(),
        })?;

        Self::parse(&content, &path_str)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Example
    ///
    /// ```
    /// use timesheet_ingest::config::ConfigLoader;
    ///
    /// let loader = ConfigLoader::from_yaml_str("batch_size: 4\nmax_retries: 1").unwrap();
    /// assert_eq!(loader.config().batch_size, 4);
    /// assert_eq!(loader.config().max_retries, 1);
    /// ```
    pub fn from_yaml_str(content: &str) -> EngineResult<Self> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, source: &str) -> EngineResult<Self> {
        // An empty document deserializes as unit, not as a map
        let config: WorkflowConfig = if content.trim().is_empty() {
            WorkflowConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| EngineError::ConfigParseError {
                path: source.to_string(),
                message: e.to_string(),
            })?
        };

        config.validate()?;
        Ok(Self { config })
    }

    /// Returns the loaded configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Consumes the loader, returning the configuration.
    pub fn into_config(self) -> WorkflowConfig {
        self.config
    }
}
