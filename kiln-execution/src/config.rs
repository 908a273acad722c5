//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Execution settings, usually read from `kiln.yml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Reserved directory holding one workspace per identity
    #[serde(default = "default_workspace_base_dir")]
    pub workspace_base_dir: PathBuf,

    /// Size of the worker pool used to run independent transforms (0 = one per CPU)
    #[serde(default)]
    pub worker_threads: usize,

    /// Fail a transform whose reported outputs do not exist
    #[serde(default = "default_true")]
    pub fail_on_missing_outputs: bool,
}

fn default_workspace_base_dir() -> PathBuf {
    PathBuf::from(".kiln/transforms")
}

fn default_true() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            workspace_base_dir: default_workspace_base_dir(),
            worker_threads: 0,
            fail_on_missing_outputs: true,
        }
    }
}

impl ExecutionConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: ExecutionConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workspace_base_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "workspace_base_dir must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the workspace base directory against a project root
    pub fn workspace_base_dir_in(&self, project_root: &Path) -> PathBuf {
        if self.workspace_base_dir.is_absolute() {
            self.workspace_base_dir.clone()
        } else {
            project_root.join(&self.workspace_base_dir)
        }
    }
}
