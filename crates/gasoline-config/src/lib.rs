//! Gasoline project configuration
//!
//! A project is described by `gas.config.json`:
//!
//! ```json
//! {
//!   "project": "my-app",
//!   "resourceContainerDirPath": "gas",
//!   "upJsonPath": "gas.up.json",
//!   "maxConcurrency": 4
//! }
//! ```

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "gas.config.json";
pub const CONFIG_PATH_VAR: &str = "GAS_CONFIG_PATH";

fn default_container_dir() -> PathBuf {
    PathBuf::from("gas")
}

fn default_up_json_path() -> PathBuf {
    PathBuf::from("gas.up.json")
}

/// Contents of `gas.config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Project name, prefixed to provisioned resource names
    pub project: String,
    #[serde(default = "default_container_dir")]
    pub resource_container_dir_path: PathBuf,
    #[serde(default = "default_up_json_path")]
    pub up_json_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl ProjectConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate(path)?;
        debug!(path = %path.display(), project = %config.project, "Loaded project config");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if self.project.trim().is_empty() {
            return Err(invalid("project must not be empty"));
        }
        if self.max_concurrency == Some(0) {
            return Err(invalid("maxConcurrency must be at least 1"));
        }
        Ok(())
    }
}

/// A loaded config together with the directory its relative paths resolve against
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub path: PathBuf,
    pub config: ProjectConfig,
}

impl LoadedConfig {
    /// Find and load the project config
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let path = find_config_file(explicit)?;
        let config = ProjectConfig::load(&path)?;
        Ok(Self { path, config })
    }

    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn container_dir(&self) -> PathBuf {
        self.root().join(&self.config.resource_container_dir_path)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root().join(&self.config.up_json_path)
    }
}

/// Locate `gas.config.json`
///
/// Lookup order:
/// 1. the explicit path (`--config`)
/// 2. the `GAS_CONFIG_PATH` environment variable
/// 3. the current directory
/// 4. `~/.config/gasoline/gas.config.json`
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::ExplicitPathNotFound {
            path: path.to_path_buf(),
        });
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_VAR) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        debug!(path = %path.display(), "GAS_CONFIG_PATH points to a missing file");
    }

    let local = std::env::current_dir()?.join(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("gasoline").join(CONFIG_FILE_NAME);
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}
