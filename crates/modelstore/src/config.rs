//! Store configuration with file-based loading and environment overrides.
//!
//! Load order (later wins):
//! 1. Compiled defaults
//! 2. TOML file, `[store]` section (when a path is given)
//! 3. Environment variables
//!
//! Environment variables:
//! - `MODELSTORE_ROOT`: Store root directory
//! - `MODELSTORE_LOG`: Default log filter
//!
//! Default root: `~/.modelstore/models`

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::name::NameDefaults;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Configuration for a model store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory. Blobs live in `{root}/blobs`, manifests in `{root}/manifests`.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Parts filled in when a model name leaves them out.
    #[serde(default)]
    pub defaults: NameDefaults,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".modelstore").join("models"))
        .unwrap_or_else(|| PathBuf::from(".modelstore/models"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            defaults: NameDefaults::default(),
            log_level: default_log_level(),
        }
    }
}

impl StoreConfig {
    /// Defaults, then the file at `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load the `[store]` section of a TOML file.
    ///
    /// ```toml
    /// [store]
    /// root = "/tank/models"
    /// log_level = "debug"
    ///
    /// [store.defaults]
    /// host = "registry.ollama.ai"
    /// namespace = "library"
    /// tag = "latest"
    /// ```
    ///
    /// A file without a `[store]` section yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_toml(&contents, path)
    }

    fn parse_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let parse_error = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        let table: toml::Table = contents
            .parse()
            .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

        match table.get("store") {
            Some(section) => section
                .clone()
                .try_into()
                .map_err(|e: toml::de::Error| parse_error(e.to_string())),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("MODELSTORE_ROOT").filter(|v| !v.is_empty()) {
            self.root = PathBuf::from(root);
        }
        if let Some(level) = lookup("MODELSTORE_LOG").filter(|v| !v.is_empty()) {
            self.log_level = level;
        }
    }

    /// Create a config with a specific root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.root.join("blobs")
    }

    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join("manifests")
    }
}
