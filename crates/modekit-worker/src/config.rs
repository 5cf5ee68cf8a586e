//! Where the worker lives and what it loads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Worker launch settings, stored as JSON.
///
/// ```json
/// {
///   "program": "modekit-worker",
///   "module": "coffee",
///   "classname": "BracketLinter",
///   "tlns": { "coffee": "/usr/share/modekit/coffee" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Executable started for each attached document.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Module the worker should load.
    pub module: String,
    /// Handler class inside `module`.
    pub classname: String,
    /// Module name to resolved path, forwarded to the worker on init.
    pub tlns: BTreeMap<String, String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("modekit-worker"),
            args: Vec::new(),
            module: "coffee".to_string(),
            classname: "BracketLinter".to_string(),
            tlns: BTreeMap::new(),
        }
    }
}

impl WorkerConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("modekit").join("worker.json"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded worker config from {}", path.display());
        Ok(config)
    }

    /// Loads the file at [`WorkerConfig::default_path`], falling back to defaults
    /// when it is missing or unreadable.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("{e}; using default worker config");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(std::io::Error::other)
            .map_err(write_err)?;
        std::fs::write(path, json).map_err(write_err)
    }
}
