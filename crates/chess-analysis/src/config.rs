//! Engine configuration loaded from `engine.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where [`EngineConfig::load`] looks, in order.
const SEARCH_PATHS: [&str; 3] = ["engine.toml", "../engine.toml", "../../engine.toml"];

/// Errors that can occur when loading or parsing configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Value of an engine option, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(n) => write!(f, "{}", n),
            OptionValue::Text(s) => f.write_str(s),
        }
    }
}

/// How to launch and set up the analysis engine.
///
/// ```toml
/// path = "/usr/local/bin/stockfish"
/// depth = 18
///
/// [options]
/// Threads = 4
/// Hash = 256
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Engine executable. Defaults to `stockfish` on the `PATH`.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Extra command-line arguments for the engine.
    #[serde(default)]
    pub args: Vec<String>,
    /// UCI options applied after the handshake, before the engine is ready.
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    /// Search depth when the caller does not give one. Defaults to 15.
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_path() -> PathBuf {
    PathBuf::from("stockfish")
}

fn default_depth() -> u32 {
    15
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            args: Vec::new(),
            options: BTreeMap::new(),
            depth: default_depth(),
        }
    }
}

impl EngineConfig {
    /// Load `engine.toml` from the current directory or one of its two parents.
    ///
    /// Falls back to defaults when no file is found.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if a file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if it contains invalid TOML.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find() {
            Some(path) => Self::from_file(&path),
            None => {
                tracing::debug!("no engine.toml found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// First existing config file on the search path.
    pub fn find() -> Option<PathBuf> {
        SEARCH_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Load a specific config file.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Options as `(name, value)` pairs ready for `setoption`.
    pub fn option_pairs(&self) -> Vec<(String, String)> {
        self.options
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect()
    }
}
