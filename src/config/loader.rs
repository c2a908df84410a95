//! Locating, reading and overriding the agent-notch configuration.
//!
//! Without `--config` the first existing file of the search list wins and
//! a missing file means defaults. An explicit path must exist.

use std::path::{Path, PathBuf};

use super::{NotchConfig, Transport};

/// Project-local config file name.
pub const LOCAL_CONFIG_FILE: &str = ".agent-notch.toml";

/// Values given on the command line, applied on top of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub binary_path: Option<PathBuf>,
    pub transport: Option<Transport>,
    pub http_port: Option<u16>,
    pub disable_auto_restart: bool,
}

impl ConfigOverrides {
    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every set value into `config`.
    pub fn apply(&self, config: &mut NotchConfig) {
        if let Some(path) = &self.binary_path {
            config.server.binary_path.clone_from(path);
        }
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(port) = self.http_port {
            config.server.http_port = port;
        }
        if self.disable_auto_restart {
            config.restart.auto_restart = false;
        }
    }
}

/// Where the configuration comes from.
#[derive(Debug)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    explicit: bool,
}

impl ConfigLoader {
    /// Search `.agent-notch.toml`, then `<config_dir>/agent-notch/config.toml`.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = vec![PathBuf::from(LOCAL_CONFIG_FILE)];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("agent-notch").join("config.toml"));
        }
        Self::with_search_paths(search_paths)
    }

    /// Search the given paths in order; none of them has to exist.
    #[must_use]
    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            explicit: false,
        }
    }

    /// Read exactly this file; it must exist.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
            explicit: true,
        }
    }

    /// Loader for an optional `--config` argument.
    #[must_use]
    pub fn from_cli(path: Option<PathBuf>) -> Self {
        path.map_or_else(Self::new, Self::with_path)
    }

    /// Load the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if an explicit path cannot be read,
    /// or `ConfigError::ParseError` if the chosen file is not valid TOML
    /// for [`NotchConfig`].
    pub fn load(&self) -> Result<NotchConfig, ConfigError> {
        if self.explicit {
            if let Some(path) = self.search_paths.first() {
                return read_config(path);
            }
        }

        match self.find_config_file() {
            Some(path) => read_config(&path),
            None => {
                tracing::debug!("No config file found, using defaults");
                Ok(NotchConfig::default())
            }
        }
    }

    /// Load the configuration and apply command-line overrides.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_with(&self, overrides: &ConfigOverrides) -> Result<NotchConfig, ConfigError> {
        let mut config = self.load()?;
        if !overrides.is_empty() {
            tracing::debug!(?overrides, "Applying command-line overrides");
            overrides.apply(&mut config);
        }
        Ok(config)
    }

    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First search path that exists.
    #[must_use]
    pub fn find_config_file(&self) -> Option<PathBuf> {
        self.search_paths.iter().find(|p| p.exists()).cloned()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_config(path: &Path) -> Result<NotchConfig, ConfigError> {
    tracing::debug!(path = %path.display(), "Loading config file");
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
