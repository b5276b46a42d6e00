//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::SymbaConfig;

/// Configuration loader that searches multiple locations.
#[derive(Debug)]
pub struct ConfigLoader {
    /// Search paths in order of priority.
    search_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default search paths.
    #[must_use]
    pub fn new() -> Self {
        let mut search_paths = Vec::new();

        // 1. Current directory: .symba.toml
        search_paths.push(PathBuf::from(".symba.toml"));

        // 2. User config directory: ~/.config/symba/config.toml
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("symba").join("config.toml"));
        }

        Self { search_paths }
    }

    /// Create a config loader with a specific config file path.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            search_paths: vec![path],
        }
    }

    /// Load configuration from the first available file, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(&self) -> Result<SymbaConfig, ConfigError> {
        if let Some(path) = self.find_config_file() {
            tracing::debug!(path = %path.display(), "Loading config file");
            return Self::load_from_path(&path);
        }

        tracing::debug!("No config file found, using defaults");
        Ok(SymbaConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> Result<SymbaConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Write configuration back, returning the path written.
    ///
    /// Overwrites the file `load` would read; if none exists, creates the
    /// lowest-priority search path (the user config file).
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self, config: &SymbaConfig) -> Result<PathBuf, ConfigError> {
        let path = self.save_target().ok_or(ConfigError::NoWritableLocation)?;

        let content = toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError {
            path: path.clone(),
            source: e,
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }
        std::fs::write(&path, content).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        tracing::debug!(path = %path.display(), "Saved config file");
        Ok(path)
    }

    /// The file `save` would write.
    #[must_use]
    pub fn save_target(&self) -> Option<PathBuf> {
        self.find_config_file()
            .or_else(|| self.search_paths.last().cloned())
    }

    /// Get the search paths for debugging.
    #[must_use]
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find the first config file that exists.
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

/// Errors that can occur during configuration loading and saving.
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

    #[error("Failed to serialize config for {path}: {source}")]
    SerializeError {
        path: PathBuf,
        source: toml::ser::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No location available for the config file")]
    NoWritableLocation,
}
