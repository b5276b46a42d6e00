//! Registry of simulator executables the user can choose from.
//!
//! The built-in executable is always present and can not be removed.
//! Removing the chosen executable falls back to the built-in one.

use std::path::{Path, PathBuf};

use super::ExecutableConfig;

/// Errors from registry edits.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("The built-in executable can not be removed: {0}")]
    BuiltinRemoval(PathBuf),

    #[error("Executable is not registered: {0}")]
    NotListed(PathBuf),
}

/// Default location of the built-in simulator, where first-time setup
/// unpacks it.
#[must_use]
pub fn builtin_executable() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("symba")
        .join("bin")
        .join(format!("symba{}", std::env::consts::EXE_SUFFIX))
}

/// Known simulator executables plus the user's choice.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutableRegistry {
    builtin: PathBuf,
    paths: Vec<PathBuf>,
    chosen: PathBuf,
}

impl ExecutableRegistry {
    /// Create a registry holding only the built-in executable.
    #[must_use]
    pub fn new(builtin: impl Into<PathBuf>) -> Self {
        let builtin = builtin.into();
        Self {
            paths: vec![builtin.clone()],
            chosen: builtin.clone(),
            builtin,
        }
    }

    /// Restore a registry from stored preferences.
    ///
    /// A stored default that is not registered is ignored.
    #[must_use]
    pub fn from_config(config: &ExecutableConfig, builtin: impl Into<PathBuf>) -> Self {
        let mut registry = Self::new(builtin);
        for path in &config.paths {
            registry.add(path.clone());
        }
        if let Some(default) = &config.default {
            if registry.set_default(default).is_err() {
                tracing::warn!(
                    path = %default.display(),
                    "Stored default executable is not registered, using built-in"
                );
            }
        }
        registry
    }

    /// Preferences to store. The built-in executable is implied.
    #[must_use]
    pub fn to_config(&self) -> ExecutableConfig {
        ExecutableConfig {
            paths: self
                .paths
                .iter()
                .filter(|p| **p != self.builtin)
                .cloned()
                .collect(),
            default: (self.chosen != self.builtin).then(|| self.chosen.clone()),
        }
    }

    #[must_use]
    pub fn builtin(&self) -> &Path {
        &self.builtin
    }

    /// All registered executables, built-in first.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The executable new simulations use.
    #[must_use]
    pub fn chosen(&self) -> &Path {
        &self.chosen
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Register an executable. Returns false if it was already listed.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.contains(&path) {
            return false;
        }
        self.paths.push(path);
        true
    }

    /// Unregister an executable. Returns false if it was not listed.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::BuiltinRemoval` for the built-in executable.
    pub fn remove(&mut self, path: &Path) -> Result<bool, RegistryError> {
        if path == self.builtin {
            return Err(RegistryError::BuiltinRemoval(path.to_path_buf()));
        }
        let before = self.paths.len();
        self.paths.retain(|p| p != path);
        if self.chosen == path {
            self.chosen = self.builtin.clone();
        }
        Ok(self.paths.len() != before)
    }

    /// Make a registered executable the default.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotListed` if the path is not registered.
    pub fn set_default(&mut self, path: &Path) -> Result<(), RegistryError> {
        if !self.contains(path) {
            return Err(RegistryError::NotListed(path.to_path_buf()));
        }
        self.chosen = path.to_path_buf();
        Ok(())
    }
}
