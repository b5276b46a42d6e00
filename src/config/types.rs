//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::simulation::ProgressProtocol;

use super::SimulationParams;

/// Executable preferences as stored in the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutableConfig {
    /// User-added simulator executables.
    pub paths: Vec<PathBuf>,
    /// Executable used for new simulations. `None` means the built-in one.
    pub default: Option<PathBuf>,
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbaConfig {
    /// Progress format spoken by the simulator.
    pub protocol: ProgressProtocol,
    /// Directory the simulator writes results to.
    pub output_dir: Option<PathBuf>,
    /// Arguments appended after the recognized parameters.
    pub extra_args: Vec<String>,
    pub executables: ExecutableConfig,
    /// Default simulation parameters.
    pub params: SimulationParams,
}
