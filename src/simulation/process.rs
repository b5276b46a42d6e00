//! Simulator command line construction and process launch.
//!
//! [`SimulationCommand`] assembles the argument vector the simulator
//! expects; [`spawn_simulator`] launches it with stdout captured and no
//! console window.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::config::SimulationParams;

/// Windows process creation flag that suppresses the console window.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Error type for launching the simulator.
#[derive(thiserror::Error, Debug)]
pub enum LaunchError {
    /// The argument vector was empty.
    #[error("Empty simulator command line")]
    EmptyCommand,
    /// `start` was already called on this supervisor.
    #[error("Simulation already started")]
    AlreadyStarted,
    /// The executable was not found.
    #[error("Simulator executable not found: {0}")]
    NotFound(String),
    /// The executable could not be run.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Stdout was not captured by the spawned child.
    #[error("Simulator stdout not available")]
    NoStdout,
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    /// Create a `LaunchError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Spawn `argv[0]` with the remaining elements as arguments.
///
/// Stdout is piped, stdin and stderr are discarded.
///
/// # Errors
///
/// Returns `LaunchError` if `argv` is empty or the OS refuses to start
/// the process.
pub fn spawn_simulator(argv: &[String]) -> Result<Child, LaunchError> {
    let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);

    cmd.spawn().map_err(|e| LaunchError::from_io(program, e))
}

/// Builder for the simulator's argument vector.
#[derive(Debug, Clone)]
pub struct SimulationCommand {
    executable: PathBuf,
    output_dir: PathBuf,
    params: SimulationParams,
    extra_args: Vec<String>,
}

impl SimulationCommand {
    /// Create a command for `executable` writing results to `output_dir`.
    #[must_use]
    pub fn new(executable: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            output_dir: output_dir.into(),
            params: SimulationParams::default(),
            extra_args: Vec::new(),
        }
    }

    /// Set the recognized simulation parameters.
    #[must_use]
    pub fn params(mut self, params: SimulationParams) -> Self {
        self.params = params;
        self
    }

    /// Append free-form arguments, passed through verbatim.
    #[must_use]
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn get_params(&self) -> &SimulationParams {
        &self.params
    }

    /// Build the arguments, excluding the executable.
    #[must_use]
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.params.to_args();
        args.extend(self.extra_args.iter().cloned());
        args.push("--output-dir".to_string());
        args.push(self.output_dir.to_string_lossy().into_owned());
        args
    }

    /// Build the full argument vector, executable first.
    #[must_use]
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![self.executable.to_string_lossy().into_owned()];
        argv.extend(self.build_args());
        argv
    }
}
