//! Notifications published by a running simulation.

use serde::{Deserialize, Serialize};

use super::Progress;

/// Event sent from the supervisor's reader task to its consumer.
///
/// Progress events arrive in output order. `Completed` is always the last
/// event of a run and is sent exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationEvent {
    /// The reported progress changed.
    Progress(Progress),
    /// The simulator exited.
    Completed {
        /// Process return code. Negative values mean the process was
        /// stopped by that signal number.
        return_code: i32,
        /// Whether termination had been requested before exit.
        terminate_requested: bool,
    },
}

impl SimulationEvent {
    /// Returns true if this is the final event of a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Returns the progress value if this is a `Progress` event.
    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        match self {
            Self::Progress(progress) => Some(*progress),
            Self::Completed { .. } => None,
        }
    }

    /// Classify a `Completed` event.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        match self {
            Self::Completed {
                return_code,
                terminate_requested,
            } => Some(RunOutcome::classify(*return_code, *terminate_requested)),
            Self::Progress(_) => None,
        }
    }
}

/// How a finished run should be interpreted by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Exit code 0 without a termination request.
    Success,
    /// Nonzero exit without a termination request.
    AbnormalExit { return_code: i32 },
    /// Termination was requested; any exit code is expected.
    Cancelled { return_code: i32 },
}

impl RunOutcome {
    #[must_use]
    pub fn classify(return_code: i32, terminate_requested: bool) -> Self {
        if terminate_requested {
            Self::Cancelled { return_code }
        } else if return_code == 0 {
            Self::Success
        } else {
            Self::AbnormalExit { return_code }
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true for outcomes the user should be told about as a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::AbnormalExit { .. })
    }

    #[must_use]
    pub fn return_code(&self) -> i32 {
        match self {
            Self::Success => 0,
            Self::AbnormalExit { return_code } | Self::Cancelled { return_code } => *return_code,
        }
    }
}
