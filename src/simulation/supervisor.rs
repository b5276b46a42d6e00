//! Simulation process supervisor.
//!
//! A [`Supervisor`] owns one simulator process for its whole life. `start`
//! launches the child and a reader task; the reader parses stdout, keeps
//! the shared state current and sends [`SimulationEvent`]s to whoever took
//! the event receiver. Without a receiver events are not queued and the
//! state is read by polling. A supervisor runs once; build a new one to run
//! again.

use std::process::ExitStatus;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{spawn_simulator, LaunchError, Progress, ProgressParser, ProgressProtocol};
use super::{RunOutcome, SimulationEvent};

/// Size of a single read from the simulator's stdout.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Return code reported when the exit status could not be collected.
pub const UNKNOWN_RETURN_CODE: i32 = -1;

#[derive(Debug, Default)]
struct RunState {
    progress: Option<Progress>,
    return_code: Option<i32>,
    terminate_requested: bool,
    pid: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Terminate,
}

/// Shared state plus the event sender, used by the reader task.
///
/// State changes and the matching event are published under one write lock,
/// so an observer that saw an event never reads older state.
#[derive(Debug)]
struct Publisher {
    run_id: Uuid,
    state: Arc<RwLock<RunState>>,
    events_tx: Option<UnboundedSender<SimulationEvent>>,
}

impl Publisher {
    fn send(&self, event: SimulationEvent) {
        let Some(events_tx) = &self.events_tx else {
            return;
        };
        if events_tx.send(event).is_err() {
            tracing::trace!(run_id = %self.run_id, "Event receiver dropped");
        }
    }

    fn progress(&self, progress: Progress) {
        let mut state = write_state(&self.state);
        state.progress = Some(progress);
        tracing::debug!(run_id = %self.run_id, %progress, "Simulation progress");
        self.send(SimulationEvent::Progress(progress));
    }

    fn completed(&self, return_code: i32) {
        let mut state = write_state(&self.state);
        state.return_code = Some(return_code);
        let terminate_requested = state.terminate_requested;
        self.send(SimulationEvent::Completed {
            return_code,
            terminate_requested,
        });
        drop(state);

        tracing::info!(
            run_id = %self.run_id,
            return_code,
            terminate_requested,
            "Simulation completed"
        );
    }
}

fn read_state(state: &RwLock<RunState>) -> RwLockReadGuard<'_, RunState> {
    state.read().expect("RwLock poisoned")
}

fn write_state(state: &RwLock<RunState>) -> RwLockWriteGuard<'_, RunState> {
    state.write().expect("RwLock poisoned")
}

/// Supervisor for a single run of the external simulator.
#[derive(Debug)]
pub struct Supervisor {
    run_id: Uuid,
    protocol: ProgressProtocol,
    state: Arc<RwLock<RunState>>,
    events_tx: Option<UnboundedSender<SimulationEvent>>,
    events_taken: bool,
    control_tx: Option<UnboundedSender<Control>>,
    reader: Option<JoinHandle<()>>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(ProgressProtocol::default())
    }
}

impl Supervisor {
    /// Create an unstarted supervisor that parses output with `protocol`.
    #[must_use]
    pub fn new(protocol: ProgressProtocol) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            protocol,
            state: Arc::new(RwLock::new(RunState::default())),
            events_tx: None,
            events_taken: false,
            control_tx: None,
            reader: None,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn protocol(&self) -> ProgressProtocol {
        self.protocol
    }

    /// Take the event receiver.
    ///
    /// This can only be called once, before `start`; other calls return
    /// `None`. The channel closes after the `Completed` event.
    pub fn take_events(&mut self) -> Option<UnboundedReceiver<SimulationEvent>> {
        if self.events_taken || self.is_started() {
            return None;
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = Some(events_tx);
        self.events_taken = true;
        Some(events_rx)
    }

    /// Launch the simulator. `argv[0]` is the executable.
    ///
    /// Returns as soon as the process exists; output is handled by a
    /// background task. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::AlreadyStarted` on a second call, and the other
    /// `LaunchError` variants when the process cannot be created.
    pub fn start(&mut self, argv: &[String]) -> Result<(), LaunchError> {
        if self.control_tx.is_some() {
            return Err(LaunchError::AlreadyStarted);
        }

        let mut child = spawn_simulator(argv)?;
        let Some(stdout) = child.stdout.take() else {
            let run_id = self.run_id;
            tokio::spawn(async move {
                if let Err(e) = child.kill().await {
                    tracing::warn!(%run_id, error = %e, "Failed to reap simulator");
                }
            });
            return Err(LaunchError::NoStdout);
        };

        let pid = child.id();
        write_state(&self.state).pid = pid;
        tracing::info!(
            run_id = %self.run_id,
            pid = ?pid,
            program = %argv[0],
            args = argv.len() - 1,
            "Simulation started"
        );

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let publisher = Publisher {
            run_id: self.run_id,
            state: Arc::clone(&self.state),
            events_tx: self.events_tx.take(),
        };
        let parser = self.protocol.parser();

        self.reader = Some(tokio::spawn(read_output(
            child, stdout, parser, publisher, control_rx,
        )));
        self.control_tx = Some(control_tx);
        Ok(())
    }

    /// Ask the simulator to stop.
    ///
    /// Only acts while running: marks the run as cancelled and sends a
    /// termination request (SIGTERM on Unix). The run is over when the
    /// `Completed` event arrives, not when this returns.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    pub fn terminate(&self) {
        let Some(control_tx) = &self.control_tx else {
            tracing::debug!(run_id = %self.run_id, "Terminate before start ignored");
            return;
        };

        {
            let mut state = write_state(&self.state);
            if state.return_code.is_some() {
                tracing::debug!(run_id = %self.run_id, "Terminate after completion ignored");
                return;
            }
            state.terminate_requested = true;
        }

        tracing::info!(run_id = %self.run_id, "Termination requested");
        if control_tx.send(Control::Terminate).is_err() {
            tracing::debug!(run_id = %self.run_id, "Reader already finished");
        }
    }

    /// Whether the simulator was started and has not completed.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn running(&self) -> bool {
        self.control_tx.is_some() && read_state(&self.state).return_code.is_none()
    }

    #[must_use]
    pub fn is_started(&self) -> bool {
        self.control_tx.is_some()
    }

    /// Latest reported progress.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn progress(&self) -> Option<Progress> {
        read_state(&self.state).progress
    }

    /// Return code, once the simulator has completed.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn return_code(&self) -> Option<i32> {
        read_state(&self.state).return_code
    }

    /// Whether `terminate` took effect during this run.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn terminate_requested(&self) -> bool {
        read_state(&self.state).terminate_requested
    }

    /// Process ID of the simulator, if started.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        read_state(&self.state).pid
    }

    /// Classified result of a completed run.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn outcome(&self) -> Option<RunOutcome> {
        let state = read_state(&self.state);
        state
            .return_code
            .map(|code| RunOutcome::classify(code, state.terminate_requested))
    }

    /// Wait for the reader task to finish.
    ///
    /// Returns immediately if the supervisor was never started or was
    /// already joined.
    pub async fn join(&mut self) {
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                tracing::error!(run_id = %self.run_id, error = %e, "Reader task failed");
            }
        }
    }
}

/// Decode the valid UTF-8 prefix of `pending`, keeping an incomplete
/// trailing sequence for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_owned();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let rest = pending.split_off(e.valid_up_to());
            let text = String::from_utf8_lossy(pending).into_owned();
            *pending = rest;
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }

    UNKNOWN_RETURN_CODE
}

fn request_termination(child: &mut Child, run_id: Uuid) {
    let Some(pid) = child.id() else {
        tracing::debug!(%run_id, "Process already reaped");
        return;
    };

    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Ok(raw_pid) = i32::try_from(pid) else {
            tracing::warn!(%run_id, pid, "PID out of range");
            return;
        };
        match kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
            Ok(()) => tracing::debug!(%run_id, pid, "Sent SIGTERM"),
            Err(e) => tracing::warn!(%run_id, pid, error = %e, "Failed to send SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            tracing::warn!(%run_id, pid, error = %e, "Failed to terminate process");
        }
    }
}

fn publish_all(publisher: &Publisher, changes: Vec<Progress>) {
    for progress in changes {
        publisher.progress(progress);
    }
}

/// Reader task body: stream stdout into the parser until EOF, then wait
/// for the exit status and publish completion. Never fails; every terminal
/// condition ends in exactly one `Completed` event.
async fn read_output(
    mut child: Child,
    mut stdout: ChildStdout,
    mut parser: Box<dyn ProgressParser>,
    publisher: Publisher,
    mut control_rx: UnboundedReceiver<Control>,
) {
    let run_id = publisher.run_id;
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut pending = Vec::new();
    let mut control_open = true;

    loop {
        tokio::select! {
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = take_utf8(&mut pending);
                    tracing::trace!(%run_id, bytes = n, "Read simulator output");
                    publish_all(&publisher, parser.feed(&text));
                }
                Err(e) => {
                    tracing::warn!(%run_id, error = %e, "Failed to read simulator output");
                    break;
                }
            },
            request = control_rx.recv(), if control_open => match request {
                Some(Control::Terminate) => request_termination(&mut child, run_id),
                None => control_open = false,
            },
        }
    }

    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        publish_all(&publisher, parser.feed(&text));
    }
    publish_all(&publisher, parser.finish());
    drop(stdout);

    let return_code = loop {
        tokio::select! {
            status = child.wait() => break match status {
                Ok(status) => exit_code(status),
                Err(e) => {
                    tracing::error!(%run_id, error = %e, "Failed to wait for simulator");
                    UNKNOWN_RETURN_CODE
                }
            },
            request = control_rx.recv(), if control_open => match request {
                Some(Control::Terminate) => request_termination(&mut child, run_id),
                None => control_open = false,
            },
        }
    };

    publisher.completed(return_code);
}
