//! Integration tests for the simulation supervisor.

use std::time::Duration;

use symba::simulation::{
    LaunchError, Progress, ProgressProtocol, RunOutcome, SimulationEvent, Supervisor,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_test::{assert_err, assert_ok};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

/// Drain events until the channel closes after completion.
async fn collect(mut events: UnboundedReceiver<SimulationEvent>) -> Vec<SimulationEvent> {
    tokio::time::timeout(EVENT_TIMEOUT, async move {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            seen.push(event);
        }
        seen
    })
    .await
    .expect("Simulation did not complete in time")
}

fn percent(value: u32) -> SimulationEvent {
    SimulationEvent::Progress(Progress::Percent { value })
}

#[test]
fn launch_empty_command_fails() {
    let mut supervisor = Supervisor::default();
    let result = supervisor.start(&[]);
    assert!(matches!(result, Err(LaunchError::EmptyCommand)));
    assert!(!supervisor.running());
}

#[tokio::test]
async fn launch_missing_executable_fails() {
    let mut supervisor = Supervisor::default();
    let result = supervisor.start(&["/nonexistent/symba".to_string()]);
    assert!(matches!(result, Err(LaunchError::NotFound(_))));
    assert!(!supervisor.running());
    assert!(!supervisor.is_started());
}

#[cfg(unix)]
#[tokio::test]
async fn launch_non_executable_file_fails() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut supervisor = Supervisor::default();
    let result = supervisor.start(&[file.path().display().to_string()]);
    assert!(matches!(result, Err(LaunchError::PermissionDenied(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn reports_percent_progress_then_completion() {
    let mut supervisor = Supervisor::new(ProgressProtocol::Percent);
    let events = supervisor.take_events().unwrap();

    assert_ok!(supervisor.start(&sh("printf '10%%\\n20%%\\n100%%\\n'")));
    assert!(supervisor.running());

    let seen = collect(events).await;
    assert_eq!(
        seen,
        vec![
            percent(10),
            percent(20),
            percent(100),
            SimulationEvent::Completed {
                return_code: 0,
                terminate_requested: false,
            },
        ]
    );

    assert!(!supervisor.running());
    assert!(!supervisor.terminate_requested());
    assert_eq!(supervisor.return_code(), Some(0));
    assert_eq!(supervisor.progress(), Some(Progress::Percent { value: 100 }));
    assert_eq!(supervisor.outcome(), Some(RunOutcome::Success));
    supervisor.join().await;
}

#[cfg(unix)]
#[tokio::test]
async fn repeated_percent_reported_once() {
    let mut supervisor = Supervisor::new(ProgressProtocol::Percent);
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("printf '37%%\\n'; sleep 0.1; printf '37%%\\n'")));

    let seen = collect(events).await;
    let progress: Vec<_> = seen.iter().filter_map(SimulationEvent::progress).collect();
    assert_eq!(progress, vec![Progress::Percent { value: 37 }]);
}

#[cfg(unix)]
#[tokio::test]
async fn progress_split_across_writes() {
    let mut supervisor = Supervisor::new(ProgressProtocol::Percent);
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("printf '4'; sleep 0.2; printf '2%%\\n'")));

    let seen = collect(events).await;
    assert_eq!(seen[0], percent(42));
    assert!(seen[1].is_terminal());
}

#[cfg(unix)]
#[tokio::test]
async fn unterminated_last_line_is_parsed() {
    let mut supervisor = Supervisor::new(ProgressProtocol::Percent);
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("printf '99%%'")));

    let seen = collect(events).await;
    assert_eq!(seen[0], percent(99));
    assert_eq!(seen.len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn stderr_is_not_parsed() {
    let mut supervisor = Supervisor::new(ProgressProtocol::Percent);
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("echo 50% 1>&2; echo 60%")));

    let seen = collect(events).await;
    assert_eq!(seen[0], percent(60));
    assert_eq!(seen.len(), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn reports_round_step_progress() {
    let mut supervisor = Supervisor::new(ProgressProtocol::RoundStep);
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("printf 'Round 2/10:\\n  step 5/100\\n'")));

    let seen = collect(events).await;
    assert_eq!(
        seen[0],
        SimulationEvent::Progress(Progress::RoundStep {
            round: Some(1),
            step: Some(4),
        })
    );
    assert!(seen[1].is_terminal());
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_reported_not_raised() {
    let mut supervisor = Supervisor::default();
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("echo 5%; exit 3")));

    let seen = collect(events).await;
    assert_eq!(
        seen.last(),
        Some(&SimulationEvent::Completed {
            return_code: 3,
            terminate_requested: false,
        })
    );
    assert_eq!(
        supervisor.outcome(),
        Some(RunOutcome::AbnormalExit { return_code: 3 })
    );
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_stops_long_running_process() {
    let mut supervisor = Supervisor::default();
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("exec sleep 30")));

    supervisor.terminate();
    assert!(supervisor.terminate_requested());

    let seen = collect(events).await;
    let completions: Vec<_> = seen.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(completions.len(), 1);
    assert!(matches!(
        completions[0],
        SimulationEvent::Completed {
            terminate_requested: true,
            ..
        }
    ));

    assert!(!supervisor.running());
    assert!(matches!(
        supervisor.outcome(),
        Some(RunOutcome::Cancelled { .. })
    ));
    // SIGTERM
    assert_eq!(supervisor.return_code(), Some(-15));
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_twice_completes_once() {
    let mut supervisor = Supervisor::default();
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("exec sleep 30")));

    supervisor.terminate();
    supervisor.terminate();

    let seen = collect(events).await;
    assert_eq!(seen.len(), 1);
    assert!(supervisor.terminate_requested());
}

#[cfg(unix)]
#[tokio::test]
async fn terminate_after_completion_is_noop() {
    let mut supervisor = Supervisor::default();
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("true")));

    collect(events).await;
    supervisor.terminate();

    assert!(!supervisor.terminate_requested());
    assert_eq!(supervisor.outcome(), Some(RunOutcome::Success));
}

#[cfg(unix)]
#[tokio::test]
async fn running_until_completion_event() {
    let mut supervisor = Supervisor::default();
    let mut events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("echo 1%; sleep 0.3; echo 2%")));

    loop {
        let event = tokio::time::timeout(EVENT_TIMEOUT, events.recv())
            .await
            .unwrap()
            .unwrap();
        if event.is_terminal() {
            assert!(!supervisor.running());
            break;
        }
        assert!(supervisor.running());
    }
}

#[cfg(unix)]
#[tokio::test]
async fn start_twice_fails() {
    let mut supervisor = Supervisor::default();
    let events = supervisor.take_events().unwrap();
    assert_ok!(supervisor.start(&sh("true")));

    let second = supervisor.start(&sh("true"));
    assert!(matches!(second, Err(LaunchError::AlreadyStarted)));

    collect(events).await;
    assert_err!(supervisor.start(&sh("true")));
}

#[cfg(unix)]
#[tokio::test]
async fn pid_recorded_on_start() {
    let mut supervisor = Supervisor::default();
    assert_eq!(supervisor.pid(), None);
    assert_ok!(supervisor.start(&sh("true")));
    assert!(supervisor.pid().is_some());
    supervisor.join().await;
    assert!(!supervisor.running());
}

#[cfg(unix)]
#[tokio::test]
async fn polling_client_without_receiver() {
    let mut supervisor = Supervisor::new(ProgressProtocol::RoundStep);
    assert_ok!(supervisor.start(&sh(
        "i=1; while [ $i -le 500 ]; do echo \"  step $i/500\"; i=$((i+1)); done"
    )));
    assert!(supervisor.take_events().is_none());

    tokio::time::timeout(EVENT_TIMEOUT, async {
        while supervisor.running() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Simulation did not complete in time");

    assert_eq!(
        supervisor.progress(),
        Some(Progress::RoundStep {
            round: None,
            step: Some(499),
        })
    );
    assert_eq!(supervisor.outcome(), Some(RunOutcome::Success));
    supervisor.join().await;
}
