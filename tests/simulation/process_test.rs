//! Tests for simulator command construction and launch.

use symba::config::SimulationParams;
use symba::simulation::{spawn_simulator, LaunchError, SimulationCommand};

fn full_params() -> SimulationParams {
    SimulationParams {
        agents: Some(1000),
        stocks: Some(2),
        steps: Some(500),
        rounds: Some(3),
        rate: Some(0.5),
        plot: Some(true),
        model_type: Some("herding".to_string()),
        gesture: Some(1.0),
        liquidation_floor: Some(0.05),
        leader_type: Some("wealthy".to_string()),
        cluster_limit: Some(0.25),
    }
}

#[test]
fn command_renders_all_parameters_in_order() {
    let cmd = SimulationCommand::new("/opt/symba", "/tmp/run-1")
        .params(full_params())
        .extra_args(["--seed", "42"]);

    assert_eq!(
        cmd.argv(),
        vec![
            "/opt/symba",
            "--agents",
            "1000",
            "--stocks",
            "2",
            "--steps",
            "500",
            "--rounds",
            "3",
            "--rate",
            "0.5",
            "--plot",
            "True",
            "--type",
            "herding",
            "--gesture",
            "1.0",
            "--liquidation-floor",
            "0.05",
            "--leader-type",
            "wealthy",
            "--cluster-limit",
            "0.25",
            "--seed",
            "42",
            "--output-dir",
            "/tmp/run-1",
        ]
    );
}

#[test]
fn command_without_parameters() {
    let cmd = SimulationCommand::new("symba", "out");
    assert_eq!(cmd.build_args(), vec!["--output-dir", "out"]);
}

#[test]
fn command_accessors() {
    let cmd = SimulationCommand::new("symba", "out").params(full_params());
    assert_eq!(cmd.executable(), std::path::Path::new("symba"));
    assert_eq!(cmd.output_dir(), std::path::Path::new("out"));
    assert_eq!(cmd.get_params().agents, Some(1000));
}

#[test]
fn command_is_clone() {
    let cmd = SimulationCommand::new("symba", "out").extra_args(["-x"]);
    let cloned = cmd.clone();
    assert_eq!(cmd.argv(), cloned.argv());
}

#[test]
fn launch_error_display() {
    let errors = [
        LaunchError::EmptyCommand,
        LaunchError::AlreadyStarted,
        LaunchError::NotFound("symba".to_string()),
        LaunchError::PermissionDenied("symba".to_string()),
        LaunchError::NoStdout,
    ];

    for err in errors {
        assert!(!err.to_string().is_empty());
    }
}

#[tokio::test]
async fn spawn_missing_binary_is_not_found() {
    let argv = vec!["/nonexistent/symba-simulator".to_string()];
    let result = spawn_simulator(&argv);
    assert!(matches!(result, Err(LaunchError::NotFound(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn spawn_captures_stdout_only() {
    use tokio::io::AsyncReadExt;

    let argv = vec![
        "sh".to_string(),
        "-c".to_string(),
        "echo out; echo err 1>&2".to_string(),
    ];
    let mut child = spawn_simulator(&argv).unwrap();
    assert!(child.stderr.is_none());
    assert!(child.stdin.is_none());

    let mut stdout = child.stdout.take().unwrap();
    let mut text = String::new();
    stdout.read_to_string(&mut text).await.unwrap();
    assert_eq!(text, "out\n");

    let status = child.wait().await.unwrap();
    assert!(status.success());
}
