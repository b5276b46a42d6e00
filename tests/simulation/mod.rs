//! Simulation module tests.

mod process_test;
mod supervisor_test;

/// Verify all public simulation types are exported from the library.
#[test]
fn test_all_simulation_types_exported() {
    use symba::simulation::{
        LaunchError, PercentParser, Progress, ProgressParser, ProgressProtocol, RoundStepParser,
        RunOutcome, SimulationCommand, SimulationEvent, Supervisor,
    };

    let _ = PercentParser::new();
    let _ = RoundStepParser::new();
    let _: Box<dyn ProgressParser> = ProgressProtocol::Percent.parser();
    let _ = SimulationCommand::new("symba", "out");
    let _ = Supervisor::new(ProgressProtocol::RoundStep);

    let _: fn() -> LaunchError = || LaunchError::EmptyCommand;
    let _ = SimulationEvent::Progress(Progress::Percent { value: 0 });
    let _ = RunOutcome::Success;
}
