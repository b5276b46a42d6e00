//! Symba - launch, monitor and cancel runs of the Symba market simulator.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use symba::config::{
    builtin_executable, ConfigLoader, ExecutableRegistry, SimulationParams, SymbaConfig,
};
use symba::display;
use symba::simulation::{
    ProgressProtocol, RunOutcome, SimulationCommand, SimulationEvent, Supervisor,
};

/// Exit code reported when the run was cancelled with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProtocolArg {
    Percent,
    RoundStep,
}

impl From<ProtocolArg> for ProgressProtocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Percent => ProgressProtocol::Percent,
            ProtocolArg::RoundStep => ProgressProtocol::RoundStep,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "symba",
    about = "Launch and monitor Symba market simulations",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Simulation parameters. Unset values fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
struct ParamArgs {
    /// Number of trading agents.
    #[arg(long)]
    agents: Option<u32>,
    /// Number of stocks.
    #[arg(long)]
    stocks: Option<u32>,
    /// Steps per round.
    #[arg(long)]
    steps: Option<u32>,
    /// Number of rounds.
    #[arg(long)]
    rounds: Option<u32>,
    #[arg(long)]
    rate: Option<f64>,
    /// Plot results (true or false).
    #[arg(long)]
    plot: Option<bool>,
    /// Behavioral model type.
    #[arg(long = "type")]
    model_type: Option<String>,
    #[arg(long)]
    gesture: Option<f64>,
    #[arg(long)]
    liquidation_floor: Option<f64>,
    #[arg(long)]
    leader_type: Option<String>,
    #[arg(long)]
    cluster_limit: Option<f64>,
}

impl From<ParamArgs> for SimulationParams {
    fn from(args: ParamArgs) -> Self {
        Self {
            agents: args.agents,
            stocks: args.stocks,
            steps: args.steps,
            rounds: args.rounds,
            rate: args.rate,
            plot: args.plot,
            model_type: args.model_type,
            gesture: args.gesture,
            liquidation_floor: args.liquidation_floor,
            leader_type: args.leader_type,
            cluster_limit: args.cluster_limit,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct LaunchArgs {
    /// Simulator executable. Defaults to the registry choice.
    #[arg(long)]
    exe: Option<PathBuf>,
    /// Directory for simulation results.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[command(flatten)]
    params: ParamArgs,
    /// Extra arguments passed to the simulator verbatim.
    #[arg(last = true)]
    extra: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation and follow its progress.
    Run {
        #[command(flatten)]
        launch: LaunchArgs,
        /// Progress format printed by the simulator.
        #[arg(long, value_enum)]
        protocol: Option<ProtocolArg>,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Print the simulator command line without running it.
    Args {
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Manage registered simulator executables.
    Exe {
        #[command(subcommand)]
        action: ExeAction,
    },
}

#[derive(Subcommand)]
enum ExeAction {
    /// List registered executables.
    List,
    /// Register an executable.
    Add { path: PathBuf },
    /// Unregister an executable.
    Remove { path: PathBuf },
    /// Use an executable for new simulations.
    Default { path: PathBuf },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn config_loader(path: Option<PathBuf>) -> ConfigLoader {
    path.map_or_else(ConfigLoader::new, ConfigLoader::with_path)
}

fn build_command(launch: LaunchArgs, config: &SymbaConfig) -> Result<SimulationCommand, String> {
    let executable = launch.exe.unwrap_or_else(|| {
        ExecutableRegistry::from_config(&config.executables, builtin_executable())
            .chosen()
            .to_path_buf()
    });
    let output_dir = launch
        .output_dir
        .or_else(|| config.output_dir.clone())
        .ok_or("No output directory: pass --output-dir or set output_dir in the config file")?;
    let params = SimulationParams::from(launch.params).or(&config.params);

    Ok(SimulationCommand::new(executable, output_dir)
        .params(params)
        .extra_args(config.extra_args.iter().cloned())
        .extra_args(launch.extra))
}

fn print_event(event: &SimulationEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => display::print_error(&format!("Failed to encode event: {e}")),
        }
        return;
    }
    match event {
        SimulationEvent::Progress(progress) => display::print_progress(progress),
        SimulationEvent::Completed { .. } => {
            if let Some(outcome) = event.outcome() {
                display::print_outcome(&outcome);
            }
        }
    }
}

fn outcome_exit_code(outcome: Option<RunOutcome>) -> ExitCode {
    match outcome {
        Some(RunOutcome::Success) => ExitCode::SUCCESS,
        Some(RunOutcome::Cancelled { .. }) => ExitCode::from(EXIT_CANCELLED),
        Some(RunOutcome::AbnormalExit { .. }) | None => ExitCode::FAILURE,
    }
}

async fn run_simulation(
    command: &SimulationCommand,
    protocol: ProgressProtocol,
    json: bool,
) -> ExitCode {
    let mut supervisor = Supervisor::new(protocol);
    let Some(mut events) = supervisor.take_events() else {
        display::print_error("Event channel unavailable");
        return ExitCode::FAILURE;
    };

    if let Err(e) = supervisor.start(&command.argv()) {
        display::print_error(&format!("Failed to launch simulator: {e}"));
        return ExitCode::FAILURE;
    }
    tracing::info!(run_id = %supervisor.run_id(), ?protocol, "Following simulation");
    if !json {
        display::print_run_start(
            &command.executable().display().to_string(),
            command.output_dir(),
        );
    }

    let mut outcome = None;
    let mut watch_ctrl_c = true;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    print_event(&event, json);
                    if let Some(done) = event.outcome() {
                        outcome = Some(done);
                    }
                }
                None => break,
            },
            signal = tokio::signal::ctrl_c(), if watch_ctrl_c => match signal {
                Ok(()) => {
                    if !json {
                        display::print_terminate_requested();
                    }
                    supervisor.terminate();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl-C");
                    watch_ctrl_c = false;
                }
            },
        }
    }

    supervisor.join().await;
    outcome_exit_code(outcome)
}

fn manage_executables(loader: &ConfigLoader, action: ExeAction) -> Result<(), String> {
    let mut config = loader.load().map_err(|e| e.to_string())?;
    let mut registry = ExecutableRegistry::from_config(&config.executables, builtin_executable());

    match action {
        ExeAction::List => {
            for path in registry.paths() {
                let marker = if path == registry.chosen() { "*" } else { " " };
                let builtin = if path == registry.builtin() {
                    " (built-in)"
                } else {
                    ""
                };
                println!("{marker} {}{builtin}", path.display());
            }
            return Ok(());
        }
        ExeAction::Add { path } => {
            if !registry.add(path.clone()) {
                tracing::info!(path = %path.display(), "Executable already registered");
            }
        }
        ExeAction::Remove { path } => {
            if !registry.remove(&path).map_err(|e| e.to_string())? {
                return Err(format!("Executable is not registered: {}", path.display()));
            }
        }
        ExeAction::Default { path } => {
            registry.set_default(&path).map_err(|e| e.to_string())?;
        }
    }

    config.executables = registry.to_config();
    let written = loader.save(&config).map_err(|e| e.to_string())?;
    tracing::info!(path = %written.display(), "Executable registry saved");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let loader = config_loader(cli.config);

    match cli.command {
        Commands::Run {
            launch,
            protocol,
            json,
        } => {
            let config = match loader.load() {
                Ok(config) => config,
                Err(e) => {
                    display::print_error(&e.to_string());
                    return ExitCode::FAILURE;
                }
            };
            let protocol = protocol.map_or(config.protocol, ProgressProtocol::from);
            match build_command(launch, &config) {
                Ok(command) => run_simulation(&command, protocol, json).await,
                Err(e) => {
                    display::print_error(&e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Args { launch } => {
            let command = loader
                .load()
                .map_err(|e| e.to_string())
                .and_then(|config| build_command(launch, &config));
            match command {
                Ok(command) => {
                    for arg in command.argv() {
                        println!("{arg}");
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    display::print_error(&e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Exe { action } => match manage_executables(&loader, action) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                display::print_error(&e);
                ExitCode::FAILURE
            }
        },
    }
}
