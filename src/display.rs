//! Colored CLI display utilities for simulation output.
//!
//! This module provides functions for printing colored, formatted output
//! to the terminal while a simulation runs.

use std::io::{self, Write};
use std::path::Path;

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::simulation::{Progress, RunOutcome};

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Width of the textual progress bar, in cells.
const BAR_WIDTH: usize = 30;

/// Render a fixed-width bar for a percentage, clamped to 100.
#[must_use]
pub fn progress_bar(percent: u32) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * BAR_WIDTH / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// Format a progress value for one status line.
#[must_use]
pub fn format_progress(progress: &Progress) -> String {
    match progress {
        Progress::Percent { value } => format!("{} {:>3}%", progress_bar(*value), value),
        Progress::RoundStep { .. } => progress.to_string(),
    }
}

/// Format an outcome as a short sentence.
#[must_use]
pub fn format_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Success => "Simulation finished successfully".to_string(),
        RunOutcome::AbnormalExit { return_code } => {
            format!("Simulation failed with exit code {return_code}")
        }
        RunOutcome::Cancelled { return_code } => {
            format!("Simulation cancelled (exit code {return_code})")
        }
    }
}

/// Print simulation start information.
pub fn print_run_start(executable: &str, output_dir: &Path) {
    println!(
        "{} {} {} -> {}",
        timestamp().dimmed(),
        "[START]".blue().bold(),
        executable.cyan(),
        output_dir.display().dimmed()
    );
    let _ = io::stdout().flush();
}

/// Print a progress change.
pub fn print_progress(progress: &Progress) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[PROGRESS]".green().bold(),
        format_progress(progress)
    );
    let _ = io::stdout().flush();
}

/// Print notice that a termination request was sent.
pub fn print_terminate_requested() {
    println!(
        "{} {} Stopping simulation...",
        timestamp().dimmed(),
        "[STOP]".yellow().bold()
    );
    let _ = io::stdout().flush();
}

/// Print the final outcome.
pub fn print_outcome(outcome: &RunOutcome) {
    let ts = timestamp();
    let text = format_outcome(outcome);
    match outcome {
        RunOutcome::Success => println!("{} {} {}", ts.dimmed(), "[DONE]".green().bold(), text),
        RunOutcome::AbnormalExit { .. } => {
            println!("{} {} {}", ts.dimmed(), "[FAILED]".red().bold(), text.red());
        }
        RunOutcome::Cancelled { .. } => {
            println!("{} {} {}", ts.dimmed(), "[CANCELLED]".yellow().bold(), text);
        }
    }
    let _ = io::stdout().flush();
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message.red());
}
