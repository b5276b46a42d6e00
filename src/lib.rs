//! Symba - launch, monitor and cancel runs of the Symba market simulator.

pub mod config;
pub mod display;
pub mod simulation;
