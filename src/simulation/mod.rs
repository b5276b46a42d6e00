//! Simulator launch, output parsing and process supervision.

mod events;
mod parser;
mod process;
mod supervisor;

pub use events::*;
pub use parser::*;
pub use process::*;
pub use supervisor::*;
