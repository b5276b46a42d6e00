//! Configuration module.

mod executables;
mod loader;
mod params;
mod types;

pub use executables::*;
pub use loader::*;
pub use params::*;
pub use types::*;
