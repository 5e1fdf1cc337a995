//! Configuration management for the loader.
//!
//! Provides environment detection, configuration loading from JSON/YAML files and
//! environment variables, secret handling and the shared configuration types of the target.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
