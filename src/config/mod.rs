//! Configuration Management
//!
//! Hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (<config dir>/docpilot/config.toml)
//! 3. Project config (.docpilot/config.toml, or `--config`)
//! 4. Environment variables (DOCPILOT_*)
//! 5. CLI arguments (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
