//! Runtime settings for the orrery.
//!
//! Settings persist as `config.ron` in a config directory. Every section
//! falls back to its defaults when missing, unknown fields are ignored, and
//! command-line flags override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebrisConfig, DebugConfig, InstancingConfig, LabelsConfig, ScalingConfig,
    SimulationConfig, TrailsConfig, WindowConfig,
};
pub use error::ConfigError;
