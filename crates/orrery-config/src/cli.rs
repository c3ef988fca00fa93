//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Headless orrery run. Flags override values from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "orrery", about = "Orbital simulation renderer")]
pub struct CliArgs {
    /// Viewport width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Viewport height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Simulation years per wall second.
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Number of debris rocks.
    #[arg(long)]
    pub debris: Option<u32>,

    /// Frames to render before exiting.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Start with the simulation clock paused.
    #[arg(long)]
    pub paused: bool,

    /// Log filter (error, warn, info, debug, trace or a directive list).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Config directory (defaults to the platform config dir).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply command-line overrides on top of a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(w) = args.width {
            self.window.width = w;
        }
        if let Some(h) = args.height {
            self.window.height = h;
        }
        if let Some(scale) = args.time_scale {
            self.simulation.time_scale = scale;
        }
        if let Some(count) = args.debris {
            self.debris.count = count;
        }
        if let Some(frames) = args.frames {
            self.simulation.frames = frames;
        }
        if args.paused {
            self.simulation.start_paused = true;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let mut config = Config::default();
        let args = CliArgs::parse_from([
            "orrery",
            "--width",
            "1920",
            "--time-scale",
            "4",
            "--debris",
            "50000",
            "--paused",
        ]);
        config.apply_cli_overrides(&args);
        assert_eq!(config.window.width, 1920);
        assert_eq!(config.simulation.time_scale, 4.0);
        assert_eq!(config.debris.count, 50_000);
        assert!(config.simulation.start_paused);
        assert_eq!(config.window.height, 720);
    }

    #[test]
    fn test_no_flags_no_change() {
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::parse_from(["orrery"]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_config_dir_flag() {
        let args = CliArgs::parse_from([
            "orrery",
            "--config",
            "/tmp/orrery",
            "--log-level",
            "debug",
        ]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/orrery")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
