//! Headless orrery: simulate the demo system and render it offscreen.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use orrery_app::{FixedStepDriver, PlatformDirs, Simulation, demo};
use orrery_config::{CliArgs, Config};
use orrery_render::GpuContext;
use tracing::{debug, error, info, warn};

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let dirs = match &args.config {
        Some(dir) => PlatformDirs::with_config_dir(dir),
        None => match PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve platform directories: {e}");
                return ExitCode::FAILURE;
            }
        },
    };

    let mut config = match Config::load_or_create(&dirs.config_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", dirs.config_dir.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args);

    orrery_log::init_logging(Some(&dirs.log_dir), cfg!(debug_assertions), Some(&config));
    let title = config.window.title.as_str();
    info!(title, config_dir = %dirs.config_dir.display(), "Orrery starting");

    let mut sim = Simulation::new(&config);
    if let Err(e) = demo::populate(&mut sim, &config) {
        error!("Failed to build demo system: {e}");
        return ExitCode::FAILURE;
    }

    match GpuContext::try_headless() {
        Some(ctx) => sim.attach(&ctx),
        None => warn!("Running without a GPU; only the simulation will advance"),
    }

    let frames = config.simulation.frames;
    let mut driver = FixedStepDriver::new(config.simulation.fixed_dt);
    let started = Instant::now();
    for frame in 0..frames {
        driver.tick(|dt| sim.tick(dt));
        sim.render();
        if frame % 120 == 0 {
            let stats = sim.stats();
            debug!(
                frame,
                time = stats.time,
                visible_labels = stats.visible_labels,
                "frame"
            );
        }
    }

    let wall = started.elapsed().as_secs_f64();
    let stats = sim.stats();
    info!(
        title = config.window.title.as_str(),
        frames,
        steps = driver.step_count(),
        wall_seconds = wall,
        fps = if wall > 0.0 { frames as f64 / wall } else { 0.0 },
        sim_years = stats.time,
        bodies = stats.bodies,
        instances = stats.instances,
        groups = stats.instance_groups,
        trails = stats.trails,
        debris = stats.debris,
        visible_labels = stats.visible_labels,
        "Run complete"
    );
    sim.dispose();
    ExitCode::SUCCESS
}
