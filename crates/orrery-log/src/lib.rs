//! Tracing setup for the orrery binary.
//!
//! Console output is always on. Debug builds can additionally write a JSON
//! log file for later inspection. `RUST_LOG` wins over the configured level.

use std::path::{Path, PathBuf};

use orrery_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// Name of the JSON log written into the log directory.
pub const LOG_FILE_NAME: &str = "orrery.log";

/// Filter directive from the config, or [`DEFAULT_FILTER`] when unset.
pub fn filter_directive(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.clone()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Where the JSON file log goes, if file logging applies to this run.
pub fn file_log_path(log_dir: Option<&Path>, debug_build: bool) -> Option<PathBuf> {
    if !debug_build {
        return None;
    }
    log_dir.map(|dir| dir.join(LOG_FILE_NAME))
}

/// Install the global subscriber.
///
/// Call once at startup. If the log file cannot be created, logging falls
/// back to console only.
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let directive = filter_directive(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if let Some(path) = file_log_path(log_dir, debug_build)
        && let Some(dir) = path.parent()
        && std::fs::create_dir_all(dir).is_ok()
        && let Ok(file) = std::fs::File::create(&path)
    {
        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();
        subscriber.with(file_layer).init();
        tracing::debug!(path = %path.display(), "JSON file logging enabled");
        return;
    }

    subscriber.init();
}
