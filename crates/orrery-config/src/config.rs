//! Settings sections with defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level orrery configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub simulation: SimulationConfig,
    /// Distance compression zones.
    pub scaling: ScalingConfig,
    pub trails: TrailsConfig,
    pub instancing: InstancingConfig,
    pub debris: DebrisConfig,
    pub labels: LabelsConfig,
    pub debug: DebugConfig,
}

/// Viewport settings. The headless binary renders at this size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    /// Run name, logged at startup and with the final stats.
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulation years per wall second.
    pub time_scale: f64,
    pub start_paused: bool,
    /// Fixed simulation step in wall seconds.
    pub fixed_dt: f64,
    /// Use each body's longitude of the ascending node instead of zero.
    pub honor_ascending_node: bool,
    /// Multiplier on moon offsets so they clear their parent's mesh.
    pub moon_orbit_exaggeration: f64,
    /// Frames rendered by the headless binary before exiting.
    pub frames: u32,
}

/// Three-zone distance compression, see `CoordinateScaler`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScalingConfig {
    /// End of the linear zone, AU.
    pub inner_limit: f64,
    /// End of the middle logarithmic zone, AU.
    pub outer_limit: f64,
    /// Render units per AU in the linear zone.
    pub scale: f64,
    pub mid_compression: f64,
    pub outer_compression: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrailsConfig {
    pub enabled: bool,
    /// Samples kept per trail.
    pub history_length: u32,
    pub max_trails: u32,
    /// Record one sample every this many ticks.
    pub update_interval: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstancingConfig {
    pub max_instances_per_group: u32,
}

/// Sampling ranges for the debris field. Ranges are `[min, max]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebrisConfig {
    pub count: u32,
    pub seed: u64,
    pub semi_major_axis: [f32; 2],
    pub eccentricity: [f32; 2],
    /// Degrees.
    pub inclination: [f32; 2],
    pub scale: [f32; 2],
    pub tumble_speed: [f32; 2],
    pub color: [f32; 3],
    pub cast_shadows: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LabelsConfig {
    pub enabled: bool,
    pub cell_size_px: f32,
    /// Approximate label box used for collision, pixels.
    pub label_width_px: f32,
    pub label_height_px: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Filter directive, e.g. `"info"` or `"debug,orrery_render=trace"`.
    pub log_level: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Orrery".to_string(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_scale: 0.1,
            start_paused: false,
            fixed_dt: 1.0 / 60.0,
            honor_ascending_node: false,
            moon_orbit_exaggeration: 40.0,
            frames: 600,
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            inner_limit: 30.0,
            outer_limit: 50.0,
            scale: 40.0,
            mid_compression: 1.5,
            outer_compression: 4.0,
        }
    }
}

impl Default for TrailsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            history_length: 512,
            max_trails: 4096,
            update_interval: 2,
        }
    }
}

impl Default for InstancingConfig {
    fn default() -> Self {
        Self {
            max_instances_per_group: 16_384,
        }
    }
}

impl Default for DebrisConfig {
    fn default() -> Self {
        Self {
            count: 2000,
            seed: 0x0dec_af5e,
            semi_major_axis: [2.2, 3.3],
            eccentricity: [0.0, 0.15],
            inclination: [0.0, 12.0],
            scale: [0.4, 1.6],
            tumble_speed: [0.5, 6.0],
            color: [0.55, 0.5, 0.45],
            cast_shadows: false,
        }
    }
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cell_size_px: 64.0,
            label_width_px: 96.0,
            label_height_px: 18.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first if
    /// the file does not exist.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            let config = Self::read(&path)?;
            log::info!("Loaded config from {}", path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            Ok(config)
        }
    }

    /// Write `config.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;
        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)
    }

    /// Re-read `config.ron`. Returns `Some` only if it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
