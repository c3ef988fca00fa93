//! Headless orrery application: wires the orbit, scene, render and label
//! crates into one tick-driven simulation.

pub mod demo;
pub mod driver;
pub mod platform;
pub mod simulation;

pub use driver::{FixedStepDriver, MAX_FRAME_TIME};
pub use platform::{PlatformDirs, PlatformError};
pub use simulation::{BodyTag, Simulation, SimulationStats};
