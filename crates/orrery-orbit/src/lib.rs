//! Two-body Keplerian orbit evaluation and visual distance compression.
//!
//! Bodies never perturb each other: every position is a pure function of a
//! body's [`OrbitalElements`] and the accumulated simulation time held by a
//! [`SimulationClock`]. Physical positions are in AU and are mapped into the
//! bounded render space by a [`CoordinateScaler`].

mod clock;
mod elements;
mod scaler;
mod solver;

pub use clock::SimulationClock;
pub use elements::{ElementsError, OrbitalElements};
pub use scaler::CoordinateScaler;
pub use solver::{
    AscendingNode, KEPLER_MAX_ITERATIONS, KEPLER_TOLERANCE, MAX_ECCENTRICITY, OrbitalSolver,
    solve_kepler,
};
