//! Classical orbital elements for a body relative to its parent.

use std::cell::OnceCell;

/// Errors reported by [`OrbitalElements::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ElementsError {
    /// Semi-major axis is zero, negative, or not finite.
    #[error("semi-major axis must be positive and finite, got {0}")]
    InvalidSemiMajorAxis(f64),

    /// Eccentricity lies outside the elliptical range `[0, 1)`.
    #[error("eccentricity must lie in [0, 1), got {0}")]
    UnboundEccentricity(f64),
}

/// Orbital elements in normalized units (AU, central mass = 1).
///
/// Angles are stored in degrees, the way body tables are usually written.
/// The orbital period is derived from the semi-major axis on first use and
/// cached for the lifetime of the value.
#[derive(Clone, Debug, Default)]
pub struct OrbitalElements {
    /// Semi-major axis in AU.
    pub semi_major_axis: f64,
    /// Eccentricity, expected in `[0, 1)`.
    pub eccentricity: f64,
    /// Inclination to the reference plane, degrees.
    pub inclination: f64,
    /// Argument of periapsis, degrees.
    pub argument_periapsis: f64,
    /// Longitude of the ascending node, degrees.
    pub ascending_node: f64,
    /// Mean anomaly at epoch, degrees.
    pub mean_anomaly_epoch: f64,
    period: OnceCell<f64>,
}

impl OrbitalElements {
    /// Elements with the ascending node left at zero.
    pub fn new(
        semi_major_axis: f64,
        eccentricity: f64,
        inclination: f64,
        argument_periapsis: f64,
        mean_anomaly_epoch: f64,
    ) -> Self {
        Self {
            semi_major_axis,
            eccentricity,
            inclination,
            argument_periapsis,
            ascending_node: 0.0,
            mean_anomaly_epoch,
            period: OnceCell::new(),
        }
    }

    /// Set the longitude of the ascending node (degrees).
    pub fn with_ascending_node(mut self, degrees: f64) -> Self {
        self.ascending_node = degrees;
        self
    }

    /// Override the derived period, for orbits about a body other than the
    /// unit central mass (moons).
    pub fn with_period(mut self, period: f64) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(period);
        self.period = cell;
        self
    }

    /// A circular, uninclined orbit of radius `a` starting at periapsis.
    pub fn circular(semi_major_axis: f64) -> Self {
        Self::new(semi_major_axis, 0.0, 0.0, 0.0, 0.0)
    }

    /// Orbital period `a^1.5` in simulation time units (years for AU).
    ///
    /// Computed once and cached.
    pub fn period(&self) -> f64 {
        *self
            .period
            .get_or_init(|| self.semi_major_axis.abs().powf(1.5))
    }

    /// Check that the elements describe a bound, non-degenerate ellipse.
    ///
    /// The solver tolerates invalid input, so this is meant for loaders that
    /// want to reject bad rows before they reach the simulation.
    pub fn validate(&self) -> Result<(), ElementsError> {
        let a = self.semi_major_axis;
        if !a.is_finite() || a <= 0.0 {
            return Err(ElementsError::InvalidSemiMajorAxis(a));
        }
        let e = self.eccentricity;
        if !(0.0..1.0).contains(&e) {
            return Err(ElementsError::UnboundEccentricity(e));
        }
        Ok(())
    }
}

impl PartialEq for OrbitalElements {
    fn eq(&self, other: &Self) -> bool {
        self.semi_major_axis == other.semi_major_axis
            && self.eccentricity == other.eccentricity
            && self.inclination == other.inclination
            && self.argument_periapsis == other.argument_periapsis
            && self.ascending_node == other.ascending_node
            && self.mean_anomaly_epoch == other.mean_anomaly_epoch
    }
}
