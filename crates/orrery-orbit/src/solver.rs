//! Keplerian position solver: orbital elements + time -> heliocentric position.

use glam::DVec3;

use crate::OrbitalElements;

/// Newton-Raphson iteration cap for Kepler's equation.
pub const KEPLER_MAX_ITERATIONS: u32 = 15;

/// Convergence threshold on the eccentric-anomaly step, radians.
pub const KEPLER_TOLERANCE: f64 = 1e-12;

/// Largest eccentricity the solver evaluates; higher values are clamped.
pub const MAX_ECCENTRICITY: f64 = 0.999_999;

/// How the solver treats the longitude of the ascending node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AscendingNode {
    /// Ignore the elements' node and use this value (degrees) for every body.
    Fixed(f64),
    /// Use each body's own `ascending_node`.
    FromElements,
}

impl Default for AscendingNode {
    fn default() -> Self {
        Self::Fixed(0.0)
    }
}

/// Solve Kepler's equation `M = E - e sin(E)` for the eccentric anomaly.
///
/// Starts from `E = M` and stops after [`KEPLER_MAX_ITERATIONS`] steps or once
/// the step falls below [`KEPLER_TOLERANCE`]. `mean_anomaly` is in radians.
pub fn solve_kepler(mean_anomaly: f64, eccentricity: f64) -> f64 {
    let mut ecc = mean_anomaly;
    for _ in 0..KEPLER_MAX_ITERATIONS {
        let delta =
            (ecc - eccentricity * ecc.sin() - mean_anomaly) / (1.0 - eccentricity * ecc.cos());
        ecc -= delta;
        if delta.abs() < KEPLER_TOLERANCE {
            break;
        }
    }
    ecc
}

/// CPU orbit evaluator.
///
/// Positions come out in AU in the render frame: the orbital plane's
/// heliocentric `(x, y, z)` with the two non-primary axes swapped, so the
/// reference plane lies in render `x/z` and its normal points along `+y`.
#[derive(Clone, Copy, Debug, Default)]
pub struct OrbitalSolver {
    node: AscendingNode,
}

impl OrbitalSolver {
    /// Solver with the ascending node fixed at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Solver with an explicit ascending-node mode.
    pub fn with_ascending_node(node: AscendingNode) -> Self {
        Self { node }
    }

    /// The ascending-node mode in effect.
    pub fn ascending_node(&self) -> AscendingNode {
        self.node
    }

    /// Position (AU) of a body with `elements` at simulation time `t`.
    ///
    /// Degenerate input never produces non-finite output: a non-positive or
    /// non-finite semi-major axis yields the origin, and eccentricity is
    /// clamped into `[0, MAX_ECCENTRICITY]`.
    pub fn solve(&self, elements: &OrbitalElements, t: f64) -> DVec3 {
        let a = elements.semi_major_axis;
        if !a.is_finite() || a <= 0.0 || !t.is_finite() {
            return DVec3::ZERO;
        }
        let e = elements.eccentricity.clamp(0.0, MAX_ECCENTRICITY);

        let period = elements.period();
        if !period.is_finite() || period <= 0.0 {
            return DVec3::ZERO;
        }
        // Wrap into one period before building the angle so long runs keep precision.
        let wrapped = (t / period).rem_euclid(1.0) * period;
        let mean_anomaly =
            (elements.mean_anomaly_epoch + (360.0 / period) * wrapped).to_radians();
        let mean_anomaly = mean_anomaly.rem_euclid(std::f64::consts::TAU);

        let ecc = solve_kepler(mean_anomaly, e);
        let r = a * (1.0 - e * ecc.cos());
        let true_anomaly = ((1.0 - e * e).sqrt() * ecc.sin()).atan2(ecc.cos() - e);

        let node = match self.node {
            AscendingNode::Fixed(deg) => deg,
            AscendingNode::FromElements => elements.ascending_node,
        };
        orbital_plane_to_frame(
            r,
            true_anomaly,
            elements.argument_periapsis.to_radians(),
            elements.inclination.to_radians(),
            node.to_radians(),
        )
    }
}

/// Rotate a polar position in the orbital plane by periapsis, inclination and
/// node, then swap the non-primary axes into the render frame.
fn orbital_plane_to_frame(r: f64, true_anomaly: f64, w: f64, i: f64, node: f64) -> DVec3 {
    let x_orb = r * true_anomaly.cos();
    let y_orb = r * true_anomaly.sin();

    let (sin_o, cos_o) = node.sin_cos();
    let (sin_i, cos_i) = i.sin_cos();
    let (sin_w, cos_w) = w.sin_cos();

    let x = x_orb * (cos_o * cos_w - sin_o * sin_w * cos_i)
        - y_orb * (cos_o * sin_w + sin_o * cos_w * cos_i);
    let y = x_orb * (sin_o * cos_w + cos_o * sin_w * cos_i)
        - y_orb * (sin_o * sin_w - cos_o * cos_w * cos_i);
    let z = x_orb * (sin_w * sin_i) + y_orb * (cos_w * sin_i);

    DVec3::new(x, z, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn earth() -> OrbitalElements {
        OrbitalElements::new(1.0, 0.0167, 0.0, 0.0, 358.61)
    }

    #[test]
    fn test_kepler_residual_is_tiny() {
        for &(m, e) in &[(0.3, 0.0167), (2.5, 0.2), (5.9, 0.6), (1.0, 0.85)] {
            let ecc = solve_kepler(m, e);
            let residual = ecc - e * ecc.sin() - m;
            assert!(residual.abs() < 1e-9, "m={m} e={e} residual={residual}");
        }
    }

    #[test]
    fn test_kepler_circular_is_identity() {
        for i in 0..16 {
            let m = i as f64 * 0.4;
            assert!((solve_kepler(m, 0.0) - m).abs() < 1e-15);
        }
    }

    #[test]
    fn test_position_is_periodic() {
        let solver = OrbitalSolver::new();
        let cases = [
            OrbitalElements::new(1.0, 0.0167, 0.0, 102.9, 358.61),
            OrbitalElements::new(0.387, 0.2056, 7.0, 29.1, 174.8),
            OrbitalElements::new(5.2, 0.0489, 1.3, 273.9, 20.0),
            OrbitalElements::new(2.7, 0.6, 12.0, 80.0, 45.0),
            OrbitalElements::new(17.8, 0.89, 30.0, 111.0, 200.0),
        ];
        for el in &cases {
            let period = el.period();
            for k in 0..8 {
                let t = k as f64 * 0.37;
                let p0 = solver.solve(el, t);
                let p1 = solver.solve(el, t + period);
                let tol = el.semi_major_axis * 1e-6;
                assert!(
                    (p0 - p1).length() < tol,
                    "a={} e={} t={t}: {p0} vs {p1}",
                    el.semi_major_axis,
                    el.eccentricity
                );
            }
        }
    }

    #[test]
    fn test_circular_orbit_has_constant_radius() {
        let solver = OrbitalSolver::new();
        let el = OrbitalElements::new(3.0, 0.0, 17.0, 40.0, 10.0);
        for i in 0..50 {
            let t = i as f64 * el.period() / 50.0;
            let r = solver.solve(&el, t).length();
            assert!((r - 3.0).abs() < 1e-9, "t={t} r={r}");
        }
    }

    #[test]
    fn test_half_period_reaches_opposite_side() {
        let solver = OrbitalSolver::new();
        let el = earth();
        assert!((el.period() - 1.0).abs() < 1e-12);

        let p0 = solver.solve(&el, 0.0);
        let p_half = solver.solve(&el, 0.5);
        let separation = (p0 - p_half).length();
        let tol = 2.0 * el.semi_major_axis * el.eccentricity + 1e-6;
        assert!(
            (separation - 2.0).abs() < tol,
            "separation {separation} not within {tol} of 2a"
        );
        // Roughly antipodal directions in the orbital plane.
        assert!(p0.normalize().dot(p_half.normalize()) < -0.99);
    }

    #[test]
    fn test_uninclined_orbit_stays_in_render_xz_plane() {
        let solver = OrbitalSolver::new();
        let el = OrbitalElements::new(1.5, 0.1, 0.0, 60.0, 0.0);
        for i in 0..20 {
            let p = solver.solve(&el, i as f64 * 0.1);
            assert!(p.y.abs() < 1e-12, "y = {}", p.y);
        }
    }

    #[test]
    fn test_inclination_lifts_out_of_plane() {
        let solver = OrbitalSolver::new();
        let el = OrbitalElements::new(1.0, 0.0, 90.0, 0.0, 90.0);
        // Quarter orbit past the node on a polar orbit points straight up.
        let p = solver.solve(&el, 0.0);
        assert!((p.y - 1.0).abs() < 1e-9, "p = {p}");
    }

    #[test]
    fn test_large_time_keeps_precision() {
        let solver = OrbitalSolver::new();
        let el = earth();
        let near = solver.solve(&el, 0.25);
        let far = solver.solve(&el, 1_000_000.25);
        assert!((near - far).length() < 1e-6, "{near} vs {far}");
    }

    #[test]
    fn test_negative_time_wraps_forward() {
        let solver = OrbitalSolver::new();
        let el = earth();
        let a = solver.solve(&el, -0.25);
        let b = solver.solve(&el, 0.75);
        assert!((a - b).length() < 1e-9);
    }

    #[test]
    fn test_zero_axis_yields_origin() {
        let solver = OrbitalSolver::new();
        let el = OrbitalElements::circular(0.0);
        assert_eq!(solver.solve(&el, 3.0), DVec3::ZERO);
    }

    #[test]
    fn test_unbound_eccentricity_stays_finite() {
        let solver = OrbitalSolver::new();
        for e in [1.0, 1.5, 40.0] {
            let el = OrbitalElements::new(1.0, e, 0.0, 0.0, 10.0);
            let p = solver.solve(&el, 0.3);
            assert!(p.is_finite(), "e={e} produced {p}");
        }
    }

    #[test]
    fn test_fixed_node_ignores_element_node() {
        let el = OrbitalElements::new(1.0, 0.0, 30.0, 0.0, 45.0).with_ascending_node(120.0);
        let fixed = OrbitalSolver::new().solve(&el, 0.0);
        let plain = OrbitalElements::new(1.0, 0.0, 30.0, 0.0, 45.0);
        let zero = OrbitalSolver::new().solve(&plain, 0.0);
        assert!((fixed - zero).length() < 1e-12);

        let honoured =
            OrbitalSolver::with_ascending_node(AscendingNode::FromElements).solve(&el, 0.0);
        assert!((honoured - fixed).length() > 0.1);
        // Rotating about the reference-plane normal preserves radius.
        assert!((honoured.length() - fixed.length()).abs() < 1e-9);
    }

    #[test]
    fn test_periapsis_and_apoapsis_distances() {
        let solver = OrbitalSolver::new();
        let el = OrbitalElements::new(2.0, 0.5, 0.0, 0.0, 0.0);
        let peri = solver.solve(&el, 0.0).length();
        let apo = solver.solve(&el, el.period() / 2.0).length();
        assert!((peri - 1.0).abs() < 1e-9, "peri {peri}");
        assert!((apo - 3.0).abs() < 1e-9, "apo {apo}");
    }
}
