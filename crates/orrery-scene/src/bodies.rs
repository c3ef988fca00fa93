//! Tracked bodies: orbital elements bound to pivot transforms.
//!
//! Each body owns two nodes. The pivot is a graph root placed at the body's
//! scaled position; the mesh node hangs under it and carries spin, axial tilt
//! and visual radius. Moons are not parented in the graph: a child's physical
//! position is its own solved offset plus the parent's physical position at
//! the same instant, and only the sum is scaled.

use glam::{DVec3, Quat, Vec3};
use orrery_orbit::{CoordinateScaler, OrbitalElements, OrbitalSolver};
use tracing::debug;

use crate::graph::{NodeId, SceneGraph, Transform};

/// Handle to a body in a [`BodySystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(usize);

impl BodyId {
    /// Registration index of the body.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Errors raised while assembling a body hierarchy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SystemError {
    /// The parent handle does not refer to a registered body.
    #[error("body '{name}' refers to unknown parent #{parent}")]
    UnknownParent { name: String, parent: usize },
}

/// Visual rotation of a body about its own axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpinState {
    /// Sidereal rotation period in simulation time units. Zero disables spin.
    pub period: f64,
    /// Axial tilt in degrees.
    pub axial_tilt: f64,
    /// Current spin angle in radians, kept in `[0, TAU)`.
    pub angle: f64,
}

impl SpinState {
    fn advance(&mut self, dt: f64) {
        if self.period != 0.0 {
            self.angle = (self.angle + std::f64::consts::TAU * dt / self.period)
                .rem_euclid(std::f64::consts::TAU);
        }
    }

    /// Orientation of the mesh: tilt about +z, then spin about the tilted axis.
    pub fn rotation(&self) -> Quat {
        let tilt = Quat::from_rotation_z(self.axial_tilt.to_radians() as f32);
        tilt * Quat::from_rotation_y(self.angle as f32)
    }
}

/// Description of a body to register.
#[derive(Debug, Clone)]
pub struct BodyDesc {
    pub name: String,
    /// `None` keeps the body fixed at its parent (or the origin).
    pub elements: Option<OrbitalElements>,
    pub parent: Option<BodyId>,
    /// Mesh radius in render units.
    pub radius: f32,
    pub spin_period: f64,
    pub axial_tilt: f64,
    /// Multiplier on the body's own orbital offset before the parent position
    /// is added.
    pub orbit_exaggeration: f64,
}

impl BodyDesc {
    /// A stationary body of unit radius.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            elements: None,
            parent: None,
            radius: 1.0,
            spin_period: 0.0,
            axial_tilt: 0.0,
            orbit_exaggeration: 1.0,
        }
    }

    pub fn with_orbit(mut self, elements: OrbitalElements) -> Self {
        self.elements = Some(elements);
        self
    }

    pub fn with_parent(mut self, parent: BodyId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_spin(mut self, period: f64, axial_tilt: f64) -> Self {
        self.spin_period = period;
        self.axial_tilt = axial_tilt;
        self
    }

    pub fn with_orbit_exaggeration(mut self, factor: f64) -> Self {
        self.orbit_exaggeration = factor;
        self
    }
}

/// A registered body and the transforms it drives.
#[derive(Debug, Clone)]
pub struct TrackedBody {
    pub name: String,
    pub elements: Option<OrbitalElements>,
    pub parent: Option<BodyId>,
    /// Graph root placed at the scaled position.
    pub pivot: NodeId,
    /// Child of `pivot` carrying spin and radius; this is what gets drawn.
    pub mesh: NodeId,
    pub spin: SpinState,
    pub radius: f32,
    orbit_exaggeration: f64,
}

/// Owns the tracked bodies and writes their transforms every tick.
#[derive(Debug, Default)]
pub struct BodySystem {
    solver: OrbitalSolver,
    scaler: CoordinateScaler,
    bodies: Vec<TrackedBody>,
    physical: Vec<DVec3>,
}

impl BodySystem {
    /// An empty system using the given solver and scaler.
    pub fn new(solver: OrbitalSolver, scaler: CoordinateScaler) -> Self {
        Self {
            solver,
            scaler,
            bodies: Vec::new(),
            physical: Vec::new(),
        }
    }

    /// Register a body, allocating its pivot and mesh nodes in `graph`.
    ///
    /// Parents must be registered first.
    pub fn add_body(
        &mut self,
        graph: &mut SceneGraph,
        desc: BodyDesc,
    ) -> Result<BodyId, SystemError> {
        if let Some(parent) = desc.parent
            && parent.index() >= self.bodies.len()
        {
            return Err(SystemError::UnknownParent {
                name: desc.name,
                parent: parent.index(),
            });
        }

        let pivot = graph.add_node(None, Transform::IDENTITY);
        let spin = SpinState {
            period: desc.spin_period,
            axial_tilt: desc.axial_tilt,
            angle: 0.0,
        };
        let mesh = graph.add_node(
            Some(pivot),
            Transform {
                rotation: spin.rotation(),
                scale: Vec3::splat(desc.radius),
                ..Transform::IDENTITY
            },
        );

        let id = BodyId(self.bodies.len());
        debug!(body = %desc.name, index = id.index(), "registered body");
        self.bodies.push(TrackedBody {
            name: desc.name,
            elements: desc.elements,
            parent: desc.parent,
            pivot,
            mesh,
            spin,
            radius: desc.radius,
            orbit_exaggeration: desc.orbit_exaggeration,
        });
        self.physical.push(DVec3::ZERO);
        Ok(id)
    }

    /// Number of bodies.
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether no bodies are registered.
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    /// Look up a body.
    pub fn body(&self, id: BodyId) -> Option<&TrackedBody> {
        self.bodies.get(id.index())
    }

    /// Iterate bodies with their handles, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, &TrackedBody)> {
        self.bodies.iter().enumerate().map(|(i, b)| (BodyId(i), b))
    }

    /// Find a body by name.
    pub fn find(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().position(|b| b.name == name).map(BodyId)
    }

    /// The scaler used for render positions.
    pub fn scaler(&self) -> &CoordinateScaler {
        &self.scaler
    }

    /// The CPU solver.
    pub fn solver(&self) -> &OrbitalSolver {
        &self.solver
    }

    /// Physical position (AU) of a body at time `t`, including its parents.
    pub fn physical_position(&self, id: BodyId, t: f64) -> DVec3 {
        let mut total = DVec3::ZERO;
        let mut cursor = self.bodies.get(id.index());
        while let Some(body) = cursor {
            total += self.own_offset(body, t);
            cursor = body.parent.and_then(|p| self.bodies.get(p.index()));
        }
        total
    }

    /// Physical position computed by the last [`update`](Self::update).
    pub fn last_physical_position(&self, id: BodyId) -> Option<DVec3> {
        self.physical.get(id.index()).copied()
    }

    fn own_offset(&self, body: &TrackedBody, t: f64) -> DVec3 {
        body.elements
            .as_ref()
            .map(|el| self.solver.solve(el, t) * body.orbit_exaggeration)
            .unwrap_or(DVec3::ZERO)
    }

    /// Solve every body at time `t`, advance spins by the scaled step
    /// `sim_dt`, and write pivot and mesh local transforms.
    ///
    /// World transforms are not settled here; call
    /// [`SceneGraph::update_world_transforms`] afterwards.
    pub fn update(&mut self, graph: &mut SceneGraph, t: f64, sim_dt: f64) {
        for i in 0..self.bodies.len() {
            let own = self.own_offset(&self.bodies[i], t);
            // Parents precede children, so their position for `t` is already in place.
            let parent = self.bodies[i]
                .parent
                .map(|p| self.physical[p.index()])
                .unwrap_or(DVec3::ZERO);
            let physical = own + parent;
            self.physical[i] = physical;

            let body = &mut self.bodies[i];
            body.spin.advance(sim_dt);
            graph.set_translation(body.pivot, self.scaler.to_visual(physical).as_vec3());
            graph.set_rotation(body.mesh, body.spin.rotation());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> (SceneGraph, BodySystem) {
        (
            SceneGraph::new(),
            BodySystem::new(OrbitalSolver::new(), CoordinateScaler::default()),
        )
    }

    #[test]
    fn test_stationary_body_stays_at_origin() {
        let (mut graph, mut bodies) = system();
        let sun = bodies.add_body(&mut graph, BodyDesc::new("Sun").with_radius(5.0)).unwrap();
        bodies.update(&mut graph, 3.7, 0.1);
        graph.update_world_transforms();
        let b = bodies.body(sun).unwrap();
        assert_eq!(graph.world_position(b.pivot), Vec3::ZERO);
        assert_eq!(graph.world_position(b.mesh), Vec3::ZERO);
    }

    #[test]
    fn test_pivot_is_scaled_solution() {
        let (mut graph, mut bodies) = system();
        let el = OrbitalElements::new(1.0, 0.0167, 0.0, 0.0, 358.61);
        let earth = bodies
            .add_body(&mut graph, BodyDesc::new("Earth").with_orbit(el.clone()))
            .unwrap();
        bodies.update(&mut graph, 0.3, 0.0);
        graph.update_world_transforms();

        let expected = CoordinateScaler::default()
            .to_visual(OrbitalSolver::new().solve(&el, 0.3))
            .as_vec3();
        let pivot = bodies.body(earth).unwrap().pivot;
        assert!((graph.world_position(pivot) - expected).length() < 1e-4);
    }

    #[test]
    fn test_moon_adds_parent_position_before_scaling() {
        let (mut graph, mut bodies) = system();
        let earth_el = OrbitalElements::new(1.0, 0.0, 0.0, 0.0, 0.0);
        let moon_el = OrbitalElements::circular(0.00257);
        let earth = bodies
            .add_body(&mut graph, BodyDesc::new("Earth").with_orbit(earth_el.clone()))
            .unwrap();
        let moon = bodies
            .add_body(
                &mut graph,
                BodyDesc::new("Moon").with_orbit(moon_el.clone()).with_parent(earth),
            )
            .unwrap();

        let t = 0.2;
        bodies.update(&mut graph, t, 0.0);
        let solver = OrbitalSolver::new();
        let expected = solver.solve(&earth_el, t) + solver.solve(&moon_el, t);
        let got = bodies.last_physical_position(moon).unwrap();
        assert!((got - expected).length() < 1e-12);
        assert!((bodies.physical_position(moon, t) - expected).length() < 1e-12);
    }

    #[test]
    fn test_orbit_exaggeration_scales_own_offset_only() {
        let (mut graph, mut bodies) = system();
        let earth = bodies
            .add_body(
                &mut graph,
                BodyDesc::new("Earth").with_orbit(OrbitalElements::circular(1.0)),
            )
            .unwrap();
        let moon = bodies
            .add_body(
                &mut graph,
                BodyDesc::new("Moon")
                    .with_orbit(OrbitalElements::circular(0.01))
                    .with_parent(earth)
                    .with_orbit_exaggeration(10.0),
            )
            .unwrap();
        bodies.update(&mut graph, 0.0, 0.0);
        let e = bodies.last_physical_position(earth).unwrap();
        let m = bodies.last_physical_position(moon).unwrap();
        assert!(((m - e).length() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let (mut graph, mut bodies) = system();
        let mut other_graph = SceneGraph::new();
        let mut other = BodySystem::default();
        other.add_body(&mut other_graph, BodyDesc::new("a")).unwrap();
        let foreign = other.add_body(&mut other_graph, BodyDesc::new("b")).unwrap();

        let err = bodies
            .add_body(&mut graph, BodyDesc::new("orphan").with_parent(foreign))
            .unwrap_err();
        assert_eq!(
            err,
            SystemError::UnknownParent {
                name: "orphan".into(),
                parent: 1
            }
        );
        assert!(bodies.is_empty());
        assert!(graph.is_empty());
    }

    #[test]
    fn test_spin_advances_with_scaled_step() {
        let (mut graph, mut bodies) = system();
        let id = bodies
            .add_body(&mut graph, BodyDesc::new("Spinner").with_spin(1.0, 0.0))
            .unwrap();
        bodies.update(&mut graph, 0.0, 0.25);
        let angle = bodies.body(id).unwrap().spin.angle;
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        // Paused ticks pass a zero step.
        bodies.update(&mut graph, 0.0, 0.0);
        assert!((bodies.body(id).unwrap().spin.angle - angle).abs() < 1e-15);
    }

    #[test]
    fn test_mesh_carries_radius_scale() {
        let (mut graph, mut bodies) = system();
        let id = bodies
            .add_body(&mut graph, BodyDesc::new("Big").with_radius(4.0))
            .unwrap();
        graph.update_world_transforms();
        let m = graph.world_transform(bodies.body(id).unwrap().mesh);
        assert!((m.x_axis.length() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn test_find_by_name() {
        let (mut graph, mut bodies) = system();
        bodies.add_body(&mut graph, BodyDesc::new("Sun")).unwrap();
        let mars = bodies.add_body(&mut graph, BodyDesc::new("Mars")).unwrap();
        assert_eq!(bodies.find("Mars"), Some(mars));
        assert_eq!(bodies.find("Vulcan"), None);
    }
}
