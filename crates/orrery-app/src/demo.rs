//! Demo solar system: the Sun, eight planets, Pluto and the Moon.
//!
//! Elements are J2000 mean values (AU and degrees). Radii are visual, in
//! render units, and spin periods are in years.

use orrery_config::Config;
use orrery_orbit::OrbitalElements;
use orrery_render::{Material, MaterialId, MeshData};
use orrery_scene::{BodyDesc, BodyId, SystemError};
use tracing::info;

use crate::simulation::Simulation;

struct PlanetRow {
    name: &'static str,
    /// a, e, i, argument of periapsis, ascending node, mean anomaly at epoch.
    elements: [f64; 6],
    radius: f32,
    spin_period: f64,
    axial_tilt: f64,
    color: [f32; 3],
}

const SUN_RADIUS: f32 = 12.0;

const PLANETS: [PlanetRow; 9] = [
    PlanetRow {
        name: "Mercury",
        elements: [0.387_10, 0.205_63, 7.005, 29.124, 48.331, 174.796],
        radius: 1.2,
        spin_period: 0.1607,
        axial_tilt: 0.03,
        color: [0.55, 0.53, 0.5],
    },
    PlanetRow {
        name: "Venus",
        elements: [0.723_33, 0.006_77, 3.395, 54.884, 76.680, 50.115],
        radius: 2.2,
        spin_period: -0.6650,
        axial_tilt: 177.4,
        color: [0.9, 0.8, 0.55],
    },
    PlanetRow {
        name: "Earth",
        elements: [1.000_00, 0.016_71, 0.0, 114.208, -11.261, 358.617],
        radius: 2.4,
        spin_period: 0.002_73,
        axial_tilt: 23.44,
        color: [0.25, 0.45, 0.85],
    },
    PlanetRow {
        name: "Mars",
        elements: [1.523_68, 0.093_39, 1.850, 286.502, 49.558, 19.412],
        radius: 1.6,
        spin_period: 0.002_81,
        axial_tilt: 25.19,
        color: [0.8, 0.4, 0.25],
    },
    PlanetRow {
        name: "Jupiter",
        elements: [5.202_60, 0.048_49, 1.303, 273.867, 100.464, 20.020],
        radius: 7.0,
        spin_period: 0.001_13,
        axial_tilt: 3.13,
        color: [0.8, 0.7, 0.55],
    },
    PlanetRow {
        name: "Saturn",
        elements: [9.554_91, 0.055_51, 2.489, 339.392, 113.665, 317.020],
        radius: 6.0,
        spin_period: 0.001_22,
        axial_tilt: 26.73,
        color: [0.9, 0.82, 0.6],
    },
    PlanetRow {
        name: "Uranus",
        elements: [19.218_4, 0.046_38, 0.773, 96.999, 74.006, 142.238],
        radius: 4.0,
        spin_period: -0.001_97,
        axial_tilt: 97.77,
        color: [0.6, 0.85, 0.9],
    },
    PlanetRow {
        name: "Neptune",
        elements: [30.110_4, 0.009_46, 1.770, 273.187, 131.784, 256.228],
        radius: 3.9,
        spin_period: 0.001_83,
        axial_tilt: 28.32,
        color: [0.3, 0.45, 0.9],
    },
    PlanetRow {
        name: "Pluto",
        elements: [39.482_1, 0.248_83, 17.140, 113.834, 110.299, 14.53],
        radius: 0.9,
        spin_period: -0.0175,
        axial_tilt: 122.53,
        color: [0.55, 0.53, 0.5],
    },
];

/// The Moon about the Earth. Its period overrides the heliocentric
/// `a^1.5` law.
const MOON_ELEMENTS: [f64; 6] = [0.002_57, 0.0549, 5.145, 318.15, 125.08, 135.27];
const MOON_PERIOD: f64 = 0.0748;

/// Handles of the bodies the demo registered.
#[derive(Debug, Clone)]
pub struct DemoSystem {
    pub sun: BodyId,
    pub planets: Vec<BodyId>,
    pub moon: BodyId,
}

fn elements([a, e, i, w, node, m0]: [f64; 6]) -> OrbitalElements {
    OrbitalElements::new(a, e, i, w, m0).with_ascending_node(node)
}

/// One lit material per distinct colour.
fn lit_material(
    sim: &mut Simulation,
    cache: &mut Vec<([f32; 3], MaterialId)>,
    color: [f32; 3],
) -> MaterialId {
    if let Some(&(_, id)) = cache.iter().find(|(c, _)| *c == color) {
        return id;
    }
    let id = sim.resources_mut().add_material(Material::lit(color));
    cache.push((color, id));
    id
}

/// Register the demo bodies with `sim`.
///
/// All bodies share one sphere mesh. Bodies with the same colour share a
/// material and so land in the same instance group.
pub fn populate(sim: &mut Simulation, config: &Config) -> Result<DemoSystem, SystemError> {
    let resources = sim.resources_mut();
    let sphere = resources.add_geometry("sphere", MeshData::icosphere(3));
    let sun_material = resources.add_material(Material::emissive([1.0, 0.85, 0.55]));

    let mut materials = Vec::new();

    let sun = sim.add_body(
        BodyDesc::new("Sun").with_radius(SUN_RADIUS).with_spin(0.07, 7.25),
        sphere,
        sun_material,
        None,
    )?;

    let mut planets = Vec::with_capacity(PLANETS.len());
    let mut earth = None;
    for row in &PLANETS {
        let material = lit_material(sim, &mut materials, row.color);
        let [r, g, b] = row.color;
        let id = sim.add_body(
            BodyDesc::new(row.name)
                .with_orbit(elements(row.elements))
                .with_radius(row.radius)
                .with_spin(row.spin_period, row.axial_tilt),
            sphere,
            material,
            Some([r, g, b, 0.8]),
        )?;
        if row.name == "Earth" {
            earth = Some(id);
        }
        planets.push(id);
    }

    let moon_material = lit_material(sim, &mut materials, [0.55, 0.53, 0.5]);
    let mut moon_desc = BodyDesc::new("Moon")
        .with_orbit(elements(MOON_ELEMENTS).with_period(MOON_PERIOD))
        .with_radius(0.65)
        .with_spin(MOON_PERIOD, 6.68)
        .with_orbit_exaggeration(config.simulation.moon_orbit_exaggeration);
    if let Some(earth) = earth {
        moon_desc = moon_desc.with_parent(earth);
    }
    let moon = sim.add_body(moon_desc, sphere, moon_material, None)?;

    let stats = sim.stats();
    info!(
        bodies = stats.bodies,
        groups = stats.instance_groups,
        trails = stats.trails,
        "Demo system populated"
    );
    Ok(DemoSystem { sun, planets, moon })
}
