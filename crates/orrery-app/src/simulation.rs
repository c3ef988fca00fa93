//! One tick-driven simulation context owning every system.
//!
//! Tick order is fixed: clock, body solve, world transforms, instance
//! upload, trail sample, debris time, labels. Trails read the transforms
//! settled in the same tick but are drawn from history, so the newest trail
//! point can trail the body mesh by up to `update_interval` ticks.

use glam::{Mat4, Vec2, Vec3};
use orrery_config::Config;
use orrery_labels::{LabelCandidate, LabelCollisionGrid};
use orrery_orbit::{AscendingNode, CoordinateScaler, OrbitalSolver, SimulationClock};
use orrery_render::{
    Camera, CameraBinding, DebrisDistribution, DebrisField, FrameTarget, GeometryId, GpuContext,
    InstanceBatcher, MaterialId, ResourceRegistry, TrailId, TrailSystem, target::SPACE_BLACK,
};
use orrery_scene::{BodyDesc, BodyId, BodySystem, SceneGraph, SystemError};
use tracing::{debug, info};

/// Per-instance record kept by the batcher for picking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyTag {
    pub body: BodyId,
}

/// Counters logged by the binary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationStats {
    pub time: f64,
    pub ticks: u64,
    pub bodies: usize,
    pub instances: usize,
    pub instance_groups: usize,
    pub trails: usize,
    pub debris: usize,
    pub visible_labels: usize,
}

/// What [`Simulation::add_body`] registered for a body's visuals, kept so
/// registrations dropped by `dispose` can be restored on the next `attach`.
#[derive(Debug, Clone, Copy)]
struct BodyVisual {
    body: BodyId,
    geometry: GeometryId,
    material: MaterialId,
    trail_color: Option<[f32; 4]>,
}

struct SimulationGpu {
    ctx: GpuContext,
    camera: CameraBinding,
    target: FrameTarget,
}

pub struct Simulation {
    clock: SimulationClock,
    graph: SceneGraph,
    bodies: BodySystem,
    resources: ResourceRegistry,
    batcher: InstanceBatcher<BodyTag>,
    trails: TrailSystem,
    trail_ids: Vec<(BodyId, TrailId)>,
    visuals: Vec<BodyVisual>,
    debris: DebrisField,
    labels: LabelCollisionGrid,
    label_candidates: Vec<LabelCandidate>,
    /// Owner of each label candidate, parallel to the grid's placements.
    label_bodies: Vec<BodyId>,
    camera: Camera,
    viewport: (u32, u32),
    trails_enabled: bool,
    labels_enabled: bool,
    label_size: Vec2,
    cast_shadows: bool,
    gpu: Option<SimulationGpu>,
}

impl Simulation {
    /// Build every system from `config`. Nothing touches the GPU until
    /// [`attach`](Self::attach).
    pub fn new(config: &Config) -> Self {
        let s = &config.scaling;
        let scaler = CoordinateScaler::new(
            s.inner_limit,
            s.outer_limit,
            s.scale,
            s.mid_compression,
            s.outer_compression,
        );
        let solver = if config.simulation.honor_ascending_node {
            OrbitalSolver::with_ascending_node(AscendingNode::FromElements)
        } else {
            OrbitalSolver::new()
        };

        let mut clock = SimulationClock::new(config.simulation.time_scale);
        clock.set_paused(config.simulation.start_paused);

        let d = &config.debris;
        let distribution = DebrisDistribution {
            count: d.count,
            seed: d.seed,
            semi_major_axis: d.semi_major_axis,
            eccentricity: d.eccentricity,
            inclination: d.inclination,
            scale: d.scale,
            tumble_speed: d.tumble_speed,
            color: d.color,
        };

        let viewport = (config.window.width.max(1), config.window.height.max(1));
        let mut camera = Camera::look_at(Vec3::new(0.0, 400.0, 1600.0), Vec3::ZERO);
        camera.set_viewport(viewport.0, viewport.1);

        Self {
            clock,
            graph: SceneGraph::new(),
            bodies: BodySystem::new(solver, scaler),
            resources: ResourceRegistry::new(),
            batcher: InstanceBatcher::new(config.instancing.max_instances_per_group as usize),
            trails: TrailSystem::new(config.trails.history_length, config.trails.max_trails)
                .with_update_interval(config.trails.update_interval),
            trail_ids: Vec::new(),
            visuals: Vec::new(),
            debris: DebrisField::new(&distribution, &scaler),
            labels: LabelCollisionGrid::new(config.labels.cell_size_px),
            label_candidates: Vec::new(),
            label_bodies: Vec::new(),
            camera,
            viewport,
            trails_enabled: config.trails.enabled,
            labels_enabled: config.labels.enabled,
            label_size: Vec2::new(config.labels.label_width_px, config.labels.label_height_px),
            cast_shadows: config.debris.cast_shadows,
            gpu: None,
        }
    }

    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// Register a body, batch its mesh under `(geometry, material)` and give
    /// it a trail if `trail_color` is set and trails are enabled.
    ///
    /// Batch or trail capacity exhaustion only drops the visual; the body is
    /// still simulated.
    pub fn add_body(
        &mut self,
        desc: BodyDesc,
        geometry: GeometryId,
        material: MaterialId,
        trail_color: Option<[f32; 4]>,
    ) -> Result<BodyId, SystemError> {
        let id = self.bodies.add_body(&mut self.graph, desc)?;
        // Place it now so the trail is pre-filled at its real position.
        self.bodies.update(&mut self.graph, self.clock.time(), 0.0);
        self.graph.update_world_transforms();

        let visual = BodyVisual {
            body: id,
            geometry,
            material,
            trail_color,
        };
        self.visuals.push(visual);
        self.register_visual(visual);
        Ok(id)
    }

    /// Batch a body's mesh and give it a trail. Registrations that already
    /// exist are left alone.
    fn register_visual(&mut self, visual: BodyVisual) {
        let Some(body) = self.bodies.body(visual.body) else {
            return;
        };
        let (mesh, pivot) = (body.mesh, body.pivot);
        self.batcher.add_instance(
            mesh,
            visual.geometry,
            visual.material,
            BodyTag { body: visual.body },
        );
        if self.trails_enabled
            && let Some(color) = visual.trail_color
            && self.trail_of(visual.body).is_none()
            && let Some(trail) = self.trails.register(&self.graph, pivot, color)
        {
            self.trail_ids.push((visual.body, trail));
        }
    }

    /// Create GPU resources for every system and an offscreen target at the
    /// configured viewport size.
    ///
    /// Attaching again replaces the previous GPU state. Instance and trail
    /// registrations dropped by [`dispose`](Self::dispose) are restored, with
    /// trails restarting from the bodies' current positions.
    pub fn attach(&mut self, ctx: &GpuContext) {
        self.gpu = None;
        for i in 0..self.visuals.len() {
            self.register_visual(self.visuals[i]);
        }

        let camera = CameraBinding::new(&ctx.device);
        let target = FrameTarget::new(&ctx.device, self.viewport.0, self.viewport.1);
        let formats = target.formats();

        self.resources.attach(ctx);
        if let Some(layout) = self.resources.material_layout() {
            self.batcher.attach(ctx, &camera, layout, formats);
        }
        self.batcher.build();
        self.trails.attach(ctx, &camera, formats);
        self.debris.attach(ctx, &camera, formats, self.cast_shadows);
        if self.cast_shadows {
            self.debris.set_light(self.light_view_projection());
        }

        info!(
            width = self.viewport.0,
            height = self.viewport.1,
            "Simulation attached to GPU"
        );
        self.gpu = Some(SimulationGpu {
            ctx: ctx.clone(),
            camera,
            target,
        });
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    /// Top-down orthographic view from the star covering the whole scene.
    fn light_view_projection(&self) -> Mat4 {
        let scaler = self.bodies.scaler();
        let extent = scaler.visual_distance(scaler.outer_limit() * 1.5) as f32;
        let view = Mat4::look_at_rh(Vec3::Y * extent, Vec3::ZERO, Vec3::NEG_Z);
        // Reverse-Z: near and far swapped.
        let proj = Mat4::orthographic_rh(-extent, extent, -extent, extent, extent * 2.0, 0.1);
        proj * view
    }

    /// Advance one fixed step of `dt` wall seconds.
    pub fn tick(&mut self, dt: f64) {
        let sim_dt = self.clock.advance(dt);
        let t = self.clock.time();

        self.bodies.update(&mut self.graph, t, sim_dt);
        self.graph.update_world_transforms();

        self.batcher.build();
        self.batcher.update(&self.graph);
        if self.trails_enabled {
            self.trails.tick(&self.graph);
        }
        self.debris.update(t);
        if self.labels_enabled {
            self.evaluate_labels();
        }
    }

    fn evaluate_labels(&mut self) {
        self.label_candidates.clear();
        self.label_bodies.clear();
        for (id, body) in self.bodies.iter() {
            let anchor = self.graph.world_position(body.pivot) + Vec3::Y * body.radius;
            self.label_candidates.push(LabelCandidate::new(anchor, self.label_size));
            self.label_bodies.push(id);
        }
        self.labels.evaluate(
            self.camera.view_projection_matrix(),
            self.viewport,
            &self.label_candidates,
        );
    }

    /// Record and submit one frame into the offscreen target. Returns `false`
    /// when not attached.
    pub fn render(&self) -> bool {
        let Some(gpu) = &self.gpu else {
            return false;
        };
        gpu.camera.write(&gpu.ctx.queue, &self.camera);

        let mut encoder = gpu
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("orrery-frame"),
            });
        self.debris.render_shadow(&mut encoder);
        {
            let mut pass = gpu.target.begin_pass(&mut encoder, SPACE_BLACK);
            self.batcher
                .render(&mut pass, &self.resources, &gpu.camera.bind_group);
            if self.trails_enabled {
                self.trails.render(&mut pass, &gpu.camera.bind_group);
            }
            self.debris.render(&mut pass, &gpu.camera.bind_group);
        }
        gpu.ctx.queue.submit(std::iter::once(encoder.finish()));
        true
    }

    /// Release every GPU resource. Bodies keep simulating; instance and
    /// trail registrations are dropped with their buffers until the next
    /// [`attach`](Self::attach).
    pub fn dispose(&mut self) {
        if self.gpu.take().is_none() {
            return;
        }
        self.batcher.dispose();
        self.trails.dispose();
        self.trail_ids.clear();
        self.debris.dispose();
        self.resources.dispose();
        debug!("Simulation GPU resources released");
    }

    /// Change the viewport, resizing the target if attached.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
        self.camera.set_viewport(self.viewport.0, self.viewport.1);
        if let Some(gpu) = &mut self.gpu {
            gpu.target
                .resize(&gpu.ctx.device, self.viewport.0, self.viewport.1);
        }
    }

    /// Body under batch slot `(group, index)`, e.g. from a picking pass.
    pub fn pick(&self, group: orrery_render::GroupId, index: u32) -> Option<BodyId> {
        self.batcher.lookup(group, index).map(|(_, tag)| tag.body)
    }

    /// Visibility of each label from the last evaluation, in registration
    /// order. Bodies added since then are not listed until the next tick.
    pub fn label_visibility(&self) -> impl Iterator<Item = (&str, bool)> {
        self.label_bodies
            .iter()
            .zip(self.labels.placements())
            .filter_map(|(&id, p)| Some((self.bodies.body(id)?.name.as_str(), p.visible)))
    }

    pub fn stats(&self) -> SimulationStats {
        SimulationStats {
            time: self.clock.time(),
            ticks: self.clock.ticks(),
            bodies: self.bodies.len(),
            instances: self.batcher.len(),
            instance_groups: self.batcher.group_count(),
            trails: self.trails.len(),
            debris: self.debris.len(),
            visible_labels: self.labels.visible_count(),
        }
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut SimulationClock {
        &mut self.clock
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn bodies(&self) -> &BodySystem {
        &self.bodies
    }

    pub fn batcher(&self) -> &InstanceBatcher<BodyTag> {
        &self.batcher
    }

    pub fn trails(&self) -> &TrailSystem {
        &self.trails
    }

    pub fn trail_of(&self, body: BodyId) -> Option<TrailId> {
        self.trail_ids
            .iter()
            .find(|(b, _)| *b == body)
            .map(|&(_, t)| t)
    }

    pub fn debris(&self) -> &DebrisField {
        &self.debris
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Offscreen target, if attached.
    pub fn target(&self) -> Option<&FrameTarget> {
        self.gpu.as_ref().map(|g| &g.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_orbit::OrbitalElements;
    use orrery_render::{Material, MeshData};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.debris.count = 64;
        config.trails.history_length = 16;
        config.trails.update_interval = 1;
        config.simulation.time_scale = 1.0;
        config
    }

    fn with_planet(config: &Config) -> (Simulation, BodyId, BodyId) {
        let mut sim = Simulation::new(config);
        let sphere = sim.resources_mut().add_geometry("sphere", MeshData::icosphere(1));
        let sun_mat = sim.resources_mut().add_material(Material::emissive([1.0, 0.9, 0.6]));
        let rock = sim.resources_mut().add_material(Material::lit([0.5, 0.5, 0.5]));
        let sun = sim
            .add_body(BodyDesc::new("Sun").with_radius(10.0), sphere, sun_mat, None)
            .unwrap();
        let earth = sim
            .add_body(
                BodyDesc::new("Earth")
                    .with_orbit(OrbitalElements::circular(1.0))
                    .with_radius(2.0),
                sphere,
                rock,
                Some([0.3, 0.5, 1.0, 1.0]),
            )
            .unwrap();
        (sim, sun, earth)
    }

    #[test]
    fn test_add_body_batches_and_trails() {
        let (sim, sun, earth) = with_planet(&small_config());
        assert_eq!(sim.stats().bodies, 2);
        assert_eq!(sim.stats().instances, 2);
        assert_eq!(sim.stats().instance_groups, 2);
        assert_eq!(sim.trails().len(), 1);
        assert_eq!(sim.trail_of(sun), None);
        assert!(sim.trail_of(earth).is_some());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        // A handle minted by a larger system does not exist in this one.
        let mut scratch = Simulation::new(&small_config());
        let sphere = scratch.resources_mut().add_geometry("sphere", MeshData::icosphere(0));
        let grey = scratch.resources_mut().add_material(Material::lit([0.5; 3]));
        let mut foreign = None;
        for i in 0..5 {
            foreign = scratch
                .add_body(BodyDesc::new(format!("b{i}")), sphere, grey, None)
                .ok();
        }

        let (mut sim, _, _) = with_planet(&small_config());
        let err = sim.add_body(
            BodyDesc::new("Ghost").with_parent(foreign.unwrap()),
            sphere,
            grey,
            None,
        );
        assert!(matches!(err, Err(SystemError::UnknownParent { .. })));
        assert_eq!(sim.stats().bodies, 2);
    }

    #[test]
    fn test_tick_settles_instances_from_world_transforms() {
        let (mut sim, _, earth) = with_planet(&small_config());
        for _ in 0..10 {
            sim.tick(0.05);
        }
        let mesh = sim.bodies().body(earth).unwrap().mesh;
        let handle = sim.batcher().handle_of(mesh).unwrap();
        let raw = sim.batcher().instance_transforms(handle.group)[handle.slot as usize];
        let expected = sim.graph().world_transform(mesh);
        assert!(raw.to_matrix().abs_diff_eq(expected, 1e-5));
        assert_eq!(sim.pick(handle.group, handle.slot), Some(earth));
    }

    #[test]
    fn test_trail_samples_pivot_each_tick() {
        let (mut sim, _, earth) = with_planet(&small_config());
        sim.tick(0.1);
        let trail = sim.trail_of(earth).unwrap();
        let pivot = sim.bodies().body(earth).unwrap().pivot;
        let newest = sim.trails().sample(trail, 0).unwrap();
        assert!((newest - sim.graph().world_position(pivot)).length() < 1e-4);
    }

    #[test]
    fn test_pause_freezes_time_but_not_ticks() {
        let mut config = small_config();
        config.simulation.start_paused = true;
        let (mut sim, _, earth) = with_planet(&config);
        let pivot = sim.bodies().body(earth).unwrap().pivot;
        let before = sim.graph().world_position(pivot);
        for _ in 0..5 {
            sim.tick(0.1);
        }
        assert_eq!(sim.clock().time(), 0.0);
        assert_eq!(sim.clock().ticks(), 5);
        assert_eq!(sim.graph().world_position(pivot), before);
        assert_eq!(sim.debris().time(), 0.0);
    }

    #[test]
    fn test_debris_time_follows_clock() {
        let (mut sim, _, _) = with_planet(&small_config());
        sim.tick(0.25);
        assert!((sim.debris().time() - 0.25).abs() < 1e-6);
        assert_eq!(sim.stats().debris, 64);
    }

    #[test]
    fn test_labels_evaluated_per_body() {
        let (mut sim, _, _) = with_planet(&small_config());
        sim.tick(0.0);
        let labels: Vec<_> = sim.label_visibility().collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0], ("Sun", true));
        assert!(sim.stats().visible_labels >= 1);
    }

    #[test]
    fn test_body_added_between_ticks_keeps_label_pairing() {
        let (mut sim, _, _) = with_planet(&small_config());
        sim.tick(0.0);
        let before: Vec<_> = sim
            .label_visibility()
            .map(|(name, v)| (name.to_string(), v))
            .collect();

        let sphere = sim.resources_mut().add_geometry("late", MeshData::icosphere(0));
        let grey = sim.resources_mut().add_material(Material::lit([0.4; 3]));
        sim.add_body(
            BodyDesc::new("Late").with_orbit(OrbitalElements::circular(45.0)),
            sphere,
            grey,
            None,
        )
        .unwrap();
        let pending: Vec<_> = sim
            .label_visibility()
            .map(|(name, v)| (name.to_string(), v))
            .collect();
        assert_eq!(pending, before);

        sim.tick(0.0);
        let names: Vec<_> = sim.label_visibility().map(|(name, _)| name).collect();
        assert_eq!(names, ["Sun", "Earth", "Late"]);
    }

    #[test]
    fn test_disabled_trails_and_labels() {
        let mut config = small_config();
        config.trails.enabled = false;
        config.labels.enabled = false;
        let (mut sim, _, _) = with_planet(&config);
        sim.tick(0.1);
        assert!(sim.trails().is_empty());
        assert_eq!(sim.label_visibility().count(), 0);
    }

    #[test]
    fn test_render_without_gpu_is_noop() {
        let (mut sim, _, _) = with_planet(&small_config());
        assert!(!sim.render());
        sim.dispose();
        assert!(!sim.is_attached());
    }

    #[test]
    fn test_gpu_frame_and_dispose() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        let mut config = small_config();
        config.window.width = 160;
        config.window.height = 90;
        config.debris.cast_shadows = true;
        let (mut sim, _, _) = with_planet(&config);
        sim.attach(&ctx);
        sim.tick(0.1);
        assert!(sim.render());
        assert!(sim.debris().has_shadow_caster());
        assert_eq!(sim.target().map(|t| (t.width(), t.height())), Some((160, 90)));

        sim.set_viewport(320, 180);
        assert_eq!(sim.target().map(|t| t.width()), Some(320));

        sim.dispose();
        assert!(!sim.is_attached());
        assert!(!sim.debris().is_attached());
        assert!(!sim.trails().is_attached());
        assert!(sim.batcher().is_empty());
        sim.dispose();
    }

    #[test]
    fn test_reattach_keeps_every_body_drawn() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        let mut config = small_config();
        config.window.width = 64;
        config.window.height = 64;
        let (mut sim, _, earth) = with_planet(&config);
        let expected = (sim.stats().instances, sim.stats().trails);
        assert_eq!(expected, (2, 1));

        sim.attach(&ctx);
        sim.attach(&ctx);
        sim.tick(0.1);
        assert_eq!((sim.stats().instances, sim.stats().trails), expected);
        assert!(sim.render());

        sim.dispose();
        assert_eq!(sim.stats().instances, 0);
        assert_eq!(sim.trail_of(earth), None);

        sim.attach(&ctx);
        assert_eq!((sim.stats().instances, sim.stats().trails), expected);
        assert!(sim.trail_of(earth).is_some());
        sim.tick(0.1);
        let mesh = sim.bodies().body(earth).unwrap().mesh;
        let handle = sim.batcher().handle_of(mesh).unwrap();
        assert_eq!(sim.pick(handle.group, handle.slot), Some(earth));
        assert!(sim.render());
        sim.dispose();
    }
}
