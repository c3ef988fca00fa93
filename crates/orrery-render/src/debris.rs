//! Debris field animated entirely in the vertex stage.
//!
//! Orbital elements and tumble parameters are generated once and uploaded as
//! a static instance buffer. Each frame only the time uniform changes; the
//! shader solves Kepler's equation with a fixed number of fixed-point
//! iterations (`E = M + e sin E`), applies the same three-zone distance
//! compression as [`CoordinateScaler`], and tumbles each rock about its own
//! axis.
//!
//! The fixed iteration budget under-converges for eccentric orbits.
//! Distributions are expected to stay below `e = 0.2`; this is not enforced.

use std::f32::consts::TAU;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use orrery_orbit::CoordinateScaler;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use wgpu::util::DeviceExt;

use crate::camera::CameraBinding;
use crate::gpu::GpuContext;
use crate::mesh::{GpuMesh, MeshData, Vertex};
use crate::target::{ShadowMap, TargetFormats};

/// Fixed-point Kepler iterations in the vertex stage.
pub const DEBRIS_KEPLER_ITERATIONS: u32 = 5;

/// Eccentricity ceiling for generated debris; keeps `sqrt(1 - e^2)` real.
const MAX_DEBRIS_ECCENTRICITY: f32 = 0.99;

const SHADOW_MAP_SIZE: u32 = 2048;

/// Ranges the field is sampled from. All ranges are inclusive `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DebrisDistribution {
    pub count: u32,
    pub seed: u64,
    /// AU.
    pub semi_major_axis: [f32; 2],
    pub eccentricity: [f32; 2],
    /// Degrees.
    pub inclination: [f32; 2],
    /// Rock radius in render units.
    pub scale: [f32; 2],
    /// Radians per simulation time unit.
    pub tumble_speed: [f32; 2],
    pub color: [f32; 3],
}

impl Default for DebrisDistribution {
    /// A main-belt-like ring between Mars and Jupiter.
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
        }
    }
}

fn sample(rng: &mut ChaCha8Rng, [lo, hi]: [f32; 2]) -> f32 {
    if hi > lo { rng.random_range(lo..=hi) } else { lo }
}

/// Static per-instance data, vertex slot 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DebrisInstance {
    /// `a` (AU), `e`, inclination (rad), argument of periapsis (rad).
    pub orbit: [f32; 4],
    /// Mean anomaly at epoch (rad), ascending node (rad), tumble speed, scale.
    pub phase: [f32; 4],
    /// Unit tumble axis and initial angle (rad).
    pub tumble: [f32; 4],
}

impl DebrisInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<DebrisInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Deterministic field for a distribution.
    pub fn generate(dist: &DebrisDistribution) -> Vec<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(dist.seed);
        (0..dist.count)
            .map(|_| {
                // Degenerate axes are kept and parked at the origin.
                let a = sample(&mut rng, dist.semi_major_axis);
                let a = if a.is_finite() { a.max(0.0) } else { 0.0 };
                let e = sample(&mut rng, dist.eccentricity);
                let e = if e.is_finite() {
                    e.clamp(0.0, MAX_DEBRIS_ECCENTRICITY)
                } else {
                    0.0
                };
                let inc = sample(&mut rng, dist.inclination).to_radians();
                let w = rng.random_range(0.0..TAU);
                let m0 = rng.random_range(0.0..TAU);
                let node = rng.random_range(0.0..TAU);
                let speed = sample(&mut rng, dist.tumble_speed);
                let scale = sample(&mut rng, dist.scale);

                let z: f32 = rng.random_range(-1.0..=1.0);
                let phi = rng.random_range(0.0..TAU);
                let s = (1.0 - z * z).max(0.0).sqrt();
                let angle0 = rng.random_range(0.0..TAU);
                Self {
                    orbit: [a, e, inc, w],
                    phase: [m0, node, speed, scale],
                    tumble: [s * phi.cos(), s * phi.sin(), z, angle0],
                }
            })
            .collect()
    }
}

/// Uniform block at group 1. `time` sits at offset 0 and is the only field
/// rewritten per frame.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DebrisUniforms {
    pub time: f32,
    pub inner_limit: f32,
    pub outer_limit: f32,
    pub scale: f32,
    pub mid_compression: f32,
    pub outer_compression: f32,
    pub inner_visual: f32,
    pub outer_visual: f32,
    pub color: [f32; 4],
}

impl DebrisUniforms {
    pub fn new(scaler: &CoordinateScaler, color: [f32; 3]) -> Self {
        Self {
            time: 0.0,
            inner_limit: scaler.inner_limit() as f32,
            outer_limit: scaler.outer_limit() as f32,
            scale: scaler.scale() as f32,
            mid_compression: scaler.mid_compression() as f32,
            outer_compression: scaler.outer_compression() as f32,
            inner_visual: scaler.inner_visual() as f32,
            outer_visual: scaler.outer_visual() as f32,
            color: [color[0], color[1], color[2], 1.0],
        }
    }

    /// f32 copy of [`CoordinateScaler::visual_distance`].
    fn visual_distance(&self, r: f32) -> f32 {
        if r <= self.inner_limit {
            r * self.scale
        } else if r <= self.outer_limit {
            let excess = 1.0 + (r - self.inner_limit);
            self.inner_visual + excess.ln() * self.scale * self.mid_compression
        } else {
            let excess = 1.0 + (r - self.outer_limit);
            self.outer_visual + excess.ln() * self.scale * self.outer_compression
        }
    }
}

/// CPU rendition of the vertex-stage solve, in render units.
fn debris_position(inst: &DebrisInstance, u: &DebrisUniforms, time: f32) -> Vec3 {
    let [a, e, inc, w] = inst.orbit;
    let [m0, node, _, _] = inst.phase;
    if !a.is_finite() || a <= 0.0 {
        return Vec3::ZERO;
    }
    let period = a.powf(1.5);
    let m = m0 + TAU * (time / period).rem_euclid(1.0);
    let mut ecc = m;
    for _ in 0..DEBRIS_KEPLER_ITERATIONS {
        ecc = m + e * ecc.sin();
    }
    let r = a * (1.0 - e * ecc.cos());
    let nu = ((1.0 - e * e).sqrt() * ecc.sin()).atan2(ecc.cos() - e);

    let x_orb = r * nu.cos();
    let y_orb = r * nu.sin();
    let (sin_o, cos_o) = node.sin_cos();
    let (sin_i, cos_i) = inc.sin_cos();
    let (sin_w, cos_w) = w.sin_cos();
    let x = x_orb * (cos_o * cos_w - sin_o * sin_w * cos_i)
        - y_orb * (cos_o * sin_w + sin_o * cos_w * cos_i);
    let y = x_orb * (sin_o * cos_w + cos_o * sin_w * cos_i)
        - y_orb * (sin_o * sin_w - cos_o * cos_w * cos_i);
    let z = x_orb * (sin_w * sin_i) + y_orb * (cos_w * sin_i);
    let p = Vec3::new(x, z, y);

    let len = p.length();
    if len == 0.0 {
        return Vec3::ZERO;
    }
    p * (u.visual_distance(len) / len)
}

fn tumble_rotation(inst: &DebrisInstance, time: f32) -> Quat {
    let axis = Vec3::new(inst.tumble[0], inst.tumble[1], inst.tumble[2]);
    let angle = inst.tumble[3] + inst.phase[2] * time;
    Quat::from_axis_angle(axis.normalize_or(Vec3::Y), angle.rem_euclid(TAU))
}

struct ShadowCaster {
    pipeline: wgpu::RenderPipeline,
    light_buffer: wgpu::Buffer,
    light_bind_group: wgpu::BindGroup,
    map: ShadowMap,
}

struct DebrisGpu {
    queue: wgpu::Queue,
    mesh: GpuMesh,
    instances: wgpu::Buffer,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    shadow: Option<ShadowCaster>,
}

/// Static debris orbits advanced by a single time uniform.
pub struct DebrisField {
    instances: Vec<DebrisInstance>,
    uniforms: DebrisUniforms,
    mesh: MeshData,
    gpu: Option<DebrisGpu>,
}

impl DebrisField {
    pub fn new(dist: &DebrisDistribution, scaler: &CoordinateScaler) -> Self {
        Self {
            instances: DebrisInstance::generate(dist),
            uniforms: DebrisUniforms::new(scaler, dist.color),
            mesh: MeshData::rock(dist.seed, 1, 0.3),
            gpu: None,
        }
    }

    /// Upload geometry and instances and build the pipelines. With
    /// `cast_shadows` a depth-only caster and its shadow map are created too.
    pub fn attach(
        &mut self,
        ctx: &GpuContext,
        camera: &CameraBinding,
        formats: TargetFormats,
        cast_shadows: bool,
    ) {
        self.dispose();
        let device = &ctx.device;

        let mesh = GpuMesh::upload(device, "debris-rock", &self.mesh);
        let instances = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("debris-instances"),
            contents: bytemuck::cast_slice(&self.instances),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("debris-uniforms"),
            contents: bytemuck::bytes_of(&self.uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("debris-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        std::mem::size_of::<DebrisUniforms>() as u64
                    ),
                },
                count: None,
            }],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("debris-bind-group"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });
        let pipeline = create_main_pipeline(device, &camera.layout, &layout, formats);
        let shadow = cast_shadows.then(|| create_shadow_caster(device, &layout));

        log::info!(
            "Debris field uploaded: {} instances, {} triangles each, shadows {}",
            self.instances.len(),
            self.mesh.triangle_count(),
            if cast_shadows { "on" } else { "off" }
        );
        self.gpu = Some(DebrisGpu {
            queue: ctx.queue.clone(),
            mesh,
            instances,
            uniforms,
            bind_group,
            pipeline,
            shadow,
        });
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn has_shadow_caster(&self) -> bool {
        self.gpu.as_ref().is_some_and(|g| g.shadow.is_some())
    }

    /// Set the time uniform. This is the only per-frame upload.
    pub fn update(&mut self, time: f64) {
        self.uniforms.time = time as f32;
        if let Some(gpu) = &self.gpu {
            gpu.queue
                .write_buffer(&gpu.uniforms, 0, bytemuck::bytes_of(&self.uniforms.time));
        }
    }

    pub fn time(&self) -> f32 {
        self.uniforms.time
    }

    pub fn uniforms(&self) -> &DebrisUniforms {
        &self.uniforms
    }

    pub fn instances(&self) -> &[DebrisInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Render-space centre of instance `index` at `time`, computed the way
    /// the vertex stage does.
    pub fn position_at(&self, index: usize, time: f32) -> Option<Vec3> {
        let inst = self.instances.get(index)?;
        Some(debris_position(inst, &self.uniforms, time))
    }

    /// Model matrix of instance `index` at `time`.
    pub fn model_at(&self, index: usize, time: f32) -> Option<Mat4> {
        let inst = self.instances.get(index)?;
        Some(Mat4::from_scale_rotation_translation(
            Vec3::splat(inst.phase[3]),
            tumble_rotation(inst, time),
            debris_position(inst, &self.uniforms, time),
        ))
    }

    /// Light view-projection used by the shadow caster.
    pub fn set_light(&self, view_proj: Mat4) {
        if let Some(gpu) = &self.gpu
            && let Some(shadow) = &gpu.shadow
        {
            gpu.queue.write_buffer(
                &shadow.light_buffer,
                0,
                bytemuck::cast_slice(&view_proj.to_cols_array()),
            );
        }
    }

    pub fn shadow_map(&self) -> Option<&ShadowMap> {
        self.gpu.as_ref()?.shadow.as_ref().map(|s| &s.map)
    }

    /// Draw every rock in one instanced call.
    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, camera: &'a wgpu::BindGroup) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        if self.instances.is_empty() {
            return;
        }
        pass.set_pipeline(&gpu.pipeline);
        pass.set_bind_group(0, camera, &[]);
        pass.set_bind_group(1, &gpu.bind_group, &[]);
        gpu.mesh.bind(pass);
        pass.set_vertex_buffer(1, gpu.instances.slice(..));
        pass.draw_indexed(0..gpu.mesh.index_count, 0, 0..self.instances.len() as u32);
    }

    /// Record the depth-only pass into the shadow map, if enabled.
    pub fn render_shadow(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        let Some(shadow) = &gpu.shadow else {
            return;
        };
        if self.instances.is_empty() {
            return;
        }
        let mut pass = shadow.map.begin_pass(encoder);
        pass.set_pipeline(&shadow.pipeline);
        pass.set_bind_group(0, &shadow.light_bind_group, &[]);
        pass.set_bind_group(1, &gpu.bind_group, &[]);
        gpu.mesh.bind(&mut pass);
        pass.set_vertex_buffer(1, gpu.instances.slice(..));
        pass.draw_indexed(0..gpu.mesh.index_count, 0, 0..self.instances.len() as u32);
    }

    /// Free the rock mesh, instance and uniform buffers, the pipeline and the
    /// shadow caster with its map. Safe to call more than once.
    pub fn dispose(&mut self) {
        let Some(gpu) = self.gpu.take() else {
            return;
        };
        gpu.mesh.destroy();
        gpu.instances.destroy();
        gpu.uniforms.destroy();
        if let Some(shadow) = gpu.shadow {
            shadow.light_buffer.destroy();
            shadow.map.texture.destroy();
        }
        log::debug!("Disposed debris field");
    }
}

fn shader_source(stage: &str) -> String {
    format!("const KEPLER_ITERATIONS: u32 = {DEBRIS_KEPLER_ITERATIONS}u;\n{DEBRIS_COMMON}{stage}")
}

fn create_main_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    debris_layout: &wgpu::BindGroupLayout,
    formats: TargetFormats,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("debris-shader"),
        source: wgpu::ShaderSource::Wgsl(shader_source(DEBRIS_MAIN).into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("debris-pipeline-layout"),
        bind_group_layouts: &[camera_layout, debris_layout],
        immediate_size: 0,
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("debris-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_debris"),
            buffers: &[Vertex::layout(), DebrisInstance::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(formats.depth_state(true)),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_debris"),
            targets: &[Some(wgpu::ColorTargetState {
                format: formats.color,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

fn create_shadow_caster(
    device: &wgpu::Device,
    debris_layout: &wgpu::BindGroupLayout,
) -> ShadowCaster {
    let light_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("debris-shadow-light-bgl"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(64), // mat4x4<f32>
            },
            count: None,
        }],
    });
    let light_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("debris-shadow-light"),
        contents: bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let light_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("debris-shadow-light-bind-group"),
        layout: &light_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: light_buffer.as_entire_binding(),
        }],
    });

    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("debris-shadow-shader"),
        source: wgpu::ShaderSource::Wgsl(shader_source(DEBRIS_SHADOW).into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("debris-shadow-layout"),
        bind_group_layouts: &[&light_layout, debris_layout],
        immediate_size: 0,
    });
    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("debris-shadow-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_debris_shadow"),
            buffers: &[Vertex::layout(), DebrisInstance::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Front), // front-face culling reduces acne
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: crate::target::FrameTarget::DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: crate::target::FrameTarget::DEPTH_COMPARE,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 1.75,
                clamp: 0.0,
            },
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: None,
        multiview_mask: None,
        cache: None,
    });

    ShadowCaster {
        pipeline,
        light_buffer,
        light_bind_group,
        map: ShadowMap::new(device, SHADOW_MAP_SIZE),
    }
}

/// Shared by the colour and shadow shaders; expects `KEPLER_ITERATIONS`.
const DEBRIS_COMMON: &str = r#"
const TAU: f32 = 6.283185307179586;

struct DebrisUniforms {
    time: f32,
    inner_limit: f32,
    outer_limit: f32,
    scale: f32,
    mid_compression: f32,
    outer_compression: f32,
    inner_visual: f32,
    outer_visual: f32,
    color: vec4<f32>,
};

@group(1) @binding(0) var<uniform> debris: DebrisUniforms;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) orbit: vec4<f32>,
    @location(3) phase: vec4<f32>,
    @location(4) tumble: vec4<f32>,
};

fn visual_distance(r: f32) -> f32 {
    if r <= debris.inner_limit {
        return r * debris.scale;
    }
    if r <= debris.outer_limit {
        let excess = 1.0 + (r - debris.inner_limit);
        return debris.inner_visual + log(excess) * debris.scale * debris.mid_compression;
    }
    let excess = 1.0 + (r - debris.outer_limit);
    return debris.outer_visual + log(excess) * debris.scale * debris.outer_compression;
}

fn orbit_position(orbit: vec4<f32>, phase: vec4<f32>, time: f32) -> vec3<f32> {
    let a = orbit.x;
    let e = orbit.y;
    let inc = orbit.z;
    let w = orbit.w;
    let node = phase.y;
    if !(a > 0.0) {
        return vec3<f32>(0.0);
    }

    let period = pow(a, 1.5);
    let m = phase.x + TAU * fract(time / period);
    var ecc = m;
    for (var k = 0u; k < KEPLER_ITERATIONS; k = k + 1u) {
        ecc = m + e * sin(ecc);
    }
    let r = a * (1.0 - e * cos(ecc));
    let nu = atan2(sqrt(1.0 - e * e) * sin(ecc), cos(ecc) - e);

    let x_orb = r * cos(nu);
    let y_orb = r * sin(nu);
    let so = sin(node);
    let co = cos(node);
    let si = sin(inc);
    let ci = cos(inc);
    let sw = sin(w);
    let cw = cos(w);
    let x = x_orb * (co * cw - so * sw * ci) - y_orb * (co * sw + so * cw * ci);
    let y = x_orb * (so * cw + co * sw * ci) - y_orb * (so * sw - co * cw * ci);
    let z = x_orb * (sw * si) + y_orb * (cw * si);
    let p = vec3<f32>(x, z, y);

    let len = length(p);
    if len == 0.0 {
        return vec3<f32>(0.0);
    }
    return p * (visual_distance(len) / len);
}

// Rodrigues rotation of v about a unit axis.
fn rotate(v: vec3<f32>, axis: vec3<f32>, angle: f32) -> vec3<f32> {
    let c = cos(angle);
    let s = sin(angle);
    return v * c + cross(axis, v) * s + axis * dot(axis, v) * (1.0 - c);
}

fn tumble_angle(phase: vec4<f32>, tumble: vec4<f32>) -> f32 {
    return tumble.w + phase.z * debris.time;
}

fn debris_world(
    position: vec3<f32>,
    orbit: vec4<f32>,
    phase: vec4<f32>,
    tumble: vec4<f32>,
) -> vec3<f32> {
    let local = rotate(position * phase.w, normalize(tumble.xyz), tumble_angle(phase, tumble));
    return orbit_position(orbit, phase, debris.time) + local;
}
"#;

const DEBRIS_MAIN: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_debris(v: VertexInput, inst: InstanceInput) -> VertexOutput {
    let world = debris_world(v.position, inst.orbit, inst.phase, inst.tumble);
    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(world, 1.0);
    out.world_pos = world;
    let angle = tumble_angle(inst.phase, inst.tumble);
    out.normal = rotate(v.normal, normalize(inst.tumble.xyz), angle);
    return out;
}

@fragment
fn fs_debris(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    var to_light = vec3<f32>(0.0, 1.0, 0.0);
    let d = length(in.world_pos);
    if d > 1e-5 {
        to_light = -in.world_pos / d;
    }
    let diffuse = max(dot(n, to_light), 0.0) * 0.9 + 0.05;
    return vec4<f32>(debris.color.rgb * diffuse, 1.0);
}
"#;

const DEBRIS_SHADOW: &str = r#"
struct LightMatrix {
    view_proj: mat4x4<f32>,
};

@group(0) @binding(0) var<uniform> light: LightMatrix;

@vertex
fn vs_debris_shadow(v: VertexInput, inst: InstanceInput) -> @builtin(position) vec4<f32> {
    let world = debris_world(v.position, inst.orbit, inst.phase, inst.tumble);
    return light.view_proj * vec4<f32>(world, 1.0);
}
"#;
