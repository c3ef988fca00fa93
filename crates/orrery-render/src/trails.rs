//! GPU-resident orbit trails.
//!
//! Every trail is one column of a shared `Rgba32Float` history texture, one
//! row per history sample. A single `head` row pointer is shared by all
//! trails and advances once per update, so recording a new sample for every
//! body is one row write instead of shifting per-trail arrays:
//!
//! ```text
//!            trail 0  trail 1  trail 2 ...
//! row 0      p        p        p
//! row 1      p        p        p
//! row head   newest   newest   newest      <- written this update
//! row head+1 oldest   oldest   oldest
//! ```
//!
//! The vertex shader reconstructs segments from `head`, fades them by age,
//! and collapses the one segment that would join the newest sample back to
//! the oldest. A CPU mirror of the texture is kept for inspection.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use orrery_scene::{NodeId, SceneGraph};
use std::num::NonZeroU64;

use crate::camera::CameraBinding;
use crate::gpu::GpuContext;
use crate::target::TargetFormats;

/// Upper bound on history rows; the default device limit guarantees 8192.
pub const MAX_HISTORY_LENGTH: u32 = 4096;

/// Upper bound on trail columns, the texture width every device opened
/// with default limits accepts.
pub const MAX_TRAILS: u32 = 8192;

/// Handle to a registered trail (its texture column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrailId(u32);

impl TrailId {
    pub fn column(self) -> u32 {
        self.0
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TrailParams {
    history_length: u32,
    head: u32,
    trail_count: u32,
    _pad: u32,
}

/// History rows joined by `segment`, newest end first.
///
/// Segment `s` connects the sample of age `s` to the sample of age `s + 1`.
/// The last segment would connect the oldest sample to the newest and is
/// collapsed (`None`).
pub fn segment_rows(segment: u32, head: u32, history_length: u32) -> Option<(u32, u32)> {
    if history_length < 2 || segment + 1 >= history_length {
        return None;
    }
    Some((
        row_for_age(segment, head, history_length),
        row_for_age(segment + 1, head, history_length),
    ))
}

/// Row holding the sample recorded `age` updates ago.
pub fn row_for_age(age: u32, head: u32, history_length: u32) -> u32 {
    (head + history_length - age % history_length) % history_length
}

/// Opacity for a sample of the given age: squared falloff from 1 at the
/// newest sample to 0 at the oldest.
pub fn fade(age: u32, history_length: u32) -> f32 {
    let span = history_length.saturating_sub(1).max(1) as f32;
    let t = (age as f32 / span).min(1.0);
    (1.0 - t) * (1.0 - t)
}

struct TrailGpu {
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    /// Texture width; trails in later columns are kept but not drawn.
    columns: u32,
    params: wgpu::Buffer,
    colors: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
}

/// Shared-head ring buffer of positions for many bodies.
pub struct TrailSystem {
    history_length: u32,
    max_trails: u32,
    update_interval: u32,
    head: u32,
    ticks: u64,
    sources: Vec<NodeId>,
    colors: Vec<[f32; 4]>,
    /// Column-major mirror: `history[column * history_length + row]`.
    history: Vec<[f32; 4]>,
    row: Vec<[f32; 4]>,
    gpu: Option<TrailGpu>,
}

impl TrailSystem {
    /// `history_length` is clamped to `[2, MAX_HISTORY_LENGTH]` and
    /// `max_trails` to [`MAX_TRAILS`].
    pub fn new(history_length: u32, max_trails: u32) -> Self {
        Self {
            history_length: history_length.clamp(2, MAX_HISTORY_LENGTH),
            max_trails: max_trails.min(MAX_TRAILS),
            update_interval: 1,
            head: 0,
            ticks: 0,
            sources: Vec::new(),
            colors: Vec::new(),
            history: Vec::new(),
            row: Vec::new(),
            gpu: None,
        }
    }

    /// Record a sample every `interval` ticks (at least 1).
    pub fn with_update_interval(mut self, interval: u32) -> Self {
        self.update_interval = interval.max(1);
        self
    }

    /// Allocate the history texture and pipeline, and upload any trails
    /// registered so far.
    ///
    /// On a device whose texture limit is below `max_trails`, registration
    /// and every issued [`TrailId`] stay valid but only the first `limit`
    /// columns are drawn.
    pub fn attach(&mut self, ctx: &GpuContext, camera: &CameraBinding, formats: TargetFormats) {
        self.dispose_gpu();

        let limit = ctx.max_texture_dimension_2d().max(1);
        let width = self.max_trails.clamp(1, limit);
        if self.max_trails > limit {
            log::warn!(
                "Trail capacity {} exceeds texture limit {}; later trails are not drawn",
                self.max_trails,
                limit
            );
        }
        let device = &ctx.device;

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("trail-history"),
            size: wgpu::Extent3d {
                width,
                height: self.history_length,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trail-params"),
            size: std::mem::size_of::<TrailParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let colors = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("trail-colors"),
            size: width as u64 * 16,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("trail-bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<TrailParams>() as u64
                        ),
                    },
                    count: None,
                },
            ],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("trail-bind-group"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
        });
        let pipeline = create_pipeline(device, &camera.layout, &layout, formats);

        let gpu = TrailGpu {
            queue: ctx.queue.clone(),
            texture,
            columns: width,
            params,
            colors,
            bind_group,
            pipeline,
        };
        for column in 0..self.drawn_count(&gpu) {
            self.upload_column(&gpu, column);
        }
        self.gpu = Some(gpu);
        self.upload_params();
        log::debug!(
            "Allocated trail history {}x{} ({} registered)",
            width,
            self.history_length,
            self.sources.len()
        );
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    /// Claim the next free column for `source`. Every row is pre-filled with
    /// the node's current world position so the trail does not streak in
    /// from the origin. Returns `None` when all columns are taken.
    pub fn register(
        &mut self,
        graph: &SceneGraph,
        source: NodeId,
        color: [f32; 4],
    ) -> Option<TrailId> {
        if self.sources.len() >= self.max_trails as usize {
            log::warn!(
                "Trail capacity reached ({}), ignoring node {:?}",
                self.max_trails,
                source
            );
            return None;
        }

        let column = self.sources.len() as u32;
        let p = graph.world_position(source);
        let sample = [p.x, p.y, p.z, 1.0];
        self.sources.push(source);
        self.colors.push(color);
        self.history
            .extend(std::iter::repeat_n(sample, self.history_length as usize));

        if let Some(gpu) = &self.gpu {
            self.upload_column(gpu, column);
        }
        self.upload_params();
        Some(TrailId(column))
    }

    /// Count a simulation tick and record a sample on every
    /// `update_interval`-th one. Returns whether a sample was recorded.
    pub fn tick(&mut self, graph: &SceneGraph) -> bool {
        self.ticks += 1;
        if self.ticks % self.update_interval as u64 != 0 {
            return false;
        }
        self.update(graph);
        true
    }

    /// Advance the shared head and record every trail's current position
    /// into that row, uploaded as one texture write.
    pub fn update(&mut self, graph: &SceneGraph) {
        self.head = (self.head + 1) % self.history_length;
        let h = self.history_length as usize;
        let head = self.head as usize;

        self.row.clear();
        for (column, &source) in self.sources.iter().enumerate() {
            let p = graph.world_position(source);
            let sample = [p.x, p.y, p.z, 1.0];
            self.row.push(sample);
            self.history[column * h + head] = sample;
        }

        if let Some(gpu) = &self.gpu
            && self.drawn_count(gpu) > 0
        {
            let count = self.drawn_count(gpu);
            gpu.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &gpu.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: self.head,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&self.row[..count as usize]),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(count * 16),
                    rows_per_image: Some(1),
                },
                wgpu::Extent3d {
                    width: count,
                    height: 1,
                    depth_or_array_layers: 1,
                },
            );
        }
        self.upload_params();
    }

    /// Drop every trail. Columns are only ever reclaimed all at once.
    pub fn reset(&mut self) {
        self.sources.clear();
        self.colors.clear();
        self.history.clear();
        self.row.clear();
        self.head = 0;
        self.ticks = 0;
        self.upload_params();
    }

    /// Release the texture, buffers and pipeline and drop every trail.
    pub fn dispose(&mut self) {
        self.dispose_gpu();
        self.reset();
    }

    fn dispose_gpu(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.texture.destroy();
            gpu.params.destroy();
            gpu.colors.destroy();
            log::debug!("Released trail history texture");
        }
    }

    /// Registered trails that fit in the texture.
    fn drawn_count(&self, gpu: &TrailGpu) -> u32 {
        (self.sources.len() as u32).min(gpu.columns)
    }

    fn upload_column(&self, gpu: &TrailGpu, column: u32) {
        if column >= gpu.columns {
            return;
        }
        let h = self.history_length as usize;
        let start = column as usize * h;
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &gpu.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: column,
                    y: 0,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&self.history[start..start + h]),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(16),
                rows_per_image: Some(self.history_length),
            },
            wgpu::Extent3d {
                width: 1,
                height: self.history_length,
                depth_or_array_layers: 1,
            },
        );
        gpu.queue.write_buffer(
            &gpu.colors,
            column as u64 * 16,
            bytemuck::bytes_of(&self.colors[column as usize]),
        );
    }

    fn upload_params(&self) {
        if let Some(gpu) = &self.gpu {
            let params = TrailParams {
                history_length: self.history_length,
                head: self.head,
                trail_count: self.drawn_count(gpu),
                _pad: 0,
            };
            gpu.queue
                .write_buffer(&gpu.params, 0, bytemuck::bytes_of(&params));
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn max_trails(&self) -> u32 {
        self.max_trails
    }

    pub fn history_length(&self) -> u32 {
        self.history_length
    }

    /// Row written by the most recent update.
    pub fn head(&self) -> u32 {
        self.head
    }

    /// CPU copy of a trail's column, indexed by row.
    pub fn column(&self, id: TrailId) -> Option<&[[f32; 4]]> {
        let h = self.history_length as usize;
        let start = id.0 as usize * h;
        self.history.get(start..start + h)
    }

    /// Position recorded `age` updates ago.
    pub fn sample(&self, id: TrailId, age: u32) -> Option<Vec3> {
        let row = row_for_age(age, self.head, self.history_length) as usize;
        let s = self.column(id)?.get(row)?;
        Some(Vec3::new(s[0], s[1], s[2]))
    }

    /// Read the registered columns of the GPU history texture, row-major
    /// (`result[row * len + column]`). Test and debug use only.
    pub fn read_back(&self, ctx: &GpuContext) -> Option<Vec<[f32; 4]>> {
        let gpu = self.gpu.as_ref()?;
        let count = self.drawn_count(gpu);
        if count == 0 {
            return Some(Vec::new());
        }
        let bytes = ctx.read_texture(
            &gpu.texture,
            count,
            self.history_length,
            16,
        )?;
        Some(bytemuck::cast_slice(&bytes).to_vec())
    }

    /// One line-list draw covering every trail.
    pub fn render<'a>(&'a self, pass: &mut wgpu::RenderPass<'a>, camera: &'a wgpu::BindGroup) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        let count = self.drawn_count(gpu);
        if count == 0 {
            return;
        }
        pass.set_pipeline(&gpu.pipeline);
        pass.set_bind_group(0, camera, &[]);
        pass.set_bind_group(1, &gpu.bind_group, &[]);
        pass.set_vertex_buffer(0, gpu.colors.slice(..));
        pass.draw(0..self.history_length * 2, 0..count);
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    trail_layout: &wgpu::BindGroupLayout,
    formats: TargetFormats,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("trail-shader"),
        source: wgpu::ShaderSource::Wgsl(TRAIL_SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("trail-pipeline-layout"),
        bind_group_layouts: &[camera_layout, trail_layout],
        immediate_size: 0,
    });
    const COLOR_ATTRIBUTES: [wgpu::VertexAttribute; 1] =
        wgpu::vertex_attr_array![0 => Float32x4];
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("trail-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_trail"),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: 16,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &COLOR_ATTRIBUTES,
            }],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::LineList,
            ..Default::default()
        },
        // Test against bodies, but don't occlude other trails.
        depth_stencil: Some(formats.depth_state(false)),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_trail"),
            targets: &[Some(wgpu::ColorTargetState {
                format: formats.color,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview_mask: None,
        cache: None,
    })
}

const TRAIL_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
};

struct TrailParams {
    history_length: u32,
    head: u32,
    trail_count: u32,
    _pad: u32,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(1) @binding(0) var history: texture_2d<f32>;
@group(1) @binding(1) var<uniform> params: TrailParams;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_trail(
    @builtin(vertex_index) vertex_index: u32,
    @builtin(instance_index) trail: u32,
    @location(0) color: vec4<f32>,
) -> VertexOutput {
    let len = params.history_length;
    let segment = vertex_index / 2u;
    var age = segment + vertex_index % 2u;
    var visible = 1.0;
    // Oldest-to-newest closing edge: collapse onto the newest sample.
    if segment + 1u >= len {
        age = 0u;
        visible = 0.0;
    }
    let row = (params.head + len - age % len) % len;
    let p = textureLoad(history, vec2<u32>(trail, row), 0);

    let t = min(f32(age) / f32(max(len - 1u, 1u)), 1.0);
    let fade = (1.0 - t) * (1.0 - t);

    var out: VertexOutput;
    out.clip_position = camera.view_proj * vec4<f32>(p.xyz, 1.0);
    out.color = vec4<f32>(color.rgb, color.a * fade * visible);
    return out;
}

@fragment
fn fs_trail(in: VertexOutput) -> @location(0) vec4<f32> {
    return in.color;
}
"#;
