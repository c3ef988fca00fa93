//! Batched instanced drawing of bodies that share a mesh and material.
//!
//! Instances are grouped by `(GeometryId, MaterialId)`. Each group keeps the
//! scene nodes it mirrors, a metadata side-table indexed by slot, and a CPU
//! copy of the per-instance transforms that is uploaded in one write per
//! frame. Instances are only ever appended; shrinking a group means disposing
//! the batcher and registering again.
//!
//! Frame order: settle the scene graph, then [`InstanceBatcher::update`], then
//! record the pass with [`InstanceBatcher::render`].

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use orrery_scene::{NodeId, SceneGraph};
use rustc_hash::FxHashMap;

use crate::camera::CameraBinding;
use crate::gpu::GpuContext;
use crate::mesh::Vertex;
use crate::resources::{GeometryId, MaterialId, ResourceRegistry};
use crate::target::TargetFormats;

/// Per-instance model matrix, vertex slot 1.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl InstanceRaw {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        2 => Float32x4,
        3 => Float32x4,
        4 => Float32x4,
        5 => Float32x4,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }

    pub fn from_matrix(m: Mat4) -> Self {
        Self {
            model: m.to_cols_array_2d(),
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

/// Identity of an instancing group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub geometry: GeometryId,
    pub material: MaterialId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(u32);

impl GroupId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where an instance lives: its group and its slot in that group's buffer.
/// The slot is the instance index a GPU pick would report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceHandle {
    pub group: GroupId,
    pub slot: u32,
}

struct GroupBuffer {
    buffer: wgpu::Buffer,
    capacity: u32,
}

struct InstanceGroup<M> {
    key: GroupKey,
    sources: Vec<NodeId>,
    metadata: Vec<M>,
    raw: Vec<InstanceRaw>,
    gpu: Option<GroupBuffer>,
}

struct BatcherGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
}

/// Groups scene nodes into instanced draws. `M` is the per-instance record
/// returned by reverse lookups.
pub struct InstanceBatcher<M> {
    groups: Vec<InstanceGroup<M>>,
    by_key: FxHashMap<GroupKey, GroupId>,
    tags: FxHashMap<NodeId, InstanceHandle>,
    max_per_group: usize,
    dirty: bool,
    gpu: Option<BatcherGpu>,
}

impl<M> InstanceBatcher<M> {
    /// Default per-group capacity.
    pub const DEFAULT_MAX_PER_GROUP: usize = 16_384;

    pub fn new(max_per_group: usize) -> Self {
        Self {
            groups: Vec::new(),
            by_key: FxHashMap::default(),
            tags: FxHashMap::default(),
            max_per_group,
            dirty: false,
            gpu: None,
        }
    }

    /// Create the pipeline. Buffers are allocated on the next [`build`](Self::build).
    pub fn attach(
        &mut self,
        ctx: &GpuContext,
        camera: &CameraBinding,
        material_layout: &wgpu::BindGroupLayout,
        formats: TargetFormats,
    ) {
        let pipeline = create_pipeline(&ctx.device, &camera.layout, material_layout, formats);
        self.gpu = Some(BatcherGpu {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            pipeline,
        });
        for group in &mut self.groups {
            if let Some(old) = group.gpu.take() {
                old.buffer.destroy();
            }
        }
        self.dirty = true;
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    /// Register `source` in the group for `(geometry, material)`.
    ///
    /// A node already registered keeps its existing handle. Returns `None`
    /// when the group is full.
    pub fn add_instance(
        &mut self,
        source: NodeId,
        geometry: GeometryId,
        material: MaterialId,
        metadata: M,
    ) -> Option<InstanceHandle> {
        if let Some(&handle) = self.tags.get(&source) {
            return Some(handle);
        }

        let key = GroupKey { geometry, material };
        let existing = self.by_key.get(&key).copied();
        let filled = existing.map_or(0, |id| self.groups[id.index()].sources.len());
        if filled >= self.max_per_group {
            log::warn!(
                "Instance group {:?} is full ({} instances), dropping node {:?}",
                key,
                self.max_per_group,
                source
            );
            return None;
        }

        let group_id = match existing {
            Some(id) => id,
            None => {
                let id = GroupId(self.groups.len() as u32);
                self.groups.push(InstanceGroup {
                    key,
                    sources: Vec::new(),
                    metadata: Vec::new(),
                    raw: Vec::new(),
                    gpu: None,
                });
                self.by_key.insert(key, id);
                id
            }
        };

        let group = &mut self.groups[group_id.index()];
        let handle = InstanceHandle {
            group: group_id,
            slot: group.sources.len() as u32,
        };
        group.sources.push(source);
        group.metadata.push(metadata);
        group.raw.push(InstanceRaw::from_matrix(Mat4::IDENTITY));
        self.tags.insert(source, handle);
        self.dirty = true;
        Some(handle)
    }

    /// Reallocate group buffers to the current instance counts. Does nothing
    /// unless instances were added since the last build. Returns whether a
    /// rebuild happened.
    pub fn build(&mut self) -> bool {
        if !self.dirty {
            return false;
        }
        self.dirty = false;

        let Some(gpu) = &self.gpu else {
            return true;
        };
        for group in &mut self.groups {
            if let Some(old) = group.gpu.take() {
                old.buffer.destroy();
            }
            let capacity = group.sources.len().max(1) as u32;
            let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("instance-transforms"),
                size: capacity as u64 * std::mem::size_of::<InstanceRaw>() as u64,
                usage: wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            });
            gpu.queue
                .write_buffer(&buffer, 0, bytemuck::cast_slice(&group.raw));
            group.gpu = Some(GroupBuffer { buffer, capacity });
        }
        log::debug!(
            "Rebuilt {} instance groups ({} instances)",
            self.groups.len(),
            self.len()
        );
        true
    }

    /// Copy every source's settled world transform into its slot and upload
    /// each group in a single write.
    pub fn update(&mut self, graph: &SceneGraph) {
        for group in &mut self.groups {
            for (raw, &source) in group.raw.iter_mut().zip(&group.sources) {
                *raw = InstanceRaw::from_matrix(graph.world_transform(source));
            }
            if let (Some(gpu), Some(buf)) = (&self.gpu, &group.gpu)
                && buf.capacity as usize >= group.raw.len()
            {
                gpu.queue
                    .write_buffer(&buf.buffer, 0, bytemuck::cast_slice(&group.raw));
            }
        }
    }

    /// Originating node and metadata for a group's instance index.
    pub fn lookup(&self, group: GroupId, index: u32) -> Option<(NodeId, &M)> {
        let group = self.groups.get(group.index())?;
        let i = index as usize;
        Some((*group.sources.get(i)?, group.metadata.get(i)?))
    }

    /// Handle assigned to `source`, if registered.
    pub fn handle_of(&self, source: NodeId) -> Option<InstanceHandle> {
        self.tags.get(&source).copied()
    }

    pub fn group_id(&self, geometry: GeometryId, material: MaterialId) -> Option<GroupId> {
        self.by_key.get(&GroupKey { geometry, material }).copied()
    }

    pub fn group_key(&self, group: GroupId) -> Option<GroupKey> {
        self.groups.get(group.index()).map(|g| g.key)
    }

    /// CPU copy of a group's per-instance transforms as of the last update.
    pub fn instance_transforms(&self, group: GroupId) -> &[InstanceRaw] {
        self.groups
            .get(group.index())
            .map(|g| g.raw.as_slice())
            .unwrap_or(&[])
    }

    /// Read a group's GPU transform buffer back. Test and debug use only.
    pub fn read_back(&self, ctx: &GpuContext, group: GroupId) -> Option<Vec<Mat4>> {
        let group = self.groups.get(group.index())?;
        let buf = group.gpu.as_ref()?;
        let size = (group.raw.len() * std::mem::size_of::<InstanceRaw>()) as u64;
        if size == 0 {
            return Some(Vec::new());
        }
        let bytes = ctx.read_buffer(&buf.buffer, size)?;
        let raws: &[InstanceRaw] = bytemuck::cast_slice(&bytes);
        Some(raws.iter().map(InstanceRaw::to_matrix).collect())
    }

    /// Total registered instances across groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.sources.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Whether instances were added since the last build.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// One instanced draw per non-empty group.
    pub fn render<'a>(
        &'a self,
        pass: &mut wgpu::RenderPass<'a>,
        resources: &'a ResourceRegistry,
        camera: &'a wgpu::BindGroup,
    ) {
        let Some(gpu) = &self.gpu else {
            return;
        };
        pass.set_pipeline(&gpu.pipeline);
        pass.set_bind_group(0, camera, &[]);
        for group in &self.groups {
            let (Some(buf), Some(mesh), Some(material)) = (
                group.gpu.as_ref(),
                resources.gpu_mesh(group.key.geometry),
                resources.material_bind_group(group.key.material),
            ) else {
                continue;
            };
            let count = (group.sources.len() as u32).min(buf.capacity);
            if count == 0 {
                continue;
            }
            pass.set_bind_group(1, material, &[]);
            mesh.bind(pass);
            pass.set_vertex_buffer(1, buf.buffer.slice(..));
            pass.draw_indexed(0..mesh.index_count, 0, 0..count);
        }
    }

    /// Release every buffer and forget all registrations, including the
    /// node-to-handle tags. The pipeline is released too; call
    /// [`attach`](Self::attach) again before rendering.
    pub fn dispose(&mut self) {
        for group in &mut self.groups {
            if let Some(buf) = group.gpu.take() {
                buf.buffer.destroy();
            }
        }
        let released = self.len();
        self.groups.clear();
        self.by_key.clear();
        self.tags.clear();
        self.dirty = false;
        self.gpu = None;
        log::debug!("Disposed instance batcher ({released} instances)");
    }
}

impl<M> Default for InstanceBatcher<M> {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_PER_GROUP)
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    camera_layout: &wgpu::BindGroupLayout,
    material_layout: &wgpu::BindGroupLayout,
    formats: TargetFormats,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("instanced-body-shader"),
        source: wgpu::ShaderSource::Wgsl(INSTANCED_SHADER.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("instanced-body-layout"),
        bind_group_layouts: &[camera_layout, material_layout],
        immediate_size: 0,
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("instanced-body-pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_instanced"),
            buffers: &[Vertex::layout(), InstanceRaw::layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(formats.depth_state(true)),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_instanced"),
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

/// Lit by a point light at the origin (the star).
const INSTANCED_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
};

struct Material {
    color: vec4<f32>,
    params: vec4<f32>,
};

@group(0) @binding(0) var<uniform> camera: Camera;
@group(1) @binding(0) var<uniform> material: Material;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_instanced(v: VertexInput, inst: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(inst.model_0, inst.model_1, inst.model_2, inst.model_3);
    let world = model * vec4<f32>(v.position, 1.0);
    var out: VertexOutput;
    out.clip_position = camera.view_proj * world;
    out.world_pos = world.xyz;
    out.normal = (model * vec4<f32>(v.normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_instanced(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    var to_light = vec3<f32>(0.0, 1.0, 0.0);
    let d = length(in.world_pos);
    if d > 1e-5 {
        to_light = -in.world_pos / d;
    }
    let diffuse = max(dot(n, to_light), 0.0) * 0.92 + 0.06;
    let lit = material.color.rgb * diffuse;
    let color = mix(lit, material.color.rgb, clamp(material.params.x, 0.0, 1.0));
    return vec4<f32>(color, material.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraBinding;
    use crate::mesh::MeshData;
    use crate::resources::Material;
    use glam::Vec3;
    use orrery_scene::Transform;

    fn registry() -> (ResourceRegistry, GeometryId, GeometryId, MaterialId) {
        let mut reg = ResourceRegistry::new();
        let sphere = reg.add_geometry("sphere", MeshData::icosphere(1));
        let rock = reg.add_geometry("rock", MeshData::rock(3, 0, 0.2));
        let grey = reg.add_material(Material::lit([0.5, 0.5, 0.5]));
        (reg, sphere, rock, grey)
    }

    fn nodes(graph: &mut SceneGraph, n: usize) -> Vec<NodeId> {
        (0..n)
            .map(|i| graph.add_node(None, Transform::from_translation(Vec3::X * i as f32)))
            .collect()
    }

    #[test]
    fn test_instance_raw_layout() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 64);
        let layout = InstanceRaw::layout();
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        assert_eq!(layout.attributes[0].shader_location, 2);
        assert_eq!(layout.attributes[3].offset, 48);
    }

    #[test]
    fn test_groups_keyed_by_geometry_and_material() {
        let (_reg, sphere, rock, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 3);
        let mut batcher = InstanceBatcher::<&str>::default();
        let a = batcher.add_instance(n[0], sphere, grey, "a").unwrap();
        let b = batcher.add_instance(n[1], sphere, grey, "b").unwrap();
        let c = batcher.add_instance(n[2], rock, grey, "c").unwrap();
        assert_eq!(a.group, b.group);
        assert_ne!(a.group, c.group);
        assert_eq!((a.slot, b.slot, c.slot), (0, 1, 0));
        assert_eq!(batcher.group_count(), 2);
        assert_eq!(batcher.group_id(rock, grey), Some(c.group));
    }

    #[test]
    fn test_reverse_lookup_returns_source_and_metadata() {
        let (_reg, sphere, _, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 2);
        let mut batcher = InstanceBatcher::default();
        batcher.add_instance(n[0], sphere, grey, "Mercury".to_string());
        let h = batcher
            .add_instance(n[1], sphere, grey, "Venus".to_string())
            .unwrap();
        let (node, name) = batcher.lookup(h.group, 1).unwrap();
        assert_eq!(node, n[1]);
        assert_eq!(name, "Venus");
        assert!(batcher.lookup(h.group, 2).is_none());
    }

    #[test]
    fn test_duplicate_source_keeps_existing_slot() {
        let (_reg, sphere, rock, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 1);
        let mut batcher = InstanceBatcher::default();
        let first = batcher.add_instance(n[0], sphere, grey, 1).unwrap();
        let again = batcher.add_instance(n[0], rock, grey, 2).unwrap();
        assert_eq!(first, again);
        assert_eq!(batcher.len(), 1);
    }

    #[test]
    fn test_capacity_exhaustion_is_not_fatal() {
        let (_reg, sphere, _, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 5);
        let mut batcher = InstanceBatcher::new(3);
        let added: Vec<_> = n
            .iter()
            .map(|&node| batcher.add_instance(node, sphere, grey, ()))
            .collect();
        assert!(added[..3].iter().all(Option::is_some));
        assert!(added[3..].iter().all(Option::is_none));
        assert_eq!(batcher.len(), 3);
        assert!(batcher.handle_of(n[4]).is_none());
    }

    #[test]
    fn test_zero_capacity_creates_no_group() {
        let (_reg, sphere, _, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 2);
        let mut batcher = InstanceBatcher::new(0);
        assert!(batcher.add_instance(n[0], sphere, grey, ()).is_none());
        assert!(batcher.add_instance(n[1], sphere, grey, ()).is_none());
        assert_eq!(batcher.group_count(), 0);
        assert_eq!(batcher.group_id(sphere, grey), None);
        assert!(!batcher.is_dirty());
        assert!(!batcher.build());
    }

    #[test]
    fn test_build_runs_only_when_dirty() {
        let (_reg, sphere, _, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 2);
        let mut batcher = InstanceBatcher::default();
        assert!(!batcher.build());
        batcher.add_instance(n[0], sphere, grey, ());
        assert!(batcher.is_dirty());
        assert!(batcher.build());
        assert!(!batcher.build());
        batcher.add_instance(n[1], sphere, grey, ());
        assert!(batcher.build());
    }

    #[test]
    fn test_update_mirrors_moved_sources() {
        let (_reg, sphere, rock, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 6);
        let mut batcher = InstanceBatcher::default();
        for (i, &node) in n.iter().enumerate() {
            let geometry = if i % 2 == 0 { sphere } else { rock };
            batcher.add_instance(node, geometry, grey, i);
        }
        batcher.build();

        for (i, &node) in n.iter().enumerate() {
            graph.set_translation(node, Vec3::new(i as f32, 2.0 * i as f32, -3.0));
        }
        graph.update_world_transforms();
        batcher.update(&graph);

        for &node in &n {
            let h = batcher.handle_of(node).unwrap();
            let got = batcher.instance_transforms(h.group)[h.slot as usize].to_matrix();
            assert_eq!(got, graph.world_transform(node));
        }
    }

    #[test]
    fn test_dispose_then_reregister_leaves_no_residual_tags() {
        let (_reg, sphere, rock, grey) = registry();
        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 4);
        let mut batcher = InstanceBatcher::default();
        for &node in &n {
            batcher.add_instance(node, rock, grey, "old");
        }
        batcher.build();
        batcher.dispose();

        assert!(batcher.is_empty());
        assert_eq!(batcher.group_count(), 0);
        for &node in &n {
            assert!(batcher.handle_of(node).is_none());
        }

        // Same nodes, different grouping: slots must start fresh.
        let h = batcher.add_instance(n[2], sphere, grey, "new").unwrap();
        assert_eq!(h.slot, 0);
        assert_eq!(batcher.lookup(h.group, 0).unwrap().1, &"new");
        assert_eq!(batcher.group_key(h.group).unwrap().geometry, sphere);
        assert!(batcher.handle_of(n[0]).is_none());
    }

    #[test]
    fn test_gpu_readback_matches_world_transforms() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        let (mut reg, sphere, _, grey) = registry();
        reg.attach(&ctx);
        let camera = CameraBinding::new(&ctx.device);
        let Some(material_layout) = reg.material_layout() else {
            return;
        };

        let mut graph = SceneGraph::new();
        let n = nodes(&mut graph, 8);
        let mut batcher = InstanceBatcher::default();
        batcher.attach(&ctx, &camera, material_layout, TargetFormats::default());
        for &node in &n {
            batcher.add_instance(node, sphere, grey, ());
        }
        batcher.build();

        for (i, &node) in n.iter().enumerate() {
            graph.set_translation(node, Vec3::new(10.0 * i as f32, 1.0, -(i as f32)));
            graph.set_scale(node, Vec3::splat(1.0 + i as f32));
        }
        graph.update_world_transforms();
        batcher.update(&graph);

        let group = batcher.group_id(sphere, grey).unwrap();
        let back = batcher.read_back(&ctx, group).unwrap();
        assert_eq!(back.len(), n.len());
        for (m, &node) in back.iter().zip(&n) {
            assert_eq!(*m, graph.world_transform(node));
        }

        batcher.dispose();
        assert!(!batcher.is_attached());
    }
}
