//! Geometry and material registry.
//!
//! Meshes and materials are registered once and referred to by small handles,
//! which also serve as the instancing group key. Registration works without a
//! device; GPU copies are made when the registry is attached.

use bytemuck::{Pod, Zeroable};
use std::num::NonZeroU64;
use wgpu::util::DeviceExt;

use crate::gpu::GpuContext;
use crate::mesh::{GpuMesh, MeshData};

/// Handle to a registered mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(u32);

/// Handle to a registered material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u32);

/// Flat surface description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Linear RGBA base colour.
    pub color: [f32; 4],
    /// 0 = fully lit by the star, 1 = self-illuminated.
    pub emissive: f32,
}

impl Material {
    pub fn lit(color: [f32; 3]) -> Self {
        Self {
            color: [color[0], color[1], color[2], 1.0],
            emissive: 0.0,
        }
    }

    pub fn emissive(color: [f32; 3]) -> Self {
        Self {
            color: [color[0], color[1], color[2], 1.0],
            emissive: 1.0,
        }
    }

    pub fn to_uniform(&self) -> MaterialUniform {
        MaterialUniform {
            color: self.color,
            params: [self.emissive, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MaterialUniform {
    pub color: [f32; 4],
    /// x = emissive.
    pub params: [f32; 4],
}

struct GpuMaterial {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct GpuResources {
    device: wgpu::Device,
    layout: wgpu::BindGroupLayout,
    meshes: Vec<GpuMesh>,
    materials: Vec<GpuMaterial>,
}

/// Owns every shared mesh and material.
#[derive(Default)]
pub struct ResourceRegistry {
    meshes: Vec<(String, MeshData)>,
    materials: Vec<Material>,
    gpu: Option<GpuResources>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind group layout used by materials (group 1 in orrery pipelines).
    pub fn material_layout_entry() -> wgpu::BindGroupLayoutEntry {
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<MaterialUniform>() as u64),
            },
            count: None,
        }
    }

    /// Register a mesh under a debug label.
    pub fn add_geometry(&mut self, label: impl Into<String>, mesh: MeshData) -> GeometryId {
        let label = label.into();
        if let Some(gpu) = &mut self.gpu {
            gpu.meshes.push(GpuMesh::upload(&gpu.device, &label, &mesh));
        }
        self.meshes.push((label, mesh));
        GeometryId(self.meshes.len() as u32 - 1)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        if let Some(gpu) = &mut self.gpu {
            let m = upload_material(&gpu.device, &gpu.layout, &material);
            gpu.materials.push(m);
        }
        self.materials.push(material);
        MaterialId(self.materials.len() as u32 - 1)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&MeshData> {
        self.meshes.get(id.0 as usize).map(|(_, m)| m)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    pub fn geometry_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Upload everything registered so far; later registrations upload
    /// immediately. Attaching twice replaces the previous GPU copies.
    pub fn attach(&mut self, ctx: &GpuContext) {
        self.dispose();
        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("material-bgl"),
                entries: &[Self::material_layout_entry()],
            });
        let meshes = self
            .meshes
            .iter()
            .map(|(label, mesh)| GpuMesh::upload(&ctx.device, label, mesh))
            .collect();
        let materials = self
            .materials
            .iter()
            .map(|m| upload_material(&ctx.device, &layout, m))
            .collect();
        log::debug!(
            "Uploaded {} meshes and {} materials",
            self.meshes.len(),
            self.materials.len()
        );
        self.gpu = Some(GpuResources {
            device: ctx.device.clone(),
            layout,
            meshes,
            materials,
        });
    }

    pub fn is_attached(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu_mesh(&self, id: GeometryId) -> Option<&GpuMesh> {
        self.gpu.as_ref()?.meshes.get(id.0 as usize)
    }

    pub fn material_bind_group(&self, id: MaterialId) -> Option<&wgpu::BindGroup> {
        self.gpu
            .as_ref()?
            .materials
            .get(id.0 as usize)
            .map(|m| &m.bind_group)
    }

    pub fn material_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.gpu.as_ref().map(|g| &g.layout)
    }

    /// Release GPU copies. CPU registrations and handles stay valid.
    pub fn dispose(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            for mesh in &gpu.meshes {
                mesh.destroy();
            }
            for material in &gpu.materials {
                material.buffer.destroy();
            }
        }
    }
}

fn upload_material(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    material: &Material,
) -> GpuMaterial {
    let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("material-uniform"),
        contents: bytemuck::bytes_of(&material.to_uniform()),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("material-bind-group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    });
    GpuMaterial { buffer, bind_group }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_sequential_and_distinct() {
        let mut reg = ResourceRegistry::new();
        let a = reg.add_geometry("sphere", MeshData::icosphere(1));
        let b = reg.add_geometry("rock", MeshData::rock(1, 0, 0.2));
        assert_ne!(a, b);
        let m0 = reg.add_material(Material::lit([1.0, 0.0, 0.0]));
        let m1 = reg.add_material(Material::lit([1.0, 0.0, 0.0]));
        // Equal values still get separate handles.
        assert_ne!(m0, m1);
        assert_eq!(reg.geometry_count(), 2);
        assert_eq!(reg.material(m1).unwrap().color, [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_material_uniform_size() {
        assert_eq!(std::mem::size_of::<MaterialUniform>(), 32);
    }

    #[test]
    fn test_attach_uploads_existing_and_later_entries() {
        let Some(ctx) = GpuContext::try_headless() else {
            return;
        };
        let mut reg = ResourceRegistry::new();
        let early = reg.add_geometry("early", MeshData::icosphere(0));
        let mat = reg.add_material(Material::emissive([1.0, 0.9, 0.6]));
        assert!(reg.gpu_mesh(early).is_none());

        reg.attach(&ctx);
        let late = reg.add_geometry("late", MeshData::icosphere(1));
        assert_eq!(reg.gpu_mesh(early).unwrap().index_count, 60);
        assert!(reg.gpu_mesh(late).is_some());
        assert!(reg.material_bind_group(mat).is_some());

        reg.dispose();
        assert!(!reg.is_attached());
        assert!(reg.geometry(late).is_some());
    }
}
