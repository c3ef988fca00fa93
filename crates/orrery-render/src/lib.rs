//! GPU side of the orrery: batched body meshes, ring-buffer trails, and the
//! vertex-stage debris animator.
//!
//! Every system keeps its CPU state usable without a device and allocates GPU
//! resources only when built against a [`GpuContext`]. Each GPU buffer is
//! owned by exactly one system and released exactly once by its `dispose()`.

pub mod camera;
pub mod debris;
pub mod gpu;
pub mod instancing;
pub mod mesh;
pub mod resources;
pub mod target;
pub mod trails;

pub use camera::{Camera, CameraBinding, CameraUniform};
pub use debris::{DebrisDistribution, DebrisField, DebrisInstance, DebrisUniforms};
pub use gpu::{GpuContext, GpuContextError};
pub use instancing::{GroupId, GroupKey, InstanceBatcher, InstanceHandle, InstanceRaw};
pub use mesh::{GpuMesh, MeshData, Vertex};
pub use resources::{GeometryId, Material, MaterialId, ResourceRegistry};
pub use target::{FrameTarget, ShadowMap, TargetFormats};
pub use trails::{TrailId, TrailSystem};
