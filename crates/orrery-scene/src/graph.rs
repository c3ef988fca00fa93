//! Flat-array transform hierarchy.
//!
//! Nodes are appended with an optional parent that must already exist, so
//! parents always precede children in storage and world transforms settle in
//! a single forward pass.

use glam::{Mat4, Quat, Vec3};

/// Handle to a node in a [`SceneGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Storage index of the node.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Local translation, rotation and scale relative to the parent node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// A pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Compose into an affine matrix (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    local: Transform,
    world: Mat4,
}

/// Owner of every transform in the simulation.
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: Vec<Node>,
}

impl SceneGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. `parent` must be a node of this graph.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this graph.
    pub fn add_node(&mut self, parent: Option<NodeId>, local: Transform) -> NodeId {
        if let Some(p) = parent {
            assert!(p.index() < self.nodes.len(), "parent {p:?} is not in this graph");
        }
        let world = match parent {
            Some(p) => self.nodes[p.index()].world * local.to_matrix(),
            None => local.to_matrix(),
        };
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            parent,
            local,
            world,
        });
        id
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` refers to a node in this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    /// Parent of a node, if any.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.index()).and_then(|n| n.parent)
    }

    /// Local transform of a node.
    pub fn local(&self, id: NodeId) -> Option<&Transform> {
        self.nodes.get(id.index()).map(|n| &n.local)
    }

    /// Mutable local transform. World transforms are stale until the next
    /// [`update_world_transforms`](Self::update_world_transforms).
    pub fn local_mut(&mut self, id: NodeId) -> Option<&mut Transform> {
        self.nodes.get_mut(id.index()).map(|n| &mut n.local)
    }

    /// Set a node's local translation.
    pub fn set_translation(&mut self, id: NodeId, translation: Vec3) {
        if let Some(local) = self.local_mut(id) {
            local.translation = translation;
        }
    }

    /// Set a node's local rotation.
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) {
        if let Some(local) = self.local_mut(id) {
            local.rotation = rotation;
        }
    }

    /// Set a node's local scale.
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        if let Some(local) = self.local_mut(id) {
            local.scale = scale;
        }
    }

    /// World transform as of the last settle, identity for unknown nodes.
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        self.nodes
            .get(id.index())
            .map(|n| n.world)
            .unwrap_or(Mat4::IDENTITY)
    }

    /// World-space origin of a node as of the last settle.
    pub fn world_position(&self, id: NodeId) -> Vec3 {
        self.world_transform(id).w_axis.truncate()
    }

    /// Recompute every world transform from local transforms.
    pub fn update_world_transforms(&mut self) {
        for i in 0..self.nodes.len() {
            let local = self.nodes[i].local.to_matrix();
            let world = match self.nodes[i].parent {
                Some(p) => self.nodes[p.index()].world * local,
                None => local,
            };
            self.nodes[i].world = world;
        }
    }
}
