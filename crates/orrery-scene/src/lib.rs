//! Transform hierarchy and tracked bodies.
//!
//! A [`SceneGraph`] holds every transform the renderers read. A
//! [`BodySystem`] owns the tracked bodies and writes their pivot and mesh
//! transforms each tick; batching, trails and labels only ever read settled
//! world transforms through [`NodeId`] handles.

mod bodies;
mod graph;

pub use bodies::{BodyDesc, BodyId, BodySystem, SpinState, SystemError, TrackedBody};
pub use graph::{NodeId, SceneGraph, Transform};
