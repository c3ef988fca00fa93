//! Screen-space label decluttering.
//!
//! Body labels are projected to the viewport and resolved nearest first
//! against a uniform occupancy grid, so overlap checks touch only the cells a
//! label covers instead of every other label.

mod grid;

pub use grid::{LabelCandidate, LabelCollisionGrid, LabelPlacement, project_to_screen};
