//! maidan-core - Geometry primitives and shared types for the maidan
//! soccer robot controller.
//!
//! # Module layout
//! - [`vector`]       — 2D vectors in field coordinates
//! - [`segment`]      — line segments with distance queries
//! - [`bounding_box`] — axis-aligned bounding boxes
//! - [`math`]         — angle normalization and arithmetic
//! - [`types`]        — robot state, trajectory points, timebase helpers

pub mod bounding_box;
pub mod math;
pub mod segment;
pub mod types;
pub mod vector;

pub use bounding_box::BoundingBox;
pub use segment::LineSegment;
pub use types::{RobotState, TrajectoryPoint, duration_secs};
pub use vector::Vector2;
