//! Shared state types and timebase helpers.
//!
//! Timestamps throughout the controller are nanoseconds on a monotonic
//! clock; durations handed to the math layers are seconds as f32.

use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

/// Position and velocity of a tracked or planned object.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RobotState {
    /// Position in meters, field frame.
    pub pos: Vector2,
    /// Velocity in meters per second.
    pub speed: Vector2,
}

impl RobotState {
    pub fn new(pos: Vector2, speed: Vector2) -> Self {
        Self { pos, speed }
    }
}

/// A sampled point of a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub state: RobotState,
    /// Time offset from the trajectory start in seconds.
    pub time: f32,
}

/// Duration between two nanosecond timestamps, in seconds.
#[inline]
pub fn duration_secs(from_ns: i64, to_ns: i64) -> f32 {
    ((to_ns - from_ns) as f64 * 1e-9) as f32
}
