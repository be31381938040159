//! maidan-track - Multi-camera vision tracking for the maidan soccer
//! robot controller.
//!
//! # Module layout
//! - [`types`]            — boundary records and coordinate conversions
//! - [`kalman`]           — fixed-size linear Kalman filter
//! - [`ball_filter`]      — ground-motion ball filter
//! - [`collision_filter`] — ball filter with robot interaction reasoning
//! - [`robot_filter`]     — per-robot filter with orientation tracking
//! - [`tracker`]          — multi-camera orchestration and world state
//!
//! The tracker runs on a single logical thread; vision packets and
//! commands arrive through bounded queues drained at frame boundaries.
//! Frames older than the tracked state never mutate it, and world state
//! snapshots reflect exactly the frames with a source time up to the
//! queried time.

pub mod ball_filter;
pub mod collision_filter;
pub mod kalman;
pub mod robot_filter;
pub mod tracker;
pub mod types;

pub use ball_filter::{BallGroundFilter, GroundFilterConfig};
pub use collision_filter::{BallCollisionFilter, CollisionFilterConfig, GroundFilterMode};
pub use kalman::KalmanFilter;
pub use robot_filter::{RobotFilter, RobotFilterConfig};
pub use tracker::{DebugValues, Tracker, TrackerConfig};
pub use types::{
    Aoi, BallDetection, BallOffsetInfo, BallState, CameraCalibration, CameraInfo, DetectionFrame,
    FieldGeometry, GeometryFrame, RadioCommand, RadioResponse, RobotDetection, RobotIdentifier,
    RobotInfo, TeamColor, TrackedRobot, TrackingCommand, VisionPacket, WorldStateSnapshot,
};
