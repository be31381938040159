//! Boundary records of the tracking core.
//!
//! Vision detections arrive in SSL vision coordinates: millimeters, with
//! the field's long axis along vision x. Internally everything is meters
//! in field coordinates with `(x, y) = (-vision_y, vision_x) / 1000`; the
//! field flip negates both axes at the output boundary.

use maidan_core::{Vector2, math::normalize_angle};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f32::consts::{FRAC_PI_2, PI};

pub const ROBOT_RADIUS: f32 = 0.09;
pub const ROBOT_HEIGHT: f32 = 0.15;
pub const BALL_RADIUS: f32 = 0.0215;
/// Width of the dribbler bar, modeled as a chord in front of the robot.
pub const DRIBBLER_WIDTH: f32 = 0.07;
/// Distance from the robot center to the dribbler bar.
pub const DRIBBLER_OFFSET: f32 = 0.08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeamColor {
    Yellow,
    Blue,
}

/// Team-qualified robot id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RobotIdentifier {
    pub team: TeamColor,
    pub id: u32,
}

/// A ball detection in vision coordinates (millimeters).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallDetection {
    pub x: f32,
    pub y: f32,
}

/// A robot detection in vision coordinates (millimeters, radians).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RobotDetection {
    pub robot_id: u32,
    pub x: f32,
    pub y: f32,
    pub orientation: f32,
}

/// One decoded camera detection frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub camera_id: u32,
    /// Capture timestamp on the vision computer, seconds.
    pub t_capture: f64,
    /// Send timestamp on the vision computer, seconds.
    pub t_sent: f64,
    pub balls: Vec<BallDetection>,
    pub robots_yellow: Vec<RobotDetection>,
    pub robots_blue: Vec<RobotDetection>,
}

/// Camera extrinsics as delivered by vision geometry frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub camera_id: u32,
    /// Derived camera world position in millimeters (vision frame), if the
    /// calibration carries one.
    pub derived_camera_world: Option<[f32; 3]>,
    pub focal_length: f32,
}

/// Field dimensions in millimeters, straight from the vision geometry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FieldSizeRaw {
    pub line_width: f32,
    pub field_length: f32,
    pub field_width: f32,
    pub boundary_width: f32,
    pub goal_width: f32,
    pub goal_depth: f32,
    pub goal_wall_width: f32,
    pub center_circle_radius: f32,
    pub defense_radius: f32,
    pub defense_stretch: f32,
}

/// Field geometry in meters, as reported in world snapshots.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FieldGeometry {
    pub line_width: f32,
    pub field_width: f32,
    pub field_height: f32,
    pub boundary_width: f32,
    pub goal_width: f32,
    pub goal_depth: f32,
    pub goal_wall_width: f32,
    pub center_circle_radius: f32,
    pub defense_radius: f32,
    pub defense_stretch: f32,
    pub goal_height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometryFrame {
    pub field: FieldSizeRaw,
    pub calibrations: Vec<CameraCalibration>,
}

/// A decoded vision packet; either part may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionPacket {
    pub detection: Option<DetectionFrame>,
    pub geometry: Option<GeometryFrame>,
}

/// Camera id to position/focal length mapping, built from geometry frames.
#[derive(Debug, Clone, Default)]
pub struct CameraInfo {
    pub camera_position: HashMap<u32, Vector3<f32>>,
    pub focal_length: HashMap<u32, f32>,
}

/// Per-frame snapshot of a tracked robot, used for ball interaction
/// reasoning. Dribbler direction is `normalize(dribbler_pos - robot_pos)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RobotInfo {
    pub identifier: RobotIdentifier,
    pub robot_pos: Vector2,
    pub dribbler_pos: Vector2,
    pub speed: Vector2,
    pub kick_chip: bool,
    pub kick_linear: bool,
}

/// A single ball observation in field coordinates with its context.
#[derive(Debug, Clone, Copy)]
pub struct VisionFrame {
    pub pos: Vector2,
    /// Source time of the frame, nanoseconds.
    pub time: i64,
    pub camera_id: u32,
    /// The robot closest to the detection, if any robot is tracked.
    pub robot_info: Option<RobotInfo>,
}

/// Ball position relative to a robot while a dribbling or pushing contact
/// is active. Exists iff the ball is believed to touch the robot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BallOffsetInfo {
    pub robot_identifier: RobotIdentifier,
    /// Offset in the robot-local frame: x along the dribbler direction,
    /// y perpendicular to it.
    pub ball_offset: Vector2,
    /// Last position the ball was projected to while being pushed.
    pub pushing_ball_pos: Vector2,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BallState {
    pub pos: Vector2,
    pub speed: Vector2,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackedRobot {
    pub id: u32,
    pub pos: Vector2,
    pub speed: Vector2,
    pub orientation: f32,
    /// Set when the speed estimate exceeds the configured maximum and is
    /// only an estimate, not a physically plausible value.
    pub estimate_only: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Aoi {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// World state as seen at a given time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldStateSnapshot {
    pub time: i64,
    pub has_vision_data: bool,
    pub ball: Option<BallState>,
    pub yellow: Vec<TrackedRobot>,
    pub blue: Vec<TrackedRobot>,
    pub geometry: Option<FieldGeometry>,
    pub tracking_aoi: Option<Aoi>,
}

/// Runtime controls; absent fields leave the current value unchanged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrackingCommand {
    pub aoi_enabled: Option<bool>,
    pub aoi: Option<Aoi>,
    /// Processing delay subtracted from packet receive times, nanoseconds.
    pub system_delay: Option<i64>,
    pub reset: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KickStyle {
    Linear,
    Chip,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RadioCommand {
    pub dribbler_speed: f32,
    pub kick_style: Option<KickStyle>,
}

/// Feedback about a command sent to a robot, forwarded to its filters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RadioResponse {
    pub robot_id: u32,
    pub team: TeamColor,
    pub command: RadioCommand,
    pub time: i64,
}

/// Convert vision millimeters to field meters.
#[inline]
pub fn vision_to_field(x_mm: f32, y_mm: f32) -> Vector2 {
    Vector2::new(-y_mm / 1000.0, x_mm / 1000.0)
}

/// Convert a vision-frame orientation to the field frame.
#[inline]
pub fn vision_orientation_to_field(phi: f32, flip: bool) -> f32 {
    normalize_angle(phi + FRAC_PI_2 + if flip { PI } else { 0.0 })
}

/// AOI gate, evaluated in (flipped) field coordinates like all outputs.
pub fn is_in_aoi(x_mm: f32, y_mm: f32, flip: bool, aoi: &Aoi) -> bool {
    let mut v = vision_to_field(x_mm, y_mm);
    if flip {
        v = -v;
    }
    v.x > aoi.x1 && v.x < aoi.x2 && v.y > aoi.y1 && v.y < aoi.y2
}
