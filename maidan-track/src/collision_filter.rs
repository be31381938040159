//! Ball filter with robot interaction reasoning.
//!
//! Wraps two ground filters (live and one vision tick behind) and projects
//! the reported ball position when the extrapolated ball has entered a
//! robot hull or crossed the dribbler bar between the past and current
//! state. While the ball is invisible and a contact is active, the ball is
//! carried along with the robot via the stored local offset.

use crate::ball_filter::{BallGroundFilter, GroundFilterConfig};
use crate::types::{
    BALL_RADIUS, BallOffsetInfo, BallState, CameraInfo, DRIBBLER_WIDTH, ROBOT_HEIGHT,
    ROBOT_RADIUS, RobotInfo, VisionFrame,
};
use maidan_core::Vector2;
use nalgebra::Vector3;
use serde::Deserialize;

/// Distance gate on the last reported position; detections within it are
/// accepted even when the ground filter itself would reject them.
const ACCEPT_BALL_DIST: f32 = 0.5;

/// Invisible time after which an active contact switches the output to the
/// carried-along ball position, milliseconds.
const ACTIVATE_DRIBBLING_TIME_MS: i64 = 80;

/// Invisible time after which the reported speed is rewritten; below it
/// the visible filter's speed is held to avoid jitter, milliseconds.
const RESET_SPEED_TIME_MS: i64 = 150;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CollisionFilterConfig {
    /// Run the collision and dribbling projection. Disabling reduces the
    /// filter to the plain ground filter.
    pub collision_reasoning: bool,
    pub ground: GroundFilterConfig,
}

impl Default for CollisionFilterConfig {
    fn default() -> Self {
        Self {
            collision_reasoning: true,
            ground: GroundFilterConfig::default(),
        }
    }
}

/// How the reported ball state was produced, for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundFilterMode {
    Regular,
    Dribbling,
    InvisibleStandingBall,
    InsideRobotKeepProjection,
    InsideRobotNewProjection,
    OutsideRobotProjection,
}

impl GroundFilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroundFilterMode::Regular => "regular ground filter",
            GroundFilterMode::Dribbling => "dribbling",
            GroundFilterMode::InvisibleStandingBall => "invisible standing ball",
            GroundFilterMode::InsideRobotKeepProjection => "inside robot (keep projection)",
            GroundFilterMode::InsideRobotNewProjection => "inside robot (new projection)",
            GroundFilterMode::OutsideRobotProjection => "outside robot projection",
        }
    }
}

/// Ball filter composing ground motion with robot collision reasoning.
#[derive(Debug, Clone)]
pub struct BallCollisionFilter {
    config: CollisionFilterConfig,
    ground: BallGroundFilter,
    past: BallGroundFilter,
    /// The previous frame, fed to the past filter one tick late.
    pending_past_frame: Option<VisionFrame>,

    last_vision_time: i64,
    local_ball_offset: Option<BallOffsetInfo>,
    inside_robot_offset: Option<BallOffsetInfo>,
    last_reported_pos: Vector2,
    feasibly_invisible: bool,
    /// The next vision frame re-seeds the sub-filters instead of stepping
    /// them forward. Set after the output was taken over by a projection.
    reset_filters: bool,

    primary_camera: u32,
    init_time: i64,
    last_update: i64,
    frame_counter: u32,
}

impl BallCollisionFilter {
    pub fn new(frame: &VisionFrame, config: CollisionFilterConfig) -> Self {
        Self {
            config,
            ground: BallGroundFilter::new(frame, config.ground),
            past: BallGroundFilter::new(frame, config.ground),
            pending_past_frame: None,
            last_vision_time: frame.time,
            local_ball_offset: None,
            inside_robot_offset: None,
            last_reported_pos: frame.pos,
            feasibly_invisible: false,
            reset_filters: false,
            primary_camera: frame.camera_id,
            init_time: frame.time,
            last_update: frame.time,
            frame_counter: 0,
        }
    }

    /// Copy a filter for camera hand-off.
    pub fn clone_for_camera(&self, camera_id: u32) -> Self {
        let mut copy = self.clone();
        copy.primary_camera = camera_id;
        copy.ground.set_primary_camera(camera_id);
        copy.past.set_primary_camera(camera_id);
        copy
    }

    #[inline]
    pub fn primary_camera(&self) -> u32 {
        self.primary_camera
    }

    #[inline]
    pub fn init_time(&self) -> i64 {
        self.init_time
    }

    #[inline]
    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    #[inline]
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    #[inline]
    pub fn feasibly_invisible(&self) -> bool {
        self.feasibly_invisible
    }

    pub fn accept_detection(&self, frame: &VisionFrame) -> bool {
        let reported_dist = self.last_reported_pos.distance(frame.pos);
        reported_dist < ACCEPT_BALL_DIST || self.ground.accept_detection(frame)
    }

    /// Feed an accepted detection of the primary camera. The past filter
    /// trails the live filter by one frame.
    pub fn add_vision_frame(&mut self, frame: VisionFrame) {
        self.frame_counter += 1;
        self.last_update = frame.time;
        self.last_vision_time = frame.time;

        if self.reset_filters {
            self.ground.reset(&frame);
            self.past.reset(&frame);
            self.pending_past_frame = None;
            self.reset_filters = false;
        } else {
            self.ground.process_frame(&frame);
            if let Some(previous) = self.pending_past_frame.take() {
                self.past.process_frame(&previous);
            }
        }

        // a detection touching the nearest robot establishes the contact
        // offset while the ball is still visible
        if self.config.collision_reasoning {
            if let Some(robot) = frame.robot_info {
                if is_inside_robot(frame.pos, &robot, ROBOT_RADIUS + BALL_RADIUS) {
                    self.update_dribbling_info(frame.pos, &robot);
                }
            }
        }
        self.pending_past_frame = Some(frame);
    }

    /// Distance of the last report to the primary camera, used for filter
    /// prioritization. The ball model is 2-D ground motion, so this is
    /// always the horizontal distance.
    pub fn dist_to_camera(&self, cameras: &CameraInfo) -> f32 {
        match cameras.camera_position.get(&self.primary_camera) {
            Some(pos) => self
                .last_reported_pos
                .distance(Vector2::new(pos.x, pos.y)),
            None => f32::MAX,
        }
    }

    /// Report the ball state at `time` and remember it for gating and
    /// invisibility reasoning.
    pub fn write_ball_state(
        &mut self,
        time: i64,
        robots: &[RobotInfo],
        cameras: &CameraInfo,
    ) -> (BallState, GroundFilterMode) {
        let (state, mode) = self.compute_ball_state(time, robots, cameras);
        self.last_reported_pos = state.pos;
        self.feasibly_invisible = self.check_feasible_invisibility(robots, cameras);
        (state, mode)
    }

    fn camera_position(&self, cameras: &CameraInfo) -> Option<Vector3<f32>> {
        cameras.camera_position.get(&self.primary_camera).copied()
    }

    fn compute_ball_state(
        &mut self,
        time: i64,
        robots: &[RobotInfo],
        cameras: &CameraInfo,
    ) -> (BallState, GroundFilterMode) {
        let mut state = self.ground.state_at(time);
        if !self.config.collision_reasoning {
            return (state, GroundFilterMode::Regular);
        }

        let past_state = self.past.state_at(self.last_vision_time + 1);
        let camera_pos = self.camera_position(cameras);

        let invisible_time_ms = (time - self.last_vision_time) / 1_000_000;
        let write_ball_speed = invisible_time_ms > RESET_SPEED_TIME_MS;

        // carry the ball with the robot while it is invisible and a
        // contact is active
        if invisible_time_ms > ACTIVATE_DRIBBLING_TIME_MS {
            if let Some(offset) = self.local_ball_offset {
                if let Some(robot) = robots
                    .iter()
                    .find(|r| r.identifier == offset.robot_identifier)
                {
                    let ball_pos = unproject_relative_position(offset.ball_offset, robot);
                    let mut offset = offset;
                    if is_inside_robot(offset.pushing_ball_pos, robot, ROBOT_RADIUS) {
                        offset.pushing_ball_pos = ball_pos;
                    }
                    let pushing_pos_visible = camera_pos
                        .map(|c| {
                            is_ball_visible(offset.pushing_ball_pos, robot, ROBOT_RADIUS, ROBOT_HEIGHT, c)
                        })
                        .unwrap_or(true);
                    self.local_ball_offset = Some(offset);
                    self.reset_filters = true;
                    if pushing_pos_visible {
                        set_ball_data(&mut state, ball_pos, robot.speed, write_ball_speed);
                        return (state, GroundFilterMode::Dribbling);
                    } else {
                        set_ball_data(
                            &mut state,
                            offset.pushing_ball_pos,
                            Vector2::zero(),
                            write_ball_speed,
                        );
                        return (state, GroundFilterMode::InvisibleStandingBall);
                    }
                }
            }
        } else {
            self.local_ball_offset = None;
        }

        let past_pos = past_state.pos;
        let mut current_pos = state.pos;
        let mut mode = GroundFilterMode::Regular;
        for robot in robots {
            if is_inside_robot(past_pos, robot, ROBOT_RADIUS) {
                if let Some(inside_offset) = self.inside_robot_offset {
                    if inside_offset.robot_identifier == robot.identifier {
                        let ball_pos = unproject_relative_position(inside_offset.ball_offset, robot);
                        set_ball_data(&mut state, ball_pos, robot.speed, write_ball_speed);
                        self.local_ball_offset = Some(inside_offset);
                        return (state, GroundFilterMode::InsideRobotKeepProjection);
                    }
                }

                let relative_speed = past_state.speed - robot.speed;
                let project_dir = if relative_speed.length() < 0.001 {
                    past_pos - robot.robot_pos
                } else {
                    -relative_speed
                };
                let far_point = past_pos + project_dir.normalized() * 1000.0;
                let near_point = past_pos - project_dir.normalized() * 1000.0;
                let close_intersection =
                    intersect_segment_robot(past_pos, far_point, robot, ROBOT_RADIUS, 1.0);
                let far_intersection =
                    intersect_segment_robot(past_pos, near_point, robot, ROBOT_RADIUS, 1.0);
                if let (Some(close), Some(far)) = (close_intersection, far_intersection) {
                    let close_dist = close.distance(past_pos);
                    let far_dist = far.distance(past_pos);
                    let projected = if close_dist < far_dist * 2.0 { close } else { far };
                    set_ball_data(&mut state, projected, robot.speed, write_ball_speed);

                    self.update_dribbling_info(projected, robot);
                    self.inside_robot_offset = self.local_ball_offset;
                    return (state, GroundFilterMode::InsideRobotNewProjection);
                }
            }

            // the extrapolated ball crossed into the robot since the past
            // state: clamp it onto the entry intersection
            if let Some(intersection) =
                intersect_segment_robot(past_pos, current_pos, robot, ROBOT_RADIUS, 1.0)
            {
                current_pos = intersection;
                set_ball_data(&mut state, current_pos, robot.speed, write_ball_speed);
                mode = GroundFilterMode::OutsideRobotProjection;
                self.update_dribbling_info(intersection, robot);
            }
        }

        self.inside_robot_offset = None;
        (state, mode)
    }

    fn update_dribbling_info(&mut self, projected_ball_pos: Vector2, robot: &RobotInfo) {
        let to_dribbler = (robot.dribbler_pos - robot.robot_pos).normalized();
        let rel = projected_ball_pos - robot.robot_pos;
        self.local_ball_offset = Some(BallOffsetInfo {
            robot_identifier: robot.identifier,
            ball_offset: Vector2::new(rel.dot(to_dribbler), rel.dot(to_dribbler.perpendicular())),
            pushing_ball_pos: projected_ball_pos,
        });
    }

    fn check_feasible_invisibility(&self, robots: &[RobotInfo], cameras: &CameraInfo) -> bool {
        let Some(offset) = self.local_ball_offset else {
            return false;
        };
        let Some(robot) = robots
            .iter()
            .find(|r| r.identifier == offset.robot_identifier)
        else {
            return false;
        };
        let Some(camera_pos) = self.camera_position(cameras) else {
            return false;
        };
        if !is_ball_visible(offset.pushing_ball_pos, robot, ROBOT_RADIUS, ROBOT_HEIGHT, camera_pos) {
            return true;
        }
        !is_ball_visible(self.last_reported_pos, robot, ROBOT_RADIUS, ROBOT_HEIGHT, camera_pos)
    }
}

fn set_ball_data(state: &mut BallState, pos: Vector2, speed: Vector2, write_speed: bool) {
    state.pos = pos;
    if write_speed {
        state.speed = speed;
    }
}

/// Reconstruct a field position from a robot-local dribbler-frame offset.
fn unproject_relative_position(relative_pos: Vector2, robot: &RobotInfo) -> Vector2 {
    let to_dribbler = (robot.dribbler_pos - robot.robot_pos).normalized();
    robot.robot_pos + to_dribbler * relative_pos.x + to_dribbler.perpendicular() * relative_pos.y
}

/// Inside the hull circle and behind the dribbler plane.
fn is_inside_robot(pos: Vector2, robot: &RobotInfo, robot_radius: f32) -> bool {
    if (pos - robot.robot_pos).length() > robot_radius {
        return false;
    }
    let to_dribbler = (robot.dribbler_pos - robot.robot_pos).normalized();
    (pos - robot.dribbler_pos).dot(to_dribbler) <= 0.0
}

/// Intersections of the line `offset + lambda * dir` with a circle. The
/// direction is normalized first, so the returned lambdas are distances
/// from `offset`.
fn intersect_line_circle(
    offset: Vector2,
    dir: Vector2,
    center: Vector2,
    radius: f32,
) -> Vec<(Vector2, f32)> {
    let dir = dir.normalized();
    let const_part = offset - center;

    let a = dir.dot(dir);
    let b = 2.0 * dir.dot(const_part);
    let c = const_part.dot(const_part) - radius * radius;

    let det = b * b - 4.0 * a * c;
    if det < 0.0 {
        return Vec::new();
    }
    if det < 0.00001 {
        let lambda = -b / (2.0 * a);
        return vec![(offset + dir * lambda, lambda)];
    }
    let lambda1 = (-b + det.sqrt()) / (2.0 * a);
    let lambda2 = (-b - det.sqrt()) / (2.0 * a);
    vec![
        (offset + dir * lambda1, lambda1),
        (offset + dir * lambda2, lambda2),
    ]
}

fn intersect_line_segment_circle(
    p1: Vector2,
    p2: Vector2,
    center: Vector2,
    radius: f32,
) -> Option<Vector2> {
    let dist = (p2 - p1).length();
    let mut intersections = intersect_line_circle(p1, p2 - p1, center, radius);
    if intersections.is_empty() {
        return None;
    }
    if intersections.len() == 1 {
        let (point, lambda) = intersections[0];
        return (lambda >= 0.0 && lambda <= dist).then_some(point);
    }
    if intersections[0].1 > intersections[1].1 {
        intersections.swap(0, 1);
    }
    intersections
        .iter()
        .find(|(_, lambda)| *lambda >= 0.0 && *lambda <= dist)
        .map(|(point, _)| *point)
}

/// Intersection lambdas of two lines, or `None` for collinear directions.
fn intersect_line_line(
    pos1: Vector2,
    dir1: Vector2,
    pos2: Vector2,
    dir2: Vector2,
) -> Option<(f32, f32)> {
    if (dir1.perpendicular().dot(dir2)).abs() / (dir1.length() * dir2.length()) < 0.0001 {
        return None;
    }
    let normal1 = dir1.perpendicular();
    let normal2 = dir2.perpendicular();
    let diff = pos2 - pos1;
    let t1 = normal2.dot(diff) / normal2.dot(dir1);
    let t2 = -normal1.dot(diff) / normal1.dot(dir2);
    Some((t1, t2))
}

/// First intersection of the segment p1->p2 with a robot: the dribbler bar
/// when approached from the front, the hull circle otherwise; the closer
/// one when both intersect.
fn intersect_segment_robot(
    p1: Vector2,
    p2: Vector2,
    robot: &RobotInfo,
    mut robot_radius: f32,
    robot_size_factor: f32,
) -> Option<Vector2> {
    let mut dribbler_pos = robot.dribbler_pos;
    if robot_size_factor != 1.0 {
        robot_radius *= robot_size_factor;
        dribbler_pos = robot.robot_pos + (robot.dribbler_pos - robot.robot_pos) * robot_size_factor;
    }

    let to_dribbler = (dribbler_pos - robot.robot_pos).normalized();
    let dribbler_sideways = to_dribbler.perpendicular();
    let dribbler_intersection = intersect_line_line(dribbler_pos, dribbler_sideways, p1, p2 - p1);
    let mut dribbler_intersection_pos = None;
    if let Some((t1, t2)) = dribbler_intersection {
        if t1.abs() <= DRIBBLER_WIDTH / 2.0 && t2 >= 0.0 && t2 <= 1.0 {
            let pos = dribbler_pos + dribbler_sideways * t1;
            dribbler_intersection_pos = Some(pos);
            if (p1 - dribbler_pos).dot(to_dribbler) >= 0.0 {
                // the segment comes from in front of the robot, the bar
                // intersection is the correct one
                return dribbler_intersection_pos;
            }
        }
    }
    let hull_intersection = intersect_line_segment_circle(p1, p2, robot.robot_pos, robot_radius);
    match (dribbler_intersection_pos, hull_intersection) {
        (Some(dribbler), Some(hull)) => {
            if (hull - p1).length() < (dribbler - p1).length() {
                Some(hull)
            } else {
                Some(dribbler)
            }
        }
        (_, hull) => hull,
    }
}

/// Whether the ball at `pos` is visible to the camera or shadowed by the
/// robot body.
fn is_ball_visible(
    pos: Vector2,
    robot: &RobotInfo,
    robot_radius: f32,
    robot_height: f32,
    camera_pos: Vector3<f32>,
) -> bool {
    let to_ball = Vector3::new(pos.x, pos.y, BALL_RADIUS) - camera_pos;
    let length = (camera_pos.z - robot_height) / (camera_pos.z - BALL_RADIUS);
    let projected = camera_pos + to_ball * length;
    let projected_2d = Vector2::new(projected.x, projected.y);

    let in_radius = (robot.robot_pos - projected_2d).length() <= robot_radius;
    let front_of_dribbler =
        (projected_2d - robot.dribbler_pos).dot(robot.dribbler_pos - robot.robot_pos) > 0.0;
    let has_intersection =
        intersect_segment_robot(pos, projected_2d, robot, robot_radius, 0.98).is_some();
    (!in_radius || front_of_dribbler) && !has_intersection
}
