//! Multi-camera tracking orchestration.
//!
//! Buffers incoming vision packets with their receive time, computes each
//! detection frame's source time, associates detections to per-object
//! filters and assembles time-aligned world state snapshots. All state is
//! owned by the processing thread; external threads post packets and
//! commands through bounded channels which are drained at frame
//! boundaries.

use crate::collision_filter::BallCollisionFilter;
use crate::robot_filter::RobotFilter;
use crate::types::{
    Aoi, BallDetection, CameraCalibration, CameraInfo, FieldGeometry, FieldSizeRaw,
    RadioResponse, RobotDetection, RobotIdentifier, RobotInfo, TeamColor, TrackedRobot,
    TrackingCommand, VisionFrame, VisionPacket, WorldStateSnapshot, is_in_aoi,
    vision_orientation_to_field, vision_to_field,
};
use crate::{CollisionFilterConfig, RobotFilterConfig};
use crossbeam_channel::{Receiver, Sender, bounded};
use maidan_core::{Vector2, math::normalize_angle};
use serde::Deserialize;
use std::collections::HashMap;
use std::f32::consts::PI;

/// After a reset, world state accepts zero-frame filters for this long.
const RESET_TIMEOUT_WORLD_NS: i64 = 500_000_000;
/// Same, for the best-robot list used in ball reasoning.
const RESET_TIMEOUT_BEST_ROBOTS_NS: i64 = 100_000_000;

/// Frames a filter must have seen before it is reported.
const MIN_FRAME_COUNT: u32 = 5;

/// Filter decay: peers of the same object decay fast, the last survivor
/// (once established) is kept longer.
const BALL_TIMEOUT_NS: i64 = 100_000_000;
const BALL_TIMEOUT_LAST_NS: i64 = 1_000_000_000;
const ROBOT_TIMEOUT_NS: i64 = 200_000_000;
const ROBOT_TIMEOUT_LAST_NS: i64 = 1_000_000_000;

/// Detections farther than this from every prediction open a new filter.
const ROBOT_ASSOCIATION_DISTANCE: f32 = 0.5;

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TrackerConfig {
    /// Constant processing delay subtracted from receive times, ns.
    pub system_delay: i64,
    pub robot: RobotFilterConfig,
    pub ball: CollisionFilterConfig,
}

/// Write-only key/value debug sink, cleared every frame. Opt-in.
#[derive(Debug, Clone, Default)]
pub struct DebugValues {
    enabled: bool,
    values: HashMap<String, String>,
}

impl DebugValues {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.values.clear();
        }
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    fn put(&mut self, key: &str, value: impl ToString) {
        if self.enabled {
            self.values.insert(key.to_string(), value.to_string());
        }
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Common aging interface of the per-object filters.
trait AgingFilter {
    fn last_update(&self) -> i64;
    fn frame_counter(&self) -> u32;
    /// The filter believes its object is legitimately invisible and may
    /// keep the longer timeout despite having peers.
    fn extended_grace(&self) -> bool {
        false
    }
}

impl AgingFilter for RobotFilter {
    fn last_update(&self) -> i64 {
        RobotFilter::last_update(self)
    }
    fn frame_counter(&self) -> u32 {
        RobotFilter::frame_counter(self)
    }
}

impl AgingFilter for BallCollisionFilter {
    fn last_update(&self) -> i64 {
        BallCollisionFilter::last_update(self)
    }
    fn frame_counter(&self) -> u32 {
        BallCollisionFilter::frame_counter(self)
    }
    fn extended_grace(&self) -> bool {
        self.feasibly_invisible()
    }
}

fn invalidate<F: AgingFilter>(
    filters: &mut Vec<F>,
    max_time: i64,
    max_time_last: i64,
    current_time: i64,
) {
    let mut i = 0;
    while i < filters.len() {
        let filter = &filters[i];
        let time_limit = if filter.extended_grace() {
            max_time_last
        } else if filters.len() > 1 || filter.frame_counter() < MIN_FRAME_COUNT {
            max_time
        } else {
            max_time_last
        };
        if filter.last_update() + time_limit < current_time {
            filters.remove(i);
        } else {
            i += 1;
        }
    }
}

/// First filter with enough frames, moved to the front for a stable
/// selection across queries.
fn best_filter(list: &mut Vec<RobotFilter>, min_frame_count: u32) -> Option<&mut RobotFilter> {
    let index = list
        .iter()
        .position(|f| f.frame_counter() >= min_frame_count)?;
    if index != 0 {
        let filter = list.remove(index);
        list.insert(0, filter);
    }
    Some(&mut list[0])
}

type RobotMap = HashMap<u32, Vec<RobotFilter>>;

/// The vision tracker.
pub struct Tracker {
    config: TrackerConfig,

    camera_info: CameraInfo,
    geometry: FieldGeometry,
    geometry_updated: bool,
    flip: bool,
    system_delay: i64,

    reset_time: i64,
    has_vision_data: bool,
    last_update_time: i64,

    aoi_enabled: bool,
    aoi: Aoi,

    ball_filters: Vec<BallCollisionFilter>,
    robot_filters_yellow: RobotMap,
    robot_filters_blue: RobotMap,

    vision_packets: Vec<(VisionPacket, i64)>,
    packet_tx: Sender<(VisionPacket, i64)>,
    packet_rx: Receiver<(VisionPacket, i64)>,
    command_tx: Sender<TrackingCommand>,
    command_rx: Receiver<TrackingCommand>,

    pub debug: DebugValues,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        let (packet_tx, packet_rx) = bounded(QUEUE_CAPACITY);
        let (command_tx, command_rx) = bounded(QUEUE_CAPACITY);
        Self {
            system_delay: config.system_delay,
            config,
            camera_info: CameraInfo::default(),
            geometry: FieldGeometry::default(),
            geometry_updated: false,
            flip: false,
            reset_time: 0,
            has_vision_data: false,
            last_update_time: 0,
            aoi_enabled: false,
            aoi: Aoi {
                x1: 0.0,
                y1: 0.0,
                x2: 0.0,
                y2: 0.0,
            },
            ball_filters: Vec::new(),
            robot_filters_yellow: RobotMap::new(),
            robot_filters_blue: RobotMap::new(),
            vision_packets: Vec::new(),
            packet_tx,
            packet_rx,
            command_tx,
            command_rx,
            debug: DebugValues::default(),
        }
    }

    /// Sender half for posting vision packets from other threads.
    pub fn packet_sender(&self) -> Sender<(VisionPacket, i64)> {
        self.packet_tx.clone()
    }

    /// Sender half for posting tracking commands from other threads.
    pub fn command_sender(&self) -> Sender<TrackingCommand> {
        self.command_tx.clone()
    }

    /// Buffer a packet directly (same-thread ingress).
    pub fn queue_packet(&mut self, packet: VisionPacket, receive_time: i64) {
        self.vision_packets.push((packet, receive_time));
        self.has_vision_data = true;
    }

    /// Toggle between the two playing directions.
    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    /// Forward command feedback to all filters of the addressed robot.
    pub fn queue_radio_responses(&mut self, responses: &[RadioResponse]) {
        for response in responses {
            let map = match response.team {
                TeamColor::Yellow => &mut self.robot_filters_yellow,
                TeamColor::Blue => &mut self.robot_filters_blue,
            };
            if let Some(list) = map.get_mut(&response.robot_id) {
                for filter in list.iter_mut() {
                    filter.add_radio_command(response.command, response.time);
                }
            }
        }
    }

    pub fn handle_command(&mut self, command: &TrackingCommand) {
        if let Some(enabled) = command.aoi_enabled {
            self.aoi_enabled = enabled;
        }
        if let Some(aoi) = command.aoi {
            self.aoi = aoi;
        }
        if let Some(delay) = command.system_delay {
            self.system_delay = delay;
        }
        if command.reset {
            self.reset();
        }
    }

    /// Wipe all filters and buffered packets. The reset windows let the
    /// world repopulate quickly afterwards.
    pub fn reset(&mut self) {
        self.ball_filters.clear();
        self.robot_filters_yellow.clear();
        self.robot_filters_blue.clear();
        self.vision_packets.clear();
        self.has_vision_data = false;
        self.reset_time = 0;
        self.last_update_time = 0;
        log::info!("tracker reset");
    }

    /// Drain queues and process all buffered packets in order.
    pub fn process(&mut self, current_time: i64) {
        // the reset time is used to show objects immediately after reset
        if self.reset_time == 0 {
            self.reset_time = current_time;
        }

        while let Ok(command) = self.command_rx.try_recv() {
            self.handle_command(&command);
        }
        while let Ok(entry) = self.packet_rx.try_recv() {
            self.vision_packets.push(entry);
            self.has_vision_data = true;
        }

        // remove outdated filters
        invalidate(
            &mut self.ball_filters,
            BALL_TIMEOUT_NS,
            BALL_TIMEOUT_LAST_NS,
            current_time,
        );
        for list in self.robot_filters_yellow.values_mut() {
            invalidate(list, ROBOT_TIMEOUT_NS, ROBOT_TIMEOUT_LAST_NS, current_time);
        }
        for list in self.robot_filters_blue.values_mut() {
            invalidate(list, ROBOT_TIMEOUT_NS, ROBOT_TIMEOUT_LAST_NS, current_time);
        }
        self.robot_filters_yellow.retain(|_, list| !list.is_empty());
        self.robot_filters_blue.retain(|_, list| !list.is_empty());

        self.geometry_updated = false;

        let packets = std::mem::take(&mut self.vision_packets);
        for (packet, receive_time) in packets {
            if let Some(geometry) = &packet.geometry {
                self.update_geometry(&geometry.field);
                for calibration in &geometry.calibrations {
                    self.update_camera(calibration);
                }
                self.geometry_updated = true;
            }

            let Some(detection) = &packet.detection else {
                continue;
            };
            let vision_processing_time =
                ((detection.t_sent - detection.t_capture) * 1e9) as i64;
            // the time on the field for which the frame was captured
            let source_time = receive_time - vision_processing_time - self.system_delay;

            // drop frames older than the current state
            if source_time <= self.last_update_time {
                log::debug!("dropping stale vision frame ({} ns old)", self.last_update_time - source_time);
                continue;
            }

            for robot in &detection.robots_yellow {
                self.track_robot(TeamColor::Yellow, robot, source_time, detection.camera_id);
            }
            for robot in &detection.robots_blue {
                self.track_robot(TeamColor::Blue, robot, source_time, detection.camera_id);
            }

            let best_robots = self.get_best_robots(source_time);
            for ball in &detection.balls {
                self.track_ball(ball, source_time, detection.camera_id, &best_robots);
            }

            self.last_update_time = source_time;
        }
    }

    /// Assemble the world state for the given time, reflecting all frames
    /// processed with a source time up to it.
    pub fn world_state(&mut self, current_time: i64) -> WorldStateSnapshot {
        let min_frame_count = if current_time > self.reset_time + RESET_TIMEOUT_WORLD_NS {
            MIN_FRAME_COUNT
        } else {
            0
        };

        self.debug.clear();

        let mut snapshot = WorldStateSnapshot {
            time: current_time,
            has_vision_data: self.has_vision_data,
            ..Default::default()
        };

        let flip = self.flip;
        let best_robots = self.get_best_robots(current_time);
        self.prioritize_ball_filters();
        if let Some(index) = self.best_ball_filter_index() {
            let Self {
                ball_filters,
                camera_info,
                debug,
                ..
            } = self;
            let filter = &mut ball_filters[index];
            let (mut state, mode) = filter.write_ball_state(current_time, &best_robots, camera_info);
            debug.put("ball/mode", mode.as_str());
            debug.put("ball/active camera", filter.primary_camera());
            if flip {
                state.pos = -state.pos;
                state.speed = -state.speed;
            }
            snapshot.ball = Some(state);
        }
        for list in self.robot_filters_yellow.values_mut() {
            if let Some(filter) = best_filter(list, min_frame_count) {
                snapshot.yellow.push(flipped_robot(filter.write_state(current_time), flip));
            }
        }
        for list in self.robot_filters_blue.values_mut() {
            if let Some(filter) = best_filter(list, min_frame_count) {
                snapshot.blue.push(flipped_robot(filter.write_state(current_time), flip));
            }
        }

        if self.geometry_updated {
            snapshot.geometry = Some(self.geometry);
        }
        if self.aoi_enabled {
            snapshot.tracking_aoi = Some(self.aoi);
        }
        self.debug.put("ball/filters", self.ball_filters.len());

        snapshot
    }

    /// Best robot snapshot per id, for ball interaction reasoning.
    fn get_best_robots(&mut self, current_time: i64) -> Vec<RobotInfo> {
        let min_frame_count = if current_time > self.reset_time + RESET_TIMEOUT_BEST_ROBOTS_NS {
            MIN_FRAME_COUNT
        } else {
            0
        };

        let mut robots = Vec::new();
        for list in self.robot_filters_yellow.values_mut() {
            if let Some(filter) = best_filter(list, min_frame_count) {
                robots.push(filter.robot_info(current_time));
            }
        }
        for list in self.robot_filters_blue.values_mut() {
            if let Some(filter) = best_filter(list, min_frame_count) {
                robots.push(filter.robot_info(current_time));
            }
        }
        robots
    }

    fn update_geometry(&mut self, raw: &FieldSizeRaw) {
        self.geometry = FieldGeometry {
            line_width: raw.line_width / 1000.0,
            field_width: raw.field_width / 1000.0,
            field_height: raw.field_length / 1000.0,
            boundary_width: raw.boundary_width / 1000.0,
            goal_width: raw.goal_width / 1000.0,
            goal_depth: raw.goal_depth / 1000.0,
            goal_wall_width: raw.goal_wall_width / 1000.0,
            center_circle_radius: raw.center_circle_radius / 1000.0,
            defense_radius: raw.defense_radius / 1000.0,
            defense_stretch: raw.defense_stretch / 1000.0,
            goal_height: 0.16,
        };
    }

    fn update_camera(&mut self, calibration: &CameraCalibration) {
        let Some(world) = calibration.derived_camera_world else {
            return;
        };
        // same axis swap as detections, meters
        let position = nalgebra::Vector3::new(-world[1] / 1000.0, world[0] / 1000.0, world[2] / 1000.0);
        self.camera_info
            .camera_position
            .insert(calibration.camera_id, position);
        self.camera_info
            .focal_length
            .insert(calibration.camera_id, calibration.focal_length);
    }

    fn track_robot(
        &mut self,
        team: TeamColor,
        detection: &RobotDetection,
        source_time: i64,
        camera_id: u32,
    ) {
        if self.aoi_enabled && !is_in_aoi(detection.x, detection.y, self.flip, &self.aoi) {
            return;
        }
        if !self.camera_info.camera_position.contains_key(&camera_id) {
            log::debug!("dropping robot detection from unknown camera {}", camera_id);
            return;
        }

        let pos = vision_to_field(detection.x, detection.y);
        let orientation = vision_orientation_to_field(detection.orientation, false);
        let config = self.config.robot;
        let identifier = RobotIdentifier {
            team,
            id: detection.robot_id,
        };
        let list = match team {
            TeamColor::Yellow => &mut self.robot_filters_yellow,
            TeamColor::Blue => &mut self.robot_filters_blue,
        }
        .entry(detection.robot_id)
        .or_default();

        // associate with the nearest predicted filter of the same id
        let mut nearest_distance = ROBOT_ASSOCIATION_DISTANCE;
        let mut nearest = None;
        for (i, filter) in list.iter().enumerate() {
            let distance = filter.distance_to(pos, source_time);
            if distance < nearest_distance {
                nearest_distance = distance;
                nearest = Some(i);
            }
        }
        let index = match nearest {
            Some(i) => i,
            None => {
                list.push(RobotFilter::new(
                    identifier,
                    pos,
                    orientation,
                    source_time,
                    camera_id,
                    config,
                ));
                list.len() - 1
            }
        };
        list[index].process_frame(pos, orientation, source_time, camera_id);
    }

    fn track_ball(
        &mut self,
        detection: &BallDetection,
        source_time: i64,
        camera_id: u32,
        best_robots: &[RobotInfo],
    ) {
        if self.aoi_enabled && !is_in_aoi(detection.x, detection.y, self.flip, &self.aoi) {
            return;
        }
        if !self.camera_info.camera_position.contains_key(&camera_id) {
            log::debug!("dropping ball detection from unknown camera {}", camera_id);
            return;
        }

        let pos = vision_to_field(detection.x, detection.y);
        let frame = VisionFrame {
            pos,
            time: source_time,
            camera_id,
            robot_info: nearest_robot_info(best_robots, pos),
        };

        let mut accepted_by_primary = false;
        let mut accepting_other_camera = None;
        for (i, filter) in self.ball_filters.iter_mut().enumerate() {
            if filter.accept_detection(&frame) {
                if filter.primary_camera() == camera_id {
                    filter.add_vision_frame(frame);
                    accepted_by_primary = true;
                } else {
                    // remember for camera hand-off in case no filter of
                    // the current camera accepts the frame
                    accepting_other_camera = Some(i);
                }
            }
        }

        if !accepted_by_primary {
            let mut filter = match accepting_other_camera {
                Some(i) => self.ball_filters[i].clone_for_camera(camera_id),
                None => BallCollisionFilter::new(&frame, self.config.ball),
            };
            filter.add_vision_frame(frame);
            self.ball_filters.push(filter);
        } else {
            // only prioritize when a detection was accepted
            self.prioritize_ball_filters();
        }
    }

    /// Order ball filters by the distance of their last report to their
    /// primary camera; the closest camera sees the ball most reliably.
    fn prioritize_ball_filters(&mut self) {
        let Self {
            ball_filters,
            camera_info,
            ..
        } = self;
        ball_filters.sort_by(|a, b| {
            a.dist_to_camera(camera_info)
                .partial_cmp(&b.dist_to_camera(camera_info))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// The oldest filter wins; among camera hand-off twins with the same
    /// init time the prioritized order decides.
    fn best_ball_filter_index(&self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (i, filter) in self.ball_filters.iter().enumerate() {
            match best {
                None => best = Some((i, filter.init_time())),
                Some((_, oldest)) if filter.init_time() < oldest => {
                    best = Some((i, filter.init_time()));
                }
                _ => {}
            }
        }
        best.map(|(i, _)| i)
    }
}

fn flipped_robot(mut robot: TrackedRobot, flip: bool) -> TrackedRobot {
    if flip {
        robot.pos = -robot.pos;
        robot.speed = -robot.speed;
        robot.orientation = normalize_angle(robot.orientation + PI);
    }
    robot
}

/// The robot whose dribbler is closest to the ball detection.
fn nearest_robot_info(robots: &[RobotInfo], ball_pos: Vector2) -> Option<RobotInfo> {
    robots
        .iter()
        .min_by(|a, b| {
            let da = (ball_pos - a.dribbler_pos).length();
            let db = (ball_pos - b.dribbler_pos).length();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .copied()
}
