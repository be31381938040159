//! Per-robot tracking filter.
//!
//! A constant-velocity Kalman filter over position plus a wrap-aware
//! orientation estimate. One filter exists per (team, id, spatial
//! hypothesis); the tracker associates detections to the nearest predicted
//! filter and lets the rest decay.

use crate::kalman::KalmanFilter;
use crate::types::{
    DRIBBLER_OFFSET, KickStyle, RadioCommand, RobotIdentifier, RobotInfo, TrackedRobot,
};
use maidan_core::{Vector2, math::angle_diff, math::normalize_angle, types::duration_secs};
use nalgebra::{Matrix2, Matrix4, Vector4};
use serde::Deserialize;

/// Radio feedback older than this no longer drives the kick flags, ns.
const RADIO_COMMAND_TIMEOUT_NS: i64 = 100_000_000;

/// Smoothing factor for the orientation estimate.
const ORIENTATION_GAIN: f32 = 0.5;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RobotFilterConfig {
    /// Process noise as acceleration standard deviation (m/s²).
    pub process_noise_std: f32,
    /// Vision measurement noise standard deviation (m).
    pub measurement_noise_std: f32,
    /// Initial velocity standard deviation (m/s).
    pub initial_speed_std: f32,
    /// Physically plausible speed limit; estimates above it are flagged.
    pub v_max: f32,
}

impl Default for RobotFilterConfig {
    fn default() -> Self {
        Self {
            process_noise_std: 3.0,
            measurement_noise_std: 0.004,
            initial_speed_std: 2.0,
            v_max: 5.0,
        }
    }
}

/// Kalman-style filter for one robot hypothesis.
#[derive(Debug, Clone)]
pub struct RobotFilter {
    config: RobotFilterConfig,
    kalman: KalmanFilter<4, 2>,
    orientation: f32,

    identifier: RobotIdentifier,
    primary_camera: u32,
    last_update: i64,
    init_time: i64,
    frame_counter: u32,
    last_radio_command: Option<(RadioCommand, i64)>,
}

impl RobotFilter {
    /// Seed a filter from a first detection (field coordinates).
    pub fn new(
        identifier: RobotIdentifier,
        pos: Vector2,
        orientation: f32,
        time: i64,
        camera_id: u32,
        config: RobotFilterConfig,
    ) -> Self {
        let r = (config.measurement_noise_std as f64).powi(2);
        let sv = (config.initial_speed_std as f64).powi(2);
        let mut p0 = Matrix4::zeros();
        p0[(0, 0)] = r;
        p0[(1, 1)] = r;
        p0[(2, 2)] = sv;
        p0[(3, 3)] = sv;
        let mut kalman = KalmanFilter::new(
            Vector4::new(pos.x as f64, pos.y as f64, 0.0, 0.0),
            p0,
        );
        kalman.h[(0, 0)] = 1.0;
        kalman.h[(1, 1)] = 1.0;
        kalman.r = Matrix2::identity() * r;

        Self {
            config,
            kalman,
            orientation,
            identifier,
            primary_camera: camera_id,
            last_update: time,
            init_time: time,
            frame_counter: 0,
            last_radio_command: None,
        }
    }

    #[inline]
    pub fn identifier(&self) -> RobotIdentifier {
        self.identifier
    }

    #[inline]
    pub fn primary_camera(&self) -> u32 {
        self.primary_camera
    }

    #[inline]
    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    #[inline]
    pub fn init_time(&self) -> i64 {
        self.init_time
    }

    #[inline]
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Distance of a detection to the predicted position at its time.
    pub fn distance_to(&self, pos: Vector2, time: i64) -> f32 {
        self.state_at(time).0.distance(pos)
    }

    /// Extrapolated (position, speed) at the given time.
    pub fn state_at(&self, time: i64) -> (Vector2, Vector2) {
        let dt = duration_secs(self.last_update, time) as f64;
        let state = self.kalman.state();
        (
            Vector2::new(
                (state[0] + state[2] * dt) as f32,
                (state[1] + state[3] * dt) as f32,
            ),
            Vector2::new(state[2] as f32, state[3] as f32),
        )
    }

    /// Fold one detection into the filter. Stale frames are ignored.
    pub fn process_frame(&mut self, pos: Vector2, orientation: f32, time: i64, camera_id: u32) {
        let dt = duration_secs(self.last_update, time) as f64;
        if dt < 0.0 {
            return;
        }
        if dt > 0.0 {
            self.apply_timestep(dt);
            self.kalman.predict();
        }
        self.kalman.z = nalgebra::Vector2::new(pos.x as f64, pos.y as f64);
        self.kalman.update();

        self.orientation = normalize_angle(
            self.orientation + angle_diff(orientation, self.orientation) * ORIENTATION_GAIN,
        );
        self.last_update = time;
        self.primary_camera = camera_id;
        self.frame_counter += 1;
    }

    fn apply_timestep(&mut self, dt: f64) {
        self.kalman.f = Matrix4::identity();
        self.kalman.f[(0, 2)] = dt;
        self.kalman.f[(1, 3)] = dt;

        let q = (self.config.process_noise_std as f64).powi(2);
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let mut qm = Matrix4::zeros();
        for i in 0..2 {
            qm[(i, i)] = q * dt4 / 4.0;
            qm[(i + 2, i + 2)] = q * dt2;
            qm[(i, i + 2)] = q * dt3 / 2.0;
            qm[(i + 2, i)] = q * dt3 / 2.0;
        }
        self.kalman.q = qm;
    }

    pub fn add_radio_command(&mut self, command: RadioCommand, time: i64) {
        self.last_radio_command = Some((command, time));
    }

    fn active_kick_style(&self, time: i64) -> Option<KickStyle> {
        let (command, command_time) = self.last_radio_command?;
        if time - command_time > RADIO_COMMAND_TIMEOUT_NS {
            return None;
        }
        command.kick_style
    }

    /// Snapshot for ball interaction reasoning.
    pub fn robot_info(&self, time: i64) -> RobotInfo {
        let (pos, speed) = self.state_at(time);
        let facing = Vector2::new(self.orientation.cos(), self.orientation.sin());
        let kick_style = self.active_kick_style(time);
        RobotInfo {
            identifier: self.identifier,
            robot_pos: pos,
            dribbler_pos: pos + facing * DRIBBLER_OFFSET,
            speed,
            kick_chip: kick_style == Some(KickStyle::Chip),
            kick_linear: kick_style == Some(KickStyle::Linear),
        }
    }

    /// Snapshot for the world state. A speed beyond the configured limit
    /// marks the state estimate-only.
    pub fn write_state(&self, time: i64) -> TrackedRobot {
        let (pos, speed) = self.state_at(time);
        TrackedRobot {
            id: self.identifier.id,
            pos,
            speed,
            orientation: self.orientation,
            estimate_only: speed.length() > self.config.v_max,
        }
    }
}
