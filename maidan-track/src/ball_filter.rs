//! Ground-motion ball filter.
//!
//! A constant-velocity Kalman filter over (position, velocity) in field
//! coordinates. Each filter is driven by the detections of one primary
//! camera; detections from other cameras only probe [`accept_detection`]
//! to support camera hand-off.
//!
//! [`accept_detection`]: BallGroundFilter::accept_detection

use crate::kalman::KalmanFilter;
use crate::types::VisionFrame;
use maidan_core::{Vector2, types::duration_secs};
use nalgebra::{Matrix2, Matrix4, Vector4};
use serde::Deserialize;

use crate::types::BallState;

/// Tuning of the ground filter.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GroundFilterConfig {
    /// Process noise as acceleration standard deviation (m/s²).
    pub process_noise_std: f32,
    /// Vision measurement noise standard deviation (m).
    pub measurement_noise_std: f32,
    /// Innovation gate: detections farther from the prediction are
    /// rejected.
    pub accept_distance: f32,
    /// Initial velocity standard deviation for fresh filters (m/s).
    pub initial_speed_std: f32,
}

impl Default for GroundFilterConfig {
    fn default() -> Self {
        Self {
            process_noise_std: 1.0,
            measurement_noise_std: 0.006,
            accept_distance: 0.35,
            initial_speed_std: 2.0,
        }
    }
}

/// Kalman filter for a ball rolling on the ground.
#[derive(Debug, Clone)]
pub struct BallGroundFilter {
    config: GroundFilterConfig,
    kalman: KalmanFilter<4, 2>,
    last_update: i64,
    primary_camera: u32,
}

impl BallGroundFilter {
    /// Seed a filter from a first detection; the ball starts at rest.
    pub fn new(frame: &VisionFrame, config: GroundFilterConfig) -> Self {
        let x0 = Vector4::new(frame.pos.x as f64, frame.pos.y as f64, 0.0, 0.0);
        let r = (config.measurement_noise_std as f64).powi(2);
        let sv = (config.initial_speed_std as f64).powi(2);
        let mut p0 = Matrix4::zeros();
        p0[(0, 0)] = r;
        p0[(1, 1)] = r;
        p0[(2, 2)] = sv;
        p0[(3, 3)] = sv;

        let mut kalman = KalmanFilter::new(x0, p0);
        kalman.h[(0, 0)] = 1.0;
        kalman.h[(1, 1)] = 1.0;
        kalman.r = Matrix2::identity() * r;

        Self {
            config,
            kalman,
            last_update: frame.time,
            primary_camera: frame.camera_id,
        }
    }

    #[inline]
    pub fn primary_camera(&self) -> u32 {
        self.primary_camera
    }

    pub fn set_primary_camera(&mut self, camera_id: u32) {
        self.primary_camera = camera_id;
    }

    #[inline]
    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    fn apply_timestep(&mut self, dt: f64) {
        self.kalman.f = Matrix4::identity();
        self.kalman.f[(0, 2)] = dt;
        self.kalman.f[(1, 3)] = dt;

        // discrete white noise acceleration model
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

    /// Fold a detection of the primary camera into the state. Frames older
    /// than the filter state are ignored.
    pub fn process_frame(&mut self, frame: &VisionFrame) {
        let dt = duration_secs(self.last_update, frame.time) as f64;
        if dt < 0.0 {
            return;
        }
        if dt > 0.0 {
            self.apply_timestep(dt);
            self.kalman.predict();
        }
        self.kalman.z = nalgebra::Vector2::new(frame.pos.x as f64, frame.pos.y as f64);
        self.kalman.update();
        self.last_update = frame.time;
    }

    /// Re-seed the position from a detection while keeping the velocity
    /// estimate. Used after discontinuities like the ball being grabbed.
    pub fn reset(&mut self, frame: &VisionFrame) {
        let state = self.kalman.state_mut();
        state[0] = frame.pos.x as f64;
        state[1] = frame.pos.y as f64;
        self.last_update = frame.time;
    }

    /// Whether a detection plausibly belongs to this ball.
    pub fn accept_detection(&self, frame: &VisionFrame) -> bool {
        let predicted = self.state_at(frame.time).pos;
        predicted.distance(frame.pos) < self.config.accept_distance
    }

    /// Extrapolated state at the given time; does not mutate the filter.
    pub fn state_at(&self, time: i64) -> BallState {
        let dt = duration_secs(self.last_update, time) as f64;
        let state = self.kalman.state();
        BallState {
            pos: Vector2::new(
                (state[0] + state[2] * dt) as f32,
                (state[1] + state[3] * dt) as f32,
            ),
            speed: Vector2::new(state[2] as f32, state[3] as f32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pos: Vector2, time_ms: i64) -> VisionFrame {
        VisionFrame {
            pos,
            time: time_ms * 1_000_000,
            camera_id: 0,
            robot_info: None,
        }
    }

    #[test]
    fn test_tracks_constant_velocity_ball() {
        // ball moving at 0.625 m/s along x, one frame every 16 ms
        let first = frame(Vector2::zero(), 0);
        let mut filter = BallGroundFilter::new(&first, GroundFilterConfig::default());
        for i in 1..=10 {
            let pos = Vector2::new(0.01 * i as f32, 0.0);
            filter.process_frame(&frame(pos, 16 * i));
        }
        let state = filter.state_at(160_000_000);
        assert!(state.pos.distance(Vector2::new(0.10, 0.0)) < 0.01);
        assert!((state.speed.x - 0.625).abs() < 0.1, "vx {}", state.speed.x);
        assert!(state.speed.y.abs() < 0.05);
    }

    #[test]
    fn test_rejects_stale_frame() {
        let mut filter = BallGroundFilter::new(
            &frame(Vector2::zero(), 100),
            GroundFilterConfig::default(),
        );
        filter.process_frame(&frame(Vector2::new(0.01, 0.0), 116));
        let before = filter.state_at(116_000_000);
        // an older frame must not mutate the state
        filter.process_frame(&frame(Vector2::new(5.0, 5.0), 50));
        let after = filter.state_at(116_000_000);
        assert_eq!(before.pos, after.pos);
        assert_eq!(before.speed, after.speed);
    }

    #[test]
    fn test_accept_gate() {
        let filter = BallGroundFilter::new(
            &frame(Vector2::zero(), 0),
            GroundFilterConfig::default(),
        );
        assert!(filter.accept_detection(&frame(Vector2::new(0.1, 0.0), 16)));
        assert!(!filter.accept_detection(&frame(Vector2::new(1.0, 0.0), 16)));
    }

    #[test]
    fn test_reset_keeps_speed() {
        let mut filter = BallGroundFilter::new(
            &frame(Vector2::zero(), 0),
            GroundFilterConfig::default(),
        );
        for i in 1..=10 {
            filter.process_frame(&frame(Vector2::new(0.02 * i as f32, 0.0), 16 * i));
        }
        let speed_before = filter.state_at(160_000_000).speed;
        filter.reset(&frame(Vector2::new(3.0, 3.0), 176));
        let state = filter.state_at(176_000_000);
        assert!(state.pos.distance(Vector2::new(3.0, 3.0)) < 1e-6);
        assert!(state.speed.distance(speed_before) < 1e-6);
    }
}
