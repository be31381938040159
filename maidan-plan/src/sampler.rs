//! Per-request trajectory planning: direct attempt, two-segment mid-point
//! sampling, end-in-obstacle endpoint search and the escape fallback.
//!
//! The planner keeps summary statistics between requests (last best mid
//! point, end point and escape parameters) to seed the next search, and
//! owns a deterministically seeded RNG for reproducible replay.

use crate::alpha_time;
use crate::obstacle::{MovingObstacle, Obstacle};
use crate::precompute::SamplerPrecomputation;
use crate::trajectory::{SLOW_DOWN_TIME, Trajectory};
use crate::world::{PlanningWorld, WorldConfig};
use maidan_core::{TrajectoryPoint, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::f32::consts::TAU;
use std::path::Path;

/// Trajectories closer to an obstacle than this get a time penalty.
const OBSTACLE_AVOIDANCE_RADIUS: f32 = 0.1;
const OBSTACLE_AVOIDANCE_BONUS: f32 = 1.2;

/// Result paths are sampled equally spaced in time, per segment.
const SAMPLES_PER_SEGMENT: usize = 40;

const MID_POINT_SAMPLES: usize = 100;
const END_POINT_ITERATIONS: usize = 200;
const ESCAPE_SAMPLES: usize = 100;

/// A single planning request. Obstacles are in field coordinates; moving
/// obstacles live in the request's time frame (t = 0 at the start point).
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub s0: Vector2,
    pub v0: Vector2,
    pub s1: Vector2,
    pub v1: Vector2,
    pub max_speed: f32,
    pub acceleration: f32,
    /// Allow the exponential slow-down tail (applied when v1 is zero).
    pub allow_slow_down: bool,
    pub obstacles: Vec<Obstacle>,
    pub moving_obstacles: Vec<MovingObstacle>,
}

#[derive(Debug, Clone, Copy)]
struct TrajectoryInput {
    s0: Vector2,
    v0: Vector2,
    s1: Vector2,
    v1: Vector2,
    distance: Vector2,
    max_speed: f32,
    max_speed_squared: f32,
    acceleration: f32,
    exponential_slow_down: bool,
}

/// Best two-segment sample of the current or previous request.
#[derive(Debug, Clone, Copy, Default)]
struct BestTrajectoryInfo {
    time: f32,
    center_time: f32,
    angle: f32,
    mid_speed: Vector2,
    valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SamplingMode {
    TotalRandom,
    CurrentBest,
    LastBest,
}

/// The trajectory planner.
pub struct TrajectoryPlanner {
    world: PlanningWorld,
    rng: StdRng,

    best_result: BestTrajectoryInfo,
    // end-point-in-obstacle search state
    best_end_point: Vector2,
    best_end_point_distance: f32,
    // escape search state
    best_escape_time: f32,
    best_escape_angle: f32,

    /// Segments of the current result, in execution order.
    generation: Vec<Trajectory>,
    precomputation: Option<SamplerPrecomputation>,
}

impl TrajectoryPlanner {
    pub fn new(seed: u64, config: &WorldConfig) -> Self {
        Self {
            world: PlanningWorld::new(config),
            rng: StdRng::seed_from_u64(seed),
            best_result: BestTrajectoryInfo::default(),
            best_end_point: Vector2::zero(),
            best_end_point_distance: f32::INFINITY,
            best_escape_time: 2.0,
            best_escape_angle: 0.0,
            generation: Vec::new(),
            precomputation: None,
        }
    }

    /// Load the optional precomputed sample table. A missing or unreadable
    /// file falls back to online sampling.
    pub fn load_precomputation(&mut self, path: &Path) {
        match SamplerPrecomputation::load(path) {
            Ok(table) => {
                log::info!(
                    "loaded trajectory precomputation with {} segments",
                    table.segments.len()
                );
                self.precomputation = Some(table);
            }
            Err(e) => {
                log::warn!("no trajectory precomputation: {}", e);
                self.precomputation = None;
            }
        }
    }

    pub fn world(&self) -> &PlanningWorld {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut PlanningWorld {
        &mut self.world
    }

    /// Forget all cross-frame seeding state.
    pub fn reset(&mut self) {
        self.best_result = BestTrajectoryInfo::default();
        self.best_end_point = Vector2::zero();
        self.best_end_point_distance = f32::INFINITY;
        self.best_escape_time = 2.0;
        self.best_escape_angle = 0.0;
        self.generation.clear();
    }

    /// Plan a trajectory for one request. The returned points are equally
    /// spaced in time within each segment. Never empty: if everything else
    /// fails the best escape trajectory found is returned.
    pub fn plan(&mut self, request: &PlanRequest) -> Vec<TrajectoryPoint> {
        self.world.clear_obstacles();
        for obstacle in &request.obstacles {
            self.world.add_obstacle(obstacle.clone());
        }
        for moving in &request.moving_obstacles {
            match moving {
                MovingObstacle::Circle(c) => self.world.add_moving_circle(*c),
                MovingObstacle::Line(l) => self.world.add_moving_line(*l),
            }
        }

        let input = TrajectoryInput {
            s0: request.s0,
            v0: request.v0,
            s1: request.s1,
            v1: request.v1,
            distance: request.s1 - request.s0,
            max_speed: request.max_speed,
            max_speed_squared: request.max_speed * request.max_speed,
            acceleration: request.acceleration,
            exponential_slow_down: request.allow_slow_down && request.v1 == Vector2::zero(),
        };

        self.generation.clear();
        self.find_path_alpha_t(&input);
        self.result_path()
    }

    fn find_path_alpha_t(&mut self, input: &TrajectoryInput) {
        let direct_slow_down = if input.exponential_slow_down {
            SLOW_DOWN_TIME
        } else {
            0.0
        };
        // precise positioning matters most when almost standing on the target
        let use_high_precision = input.distance.length() < 0.1
            && input.v1 == Vector2::zero()
            && input.v0.length() < 0.2;

        if let Some(direct) = alpha_time::find_trajectory(
            input.s0,
            input.v0,
            input.s1,
            input.v1,
            input.acceleration,
            input.max_speed,
            direct_slow_down,
            use_high_precision,
            true,
        ) {
            let (distance, _) = self.world.min_obstacle_distance(&direct.trajectory, 0.0);
            if distance > OBSTACLE_AVOIDANCE_RADIUS {
                self.generation.push(direct.trajectory);
                return;
            }
        }

        let mut last_info = self.best_result;
        if last_info.mid_speed.length_squared() > input.max_speed_squared {
            last_info.valid = false;
        }
        self.best_result.time = f32::INFINITY;
        self.best_result.valid = false;

        // re-validate the previous frame's best sample first
        if last_info.valid {
            self.check_mid_point(input, last_info.mid_speed, last_info.center_time, last_info.angle);
        }

        if self.world.is_in_static_obstacle(input.s0)
            || self.world.is_in_moving_obstacle(input.s0, 0.0)
        {
            log::debug!("start point inside obstacle, escaping");
            self.escape_obstacles(input);
            return;
        }

        if self.world.is_in_static_obstacle(input.s1) {
            log::debug!("target inside obstacle, searching closest reachable point");
            self.find_path_end_in_obstacle(input);
            return;
        }

        if let Some(samples) = self
            .precomputation
            .as_ref()
            .and_then(|p| p.segment_for(input.distance.length()))
            .map(|segment| segment.samples.clone())
        {
            for sample in samples {
                let (time, angle, mut mid_speed) = sample.denormalize(input.s0, input.s1);
                if mid_speed.length_squared() >= input.max_speed_squared {
                    mid_speed = mid_speed.normalized() * input.max_speed;
                }
                self.check_mid_point(input, mid_speed, time, angle);
            }
        } else {
            self.sample_mid_points(input, &last_info);
        }

        if !self.best_result.valid {
            self.escape_obstacles(input);
        }
    }

    fn sample_mid_points(&mut self, input: &TrajectoryInput, last_info: &BestTrajectoryInfo) {
        for i in 0..MID_POINT_SAMPLES {
            let mode = if !self.best_result.valid {
                if i < 20 {
                    if self.rng.random_range(0.0..1.0f32) < 0.8 {
                        SamplingMode::LastBest
                    } else {
                        SamplingMode::TotalRandom
                    }
                } else if self.rng.random_bool(0.5) {
                    SamplingMode::LastBest
                } else {
                    SamplingMode::TotalRandom
                }
            } else if self.rng.random_range(0..1024) < 150 {
                SamplingMode::TotalRandom
            } else if self.best_result.time < last_info.time + 0.05 {
                SamplingMode::CurrentBest
            } else if self.rng.random_bool(0.5) {
                SamplingMode::CurrentBest
            } else {
                SamplingMode::LastBest
            };

            let (mid_speed, angle, time) = if mode == SamplingMode::TotalRandom {
                let speed = self.random_speed(input.max_speed);
                let angle = self.rng.random_range(0.0..TAU);
                let max_time = if self.best_result.valid {
                    (self.best_result.time - 0.1).max(0.01)
                } else {
                    5.0
                };
                (speed, angle, self.rng.random_range(0.0..max_time))
            } else {
                let info = if mode == SamplingMode::CurrentBest {
                    self.best_result
                } else {
                    *last_info
                };
                let mut chosen_mid_speed = info.mid_speed;
                while chosen_mid_speed.length_squared() > input.max_speed_squared {
                    chosen_mid_speed *= 0.9;
                }
                let speed = loop {
                    let candidate = chosen_mid_speed
                        + Vector2::new(self.gaussian(0.2), self.gaussian(0.2));
                    if candidate.length_squared() < input.max_speed_squared {
                        break candidate;
                    }
                };
                let angle = info.angle + self.gaussian(0.1);
                let time = (info.center_time + self.gaussian(0.1)).max(0.0001);
                (speed, angle, time)
            };
            self.check_mid_point(input, mid_speed, time, angle);
        }
    }

    /// Try one (mid speed, center time, angle) sample: construct the second
    /// segment with the fast-end-speed law, search the first segment to its
    /// start and score the composition. Returns whether it became the new
    /// best.
    fn check_mid_point(
        &mut self,
        input: &TrajectoryInput,
        mid_speed: Vector2,
        time: f32,
        angle: f32,
    ) -> bool {
        // do not require a real improvement for very short moves
        let minimum_time_improvement = if input.distance.length_squared() > 1.0 {
            0.05
        } else {
            0.0
        };
        if time < 0.0 {
            return false;
        }

        let slow_down_time = if input.exponential_slow_down {
            SLOW_DOWN_TIME
        } else {
            0.0
        };
        let second_part = alpha_time::calculate_trajectory_fast_end_speed(
            mid_speed,
            input.v1,
            time,
            angle,
            input.acceleration,
            input.max_speed,
            slow_down_time,
        );
        let second_part_time = second_part.time();
        let second_part_offset = second_part.end_position();
        if second_part_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        let first_part_position = input.distance - second_part_offset;
        let first_part_slow_down = if input.exponential_slow_down {
            (SLOW_DOWN_TIME - second_part_time).max(0.0)
        } else {
            0.0
        };
        let Some(first_part) = alpha_time::find_trajectory(
            input.s0,
            input.v0,
            input.s0 + first_part_position,
            mid_speed,
            input.acceleration,
            input.max_speed,
            first_part_slow_down,
            false,
            false,
        ) else {
            return false;
        };
        let first_part_time = first_part.trajectory.time();
        if first_part_time + second_part_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        let (first_obstacle_distance, _) =
            self.world.min_obstacle_distance(&first_part.trajectory, 0.0);
        if first_obstacle_distance <= 0.0 {
            return false;
        }
        let mut second_part = second_part;
        second_part.set_start_pos(input.s1 - second_part_offset);
        let (second_obstacle_distance, _) =
            self.world.min_obstacle_distance(&second_part, first_part_time);
        if second_obstacle_distance <= 0.0 {
            return false;
        }

        let min_obstacle_distance = first_obstacle_distance.min(second_obstacle_distance);
        let obstacle_dist_extra_time = if min_obstacle_distance < OBSTACLE_AVOIDANCE_RADIUS {
            OBSTACLE_AVOIDANCE_BONUS
        } else {
            1.0
        };
        let biased_trajectory_time = (first_part_time + second_part_time) * obstacle_dist_extra_time;
        if biased_trajectory_time > self.best_result.time - minimum_time_improvement {
            return false;
        }

        self.best_result = BestTrajectoryInfo {
            time: biased_trajectory_time,
            center_time: time,
            angle,
            mid_speed,
            valid: true,
        };
        self.generation.clear();
        self.generation.push(first_part.trajectory);
        self.generation.push(second_part);
        true
    }

    /// Search for the closest reachable end point when the target itself
    /// sits inside a static obstacle.
    fn find_path_end_in_obstacle(&mut self, input: &TrajectoryInput) {
        let prev_best_distance = self.best_end_point_distance;
        self.best_end_point_distance = f32::INFINITY;
        self.best_result.valid = false;
        if !self.test_end_point(input, self.best_end_point) {
            self.best_end_point_distance = prev_best_distance * 1.3;
        }

        for i in 0..END_POINT_ITERATIONS {
            if i == END_POINT_ITERATIONS / 3 && !self.best_result.valid {
                self.best_end_point_distance = f32::INFINITY;
            }
            let rand_val = self.rng.random_range(0..1024);
            let test_point = if rand_val < 300 {
                // near the actual target
                let radius = self.best_end_point_distance.min(0.3).max(1e-4);
                input.s1 + self.random_offset(radius)
            } else if rand_val < 800 || self.best_end_point_distance < 0.3 {
                // near the last best end point
                let radius = self.best_end_point_distance.min(0.3).max(1e-4);
                self.best_end_point + self.random_offset(radius)
            } else {
                self.random_point_in_field()
            };
            self.test_end_point(input, test_point);
        }

        if !self.best_result.valid {
            self.escape_obstacles(input);
        }
    }

    fn test_end_point(&mut self, input: &TrajectoryInput, end_point: Vector2) -> bool {
        if end_point.distance(input.s1) > self.best_end_point_distance - 0.05 {
            return false;
        }

        // no slow-down here, we are not even where we want to be
        let Some(direct) = alpha_time::find_trajectory(
            input.s0,
            input.v0,
            end_point,
            Vector2::zero(),
            input.acceleration,
            input.max_speed,
            0.0,
            false,
            false,
        ) else {
            return false;
        };
        if self.world.is_trajectory_in_obstacle(&direct.trajectory, 0.0) {
            return false;
        }

        self.best_end_point_distance = end_point.distance(input.s1);
        self.best_result.valid = true;
        self.best_end_point = end_point;

        self.generation.clear();
        self.generation.push(direct.trajectory);
        true
    }

    /// Sample (time, angle) stop trajectories and keep the one leaving the
    /// obstacle region best: lexicographically by (highest priority
    /// touched, time inside that priority, total time).
    fn escape_obstacles(&mut self, input: &TrajectoryInput) {
        let mut best = self.build_escape(input, self.best_escape_time, self.best_escape_angle);
        let (mut best_prio, mut best_obstacle_time) = self.world.trajectory_obstacle_score(&best);
        let mut best_total_time = best.time();

        for _ in 0..ESCAPE_SAMPLES {
            if best_prio == 0 {
                break;
            }
            let (time, angle) = if self.rng.random_bool(0.5) {
                (
                    self.rng.random_range(0.4..5.0f32),
                    self.rng.random_range(0.0..TAU),
                )
            } else {
                (
                    (self.best_escape_time + self.rng.random_range(-0.1..0.1f32)).max(0.05),
                    self.best_escape_angle + self.rng.random_range(-0.1..0.1f32),
                )
            };
            let candidate = self.build_escape(input, time, angle);
            let (prio, obstacle_time) = self.world.trajectory_obstacle_score(&candidate);
            let total_time = candidate.time();
            if prio < best_prio
                || (prio == best_prio && obstacle_time < best_obstacle_time)
                || (prio == best_prio
                    && obstacle_time == best_obstacle_time
                    && total_time < best_total_time)
            {
                best_prio = prio;
                best_obstacle_time = obstacle_time;
                best_total_time = total_time;
                self.best_escape_time = time;
                self.best_escape_angle = angle;
                best = candidate;
            }
        }

        self.generation.clear();
        self.generation.push(best);
    }

    fn build_escape(&self, input: &TrajectoryInput, time: f32, angle: f32) -> Trajectory {
        let mut trajectory = alpha_time::calculate_trajectory_exact_end_speed(
            input.v0,
            Vector2::zero(),
            time,
            angle,
            input.acceleration,
            input.max_speed,
            0.0,
        );
        trajectory.set_start_pos(input.s0);
        trajectory
    }

    fn result_path(&self) -> Vec<TrajectoryPoint> {
        let mut result = Vec::with_capacity(self.generation.len() * SAMPLES_PER_SEGMENT);
        let mut time_sum = 0.0;
        for trajectory in &self.generation {
            let total_time = trajectory.time();
            let interval = total_time / (SAMPLES_PER_SEGMENT - 1) as f32;
            let points = trajectory.positions(SAMPLES_PER_SEGMENT, interval, time_sum);
            time_sum = points.last().map(|p| p.time).unwrap_or(time_sum);
            result.extend(points);
        }
        result
    }

    fn random_speed(&mut self, max_speed: f32) -> Vector2 {
        loop {
            let speed = Vector2::new(
                self.rng.random_range(-max_speed..max_speed),
                self.rng.random_range(-max_speed..max_speed),
            );
            if speed.length_squared() <= max_speed * max_speed {
                return speed;
            }
        }
    }

    fn random_offset(&mut self, radius: f32) -> Vector2 {
        Vector2::new(
            self.rng.random_range(-radius..radius),
            self.rng.random_range(-radius..radius),
        )
    }

    fn random_point_in_field(&mut self) -> Vector2 {
        let boundary = self.world.boundary();
        Vector2::new(
            self.rng.random_range(boundary.min.x..boundary.max.x),
            self.rng.random_range(boundary.min.y..boundary.max.y),
        )
    }

    fn gaussian(&mut self, std_dev: f32) -> f32 {
        let n: f32 = self.rng.sample(StandardNormal);
        n * std_dev
    }
}
