//! Planning world: field boundary, robot radius and obstacle collections,
//! with the trajectory-vs-obstacle queries the samplers are built on.

use crate::obstacle::{MovingCircle, MovingLine, Obstacle};
use crate::trajectory::Trajectory;
use maidan_core::{BoundingBox, LineSegment, Vector2};
use serde::Deserialize;

/// Number of points a trajectory is sampled at for collision checks.
const TRAJECTORY_CHECK_SAMPLES: usize = 40;

/// Sampling interval of the obstacle score sweep in seconds.
const SCORE_SAMPLING_INTERVAL: f32 = 0.005;

/// Static world parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    /// Robot radius in meters.
    pub radius: f32,
    /// Field boundary, including any allowed margin.
    pub boundary_min: Vector2,
    pub boundary_max: Vector2,
    /// Priority of the out-of-field pseudo obstacle.
    pub out_of_field_priority: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            radius: 0.09,
            boundary_min: Vector2::new(-5.0, -7.0),
            boundary_max: Vector2::new(5.0, 7.0),
            out_of_field_priority: 1,
        }
    }
}

/// Obstacle context for one planning frame.
#[derive(Debug, Clone)]
pub struct PlanningWorld {
    radius: f32,
    boundary: BoundingBox,
    out_of_field_priority: i32,
    obstacles: Vec<Obstacle>,
    moving_circles: Vec<MovingCircle>,
    moving_lines: Vec<MovingLine>,
}

impl PlanningWorld {
    pub fn new(config: &WorldConfig) -> Self {
        Self {
            radius: config.radius,
            boundary: BoundingBox::new(config.boundary_min, config.boundary_max),
            out_of_field_priority: config.out_of_field_priority,
            obstacles: Vec::new(),
            moving_circles: Vec::new(),
            moving_lines: Vec::new(),
        }
    }

    #[inline]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
    }

    #[inline]
    pub fn boundary(&self) -> BoundingBox {
        self.boundary
    }

    pub fn set_boundary(&mut self, a: Vector2, b: Vector2) {
        self.boundary = BoundingBox::new(a, b);
    }

    pub fn set_out_of_field_priority(&mut self, prio: i32) {
        self.out_of_field_priority = prio;
    }

    #[inline]
    pub fn obstacles(&self) -> &[Obstacle] {
        &self.obstacles
    }

    /// Drop all obstacles of the previous frame.
    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
        self.moving_circles.clear();
        self.moving_lines.clear();
    }

    pub fn add_obstacle(&mut self, obstacle: Obstacle) {
        self.obstacles.push(obstacle);
    }

    /// Moving obstacles are inflated by the robot radius on insertion.
    pub fn add_moving_circle(&mut self, mut circle: MovingCircle) {
        circle.radius += self.radius;
        self.moving_circles.push(circle);
    }

    pub fn add_moving_line(&mut self, mut line: MovingLine) {
        line.width += self.radius;
        self.moving_lines.push(line);
    }

    pub fn point_in_playfield(&self, point: Vector2, radius: f32) -> bool {
        !(point.x - radius < self.boundary.min.x
            || point.x + radius > self.boundary.max.x
            || point.y - radius < self.boundary.min.y
            || point.y + radius > self.boundary.max.y)
    }

    /// How far the robot sticks out of the playfield, zero when inside.
    pub fn outside_playfield_coverage(&self, point: Vector2, radius: f32) -> f32 {
        0.0f32.max(
            (self.boundary.min.x - point.x + radius)
                .max(point.x + radius - self.boundary.max.x)
                .max(
                    (self.boundary.min.y - point.y + radius)
                        .max(point.y + radius - self.boundary.max.y),
                ),
        )
    }

    /// Whether the robot center may stand at `v` given all obstacles in
    /// `obstacles` and the playfield boundary.
    pub fn test_point(&self, v: Vector2, radius: f32, obstacles: &[&Obstacle]) -> bool {
        if !self.point_in_playfield(v, radius) {
            return false;
        }
        obstacles.iter().all(|o| o.distance(v) >= radius)
    }

    pub fn test_segment(&self, segment: &LineSegment, radius: f32, obstacles: &[&Obstacle]) -> bool {
        obstacles.iter().all(|o| o.distance_to_segment(segment) >= radius)
    }

    pub fn is_in_static_obstacle(&self, point: Vector2) -> bool {
        if !self.point_in_playfield(point, self.radius) {
            return true;
        }
        self.obstacles.iter().any(|o| o.distance(point) < self.radius)
    }

    pub fn is_in_moving_obstacle(&self, point: Vector2, time: f32) -> bool {
        self.moving_circles.iter().any(|o| o.intersects(point, time))
            || self.moving_lines.iter().any(|o| o.intersects(point, time))
    }

    /// Sample the trajectory and test every point against static and moving
    /// obstacles. `time_offset` shifts the trajectory into the moving
    /// obstacles' time frame.
    pub fn is_trajectory_in_obstacle(&self, trajectory: &Trajectory, time_offset: f32) -> bool {
        let total_time = trajectory.time();
        for i in 0..TRAJECTORY_CHECK_SAMPLES {
            let time = total_time * i as f32 / (TRAJECTORY_CHECK_SAMPLES - 1) as f32;
            let pos = trajectory.state_at(time).pos;
            if self.is_in_static_obstacle(pos) {
                return true;
            }
            if self.is_in_moving_obstacle(pos, time + time_offset) {
                return true;
            }
        }
        false
    }

    /// Minimum obstacle distance along the trajectory and at its last
    /// point. Negative (or -1 outside the field) means collision; the scan
    /// aborts on the first such sample.
    pub fn min_obstacle_distance(&self, trajectory: &Trajectory, time_offset: f32) -> (f32, f32) {
        let total_time = trajectory.time();
        let mut min_distance = f32::MAX;
        let mut last_point_distance = f32::MAX;
        for i in 0..TRAJECTORY_CHECK_SAMPLES {
            let time = total_time * i as f32 / (TRAJECTORY_CHECK_SAMPLES - 1) as f32;
            let pos = trajectory.state_at(time).pos;
            let mut sample_min = f32::MAX;
            if !self.point_in_playfield(pos, self.radius) {
                return (-1.0, -1.0);
            }
            for obstacle in &self.obstacles {
                let d = obstacle.distance(pos) - self.radius;
                if d <= 0.0 {
                    return (d, d);
                }
                sample_min = sample_min.min(d);
            }
            for o in &self.moving_circles {
                let d = o.distance(pos, time + time_offset);
                if d <= 0.0 {
                    return (d, d);
                }
                sample_min = sample_min.min(d);
            }
            for o in &self.moving_lines {
                let d = o.distance(pos, time + time_offset);
                if d <= 0.0 {
                    return (d, d);
                }
                sample_min = sample_min.min(d);
            }
            min_distance = min_distance.min(sample_min);
            last_point_distance = sample_min;
        }
        (min_distance, last_point_distance)
    }

    /// Escape score of a trajectory: the highest obstacle priority it
    /// touches and the time spent inside obstacles of that priority.
    /// Stopping inside an obstacle is penalized heavily.
    pub fn trajectory_obstacle_score(&self, trajectory: &Trajectory) -> (i32, f32) {
        let total_time = trajectory.time();
        let samples = (total_time / SCORE_SAMPLING_INTERVAL) as usize + 1;

        let mut best_prio = 0;
        let mut best_prio_time = 0.0;
        for i in 0..samples {
            let time = if i < samples - 1 {
                i as f32 * SCORE_SAMPLING_INTERVAL
            } else {
                total_time
            };

            let pos = trajectory.state_at(time).pos;
            let mut priority = 0;
            if !self.point_in_playfield(pos, self.radius) {
                priority = self.out_of_field_priority;
            }
            for obstacle in &self.obstacles {
                if obstacle.priority() > priority && obstacle.distance(pos) < self.radius {
                    priority = obstacle.priority();
                }
            }
            for o in &self.moving_circles {
                if o.prio > priority && o.intersects(pos, time) {
                    priority = o.prio;
                }
            }
            for o in &self.moving_lines {
                if o.prio > priority && o.intersects(pos, time) {
                    priority = o.prio;
                }
            }
            if priority > best_prio {
                best_prio = priority;
                best_prio_time = 0.0;
            }
            if priority == best_prio {
                if i == samples - 1 {
                    best_prio_time += 10.0;
                } else {
                    best_prio_time += SCORE_SAMPLING_INTERVAL;
                }
            }
        }
        (best_prio, best_prio_time)
    }
}
