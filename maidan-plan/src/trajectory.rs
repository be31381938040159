//! Two-dimensional trajectories merged from per-axis speed profiles.
//!
//! A trajectory is a sequence of (velocity, cumulative time) breakpoints
//! plus a start position. Between breakpoints the velocity is interpolated
//! linearly (constant acceleration). When a slow-down time is set, the
//! final stretch of the trajectory is re-timed with an exponentially
//! decaying acceleration; position and speed queries stay exact in that
//! regime through piecewise cubic offsets.

use crate::profile::{SpeedProfile1D, VT};
use maidan_core::{BoundingBox, RobotState, TrajectoryPoint, Vector2};

/// Length of the exponential slow-down tail in seconds.
pub const SLOW_DOWN_TIME: f32 = 0.3;

/// Acceleration factor reached at the very end of the slow-down tail.
const MIN_ACC_FACTOR: f32 = 0.3;

const SAME_POINT_EPSILON: f32 = 1e-4;

/// One velocity/time breakpoint of a merged trajectory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VT2 {
    pub v: Vector2,
    pub t: f32,
}

fn sign(x: f32) -> f32 {
    if x < 0.0 { -1.0 } else { 1.0 }
}

fn comp(v: Vector2, j: usize) -> f32 {
    if j == 0 { v.x } else { v.y }
}

fn comp_mut(v: &mut Vector2, j: usize) -> &mut f32 {
    if j == 0 { &mut v.x } else { &mut v.y }
}

/// Per-segment precomputation for the slow-down integrator.
#[derive(Debug, Clone, Copy, Default)]
struct SegmentPrecomputation {
    inv_segment_time: f32,
    v0: Vector2,
    a0: Vector2,
    a1: Vector2,
    /// re-timed duration of the slowed-down part of the segment
    segment_time: f32,
    partial_distance: Vector2,
}

/// Integrator over trajectory segments.
///
/// With a disabled slow-down time (-1) the start of the slow-down region
/// lies past the trajectory end and every segment takes the constant
/// acceleration path.
struct Integrator {
    slow_down_start_time: f32,
    end_time: f32,
}

impl Integrator {
    fn new(total_simple_time: f32, slow_down_time: f32) -> Self {
        Self {
            slow_down_start_time: total_simple_time - slow_down_time,
            end_time: total_simple_time + SLOW_DOWN_TIME - slow_down_time,
        }
    }

    fn compute_acceleration(time_to_end: f32) -> f32 {
        let total_time = 2.0 / (1.0 + MIN_ACC_FACTOR);
        let a_factor = (MIN_ACC_FACTOR - 1.0) / total_time;
        let t_factor = 1.0 - time_to_end / SLOW_DOWN_TIME;
        (1.0 + 2.0 * t_factor * a_factor).sqrt()
    }

    fn constant_offset(first: &VT2, second: &VT2) -> Vector2 {
        (first.v + second.v) * (0.5 * (second.t - first.t))
    }

    fn constant_partial(
        first: &VT2,
        second: &VT2,
        pre: &SegmentPrecomputation,
        transformed_t0: f32,
        time: f32,
    ) -> (Vector2, Vector2) {
        let time_diff = time - transformed_t0;
        let diff = if second.t == first.t {
            1.0
        } else {
            time_diff * pre.inv_segment_time
        };
        let speed = first.v + (second.v - first.v) * diff;
        let part_dist = (first.v + speed) * (0.5 * time_diff);
        (part_dist, speed)
    }

    fn precompute(&self, first: &VT2, second: &VT2) -> SegmentPrecomputation {
        let mut result = SegmentPrecomputation {
            inv_segment_time: if second.t == first.t {
                1.0
            } else {
                1.0 / (second.t - first.t)
            },
            ..Default::default()
        };
        if second.t <= self.slow_down_start_time || first.t == second.t {
            return result;
        }
        let t0;
        if first.t < self.slow_down_start_time {
            let (partial, v0) = Self::constant_partial(
                first,
                second,
                &result,
                first.t,
                self.slow_down_start_time,
            );
            result.partial_distance = partial;
            result.v0 = v0;
            t0 = self.slow_down_start_time;
        } else {
            result.partial_distance = Vector2::zero();
            result.v0 = first.v;
            t0 = first.t;
        }
        let base_acc = (first.v - second.v).abs() * (1.0 / (second.t - first.t));
        let acceleration_factor0 = Self::compute_acceleration(self.end_time - t0);
        let acceleration_factor1 = Self::compute_acceleration(self.end_time - second.t);
        result.a0 = base_acc * acceleration_factor0;
        result.a1 = base_acc * acceleration_factor1;
        result.segment_time =
            2.0 * (second.t - t0) / (acceleration_factor0 + acceleration_factor1);
        result
    }

    fn segment_offset(&self, first: &VT2, second: &VT2, pre: &SegmentPrecomputation) -> Vector2 {
        if second.t <= self.slow_down_start_time || first.t == second.t {
            return Self::constant_offset(first, second);
        }
        let t = pre.segment_time;
        let speed_diff = second.v - pre.v0;
        let diff_sign = Vector2::new(sign(speed_diff.x), sign(speed_diff.y));
        let signed_a0 = Vector2::new(diff_sign.x * pre.a0.x, diff_sign.y * pre.a0.y);
        let a_diff = pre.a1 - pre.a0;
        let signed_a_diff = Vector2::new(diff_sign.x * a_diff.x, diff_sign.y * a_diff.y);
        let d = pre.v0 * t + signed_a0 * (0.5 * t * t) + signed_a_diff * ((1.0 / 6.0) * t * t);
        pre.partial_distance + d
    }

    fn partial_segment(
        &self,
        first: &VT2,
        second: &VT2,
        pre: &SegmentPrecomputation,
        transformed_t0: f32,
        time: f32,
    ) -> (Vector2, Vector2) {
        if time <= self.slow_down_start_time || first.t == second.t {
            return Self::constant_partial(first, second, pre, transformed_t0, time);
        }
        let slowdown_t0 = if first.t > self.slow_down_start_time {
            transformed_t0
        } else {
            self.slow_down_start_time
        };
        let tm = time - slowdown_t0;
        let speed_diff = second.v - pre.v0;
        let diff_sign = Vector2::new(sign(speed_diff.x), sign(speed_diff.y));
        let signed_a0 = Vector2::new(diff_sign.x * pre.a0.x, diff_sign.y * pre.a0.y);
        let a_diff = pre.a1 - pre.a0;
        let signed_a_diff = Vector2::new(diff_sign.x * a_diff.x, diff_sign.y * a_diff.y);
        let inv_segment_time = 1.0 / pre.segment_time;
        let speed = pre.v0 + signed_a0 * tm + signed_a_diff * (0.5 * tm * tm * inv_segment_time);
        let d = pre.v0 * tm
            + signed_a0 * (0.5 * tm * tm)
            + signed_a_diff * ((1.0 / 6.0) * tm * tm * tm * inv_segment_time);
        (pre.partial_distance + d, speed)
    }

    fn time_for_segment(&self, first: &VT2, second: &VT2, pre: &SegmentPrecomputation) -> f32 {
        if second.t <= self.slow_down_start_time {
            second.t - first.t
        } else if first.t < self.slow_down_start_time {
            self.slow_down_start_time - first.t + pre.segment_time
        } else {
            pre.segment_time
        }
    }
}

/// An acceleration-bounded 2D trajectory.
#[derive(Debug, Clone)]
pub struct Trajectory {
    profile: Vec<VT2>,
    s0: Vector2,
    correction_offset_per_second: Vector2,
    /// -1 when the exponential slow-down is disabled
    slow_down_time: f32,
}

impl Trajectory {
    /// Merge two integrated per-axis profiles into one breakpoint sequence.
    ///
    /// A slow-down time of zero disables the exponential tail; an exact zero
    /// tail would sit on the trajectory end and cause numerical trouble.
    pub fn new(
        x_profile: &SpeedProfile1D,
        y_profile: &SpeedProfile1D,
        start_pos: Vector2,
        slow_down_time: f32,
    ) -> Self {
        let x = &x_profile.profile;
        let y = &y_profile.profile;
        let mut profile: Vec<VT2> = Vec::with_capacity(x.len() + y.len());

        let mut x_index = 0;
        let mut y_index = 0;
        while x_index < x.len() && y_index < y.len() {
            let x_next = x[x_index].t;
            let y_next = y[y_index].t;

            if (x_next - y_next).abs() < SAME_POINT_EPSILON {
                let time = (x_next + y_next) * 0.5;
                profile.push(VT2 {
                    v: Vector2::new(x[x_index].v, y[y_index].v),
                    t: time,
                });
                x_index += 1;
                y_index += 1;
            } else if x_next < y_next {
                let vy = speed_for_time(y[y_index - 1], y[y_index], x_next);
                profile.push(VT2 {
                    v: Vector2::new(x[x_index].v, vy),
                    t: x_next,
                });
                x_index += 1;
            } else {
                let vx = speed_for_time(x[x_index - 1], x[x_index], y_next);
                profile.push(VT2 {
                    v: Vector2::new(vx, y[y_index].v),
                    t: y_next,
                });
                y_index += 1;
            }
        }
        while x_index < x.len() {
            profile.push(VT2 {
                v: Vector2::new(x[x_index].v, y.last().unwrap().v),
                t: x[x_index].t,
            });
            x_index += 1;
        }
        while y_index < y.len() {
            profile.push(VT2 {
                v: Vector2::new(x.last().unwrap().v, y[y_index].v),
                t: y[y_index].t,
            });
            y_index += 1;
        }

        Self {
            profile,
            s0: start_pos,
            correction_offset_per_second: Vector2::zero(),
            slow_down_time: if slow_down_time == 0.0 {
                -1.0
            } else {
                slow_down_time
            },
        }
    }

    fn integrator(&self) -> Integrator {
        Integrator::new(self.profile.last().unwrap().t, self.slow_down_time)
    }

    #[inline]
    pub fn start_pos(&self) -> Vector2 {
        self.s0
    }

    pub fn set_start_pos(&mut self, s0: Vector2) {
        self.s0 = s0;
    }

    /// Constant offset per second added to position queries; absorbs small
    /// endpoint residuals of the trajectory search.
    pub fn set_correction_offset(&mut self, offset_per_second: Vector2) {
        self.correction_offset_per_second = offset_per_second;
    }

    #[inline]
    pub fn end_speed(&self) -> Vector2 {
        self.profile.last().unwrap().v
    }

    #[inline]
    pub fn start_speed(&self) -> Vector2 {
        self.profile.first().unwrap().v
    }

    /// Total duration, slow-down stretching included.
    pub fn time(&self) -> f32 {
        if self.slow_down_time == -1.0 {
            return self.profile.last().unwrap().t;
        }
        let acceleration = self.integrator();
        let mut time = 0.0;
        for pair in self.profile.windows(2) {
            let pre = acceleration.precompute(&pair[0], &pair[1]);
            time += acceleration.time_for_segment(&pair[0], &pair[1], &pre);
        }
        time
    }

    /// Truncate the trajectory at `time`, interpolating the final
    /// breakpoint. Only meaningful without a slow-down tail.
    pub fn limit_to_time(&mut self, time: f32) {
        for i in 0..self.profile.len() - 1 {
            if self.profile[i + 1].t >= time {
                let diff = if self.profile[i + 1].t == self.profile[i].t {
                    1.0
                } else {
                    (time - self.profile[i].t) / (self.profile[i + 1].t - self.profile[i].t)
                };
                let speed =
                    self.profile[i].v + (self.profile[i + 1].v - self.profile[i].v) * diff;
                self.profile[i + 1] = VT2 { v: speed, t: time };
                self.profile.truncate(i + 2);
                return;
            }
        }
    }

    /// Final position, slow-down and correction offset included.
    pub fn end_position(&self) -> Vector2 {
        let acceleration = self.integrator();
        let mut offset = self.s0;
        let mut total_time = 0.0;
        for pair in self.profile.windows(2) {
            let pre = acceleration.precompute(&pair[0], &pair[1]);
            offset += acceleration.segment_offset(&pair[0], &pair[1], &pre);
            total_time += acceleration.time_for_segment(&pair[0], &pair[1], &pre);
        }
        offset + self.correction_offset_per_second * total_time
    }

    /// Position and speed at `time` (clamped to the trajectory end).
    pub fn state_at(&self, time: f32) -> RobotState {
        let acceleration = self.integrator();
        let mut offset = self.s0;
        let mut total_time = 0.0;
        for pair in self.profile.windows(2) {
            let pre = acceleration.precompute(&pair[0], &pair[1]);
            let segment_time = acceleration.time_for_segment(&pair[0], &pair[1], &pre);
            if total_time + segment_time > time {
                let (part_offset, speed) =
                    acceleration.partial_segment(&pair[0], &pair[1], &pre, total_time, time);
                return RobotState::new(
                    offset + self.correction_offset_per_second * time + part_offset,
                    speed,
                );
            }
            offset += acceleration.segment_offset(&pair[0], &pair[1], &pre);
            total_time += segment_time;
        }
        RobotState::new(
            offset + self.correction_offset_per_second * total_time,
            self.profile.last().unwrap().v,
        )
    }

    /// Bulk sampling: `count` states spaced `time_interval` apart, with
    /// reported times starting at `time_offset`.
    pub fn positions(&self, count: usize, time_interval: f32, time_offset: f32) -> Vec<TrajectoryPoint> {
        if count == 0 {
            return Vec::new();
        }
        let acceleration = self.integrator();

        let mut result: Vec<TrajectoryPoint> = (0..count)
            .map(|i| TrajectoryPoint {
                state: RobotState::default(),
                time: time_offset + i as f32 * time_interval,
            })
            .collect();

        let mut offset = self.s0;
        let mut total_time = 0.0;
        let mut next_desired_time = 0.0;
        let mut result_counter = 0;

        for i in 0..self.profile.len() - 1 {
            let pre = acceleration.precompute(&self.profile[i], &self.profile[i + 1]);
            let segment_time =
                acceleration.time_for_segment(&self.profile[i], &self.profile[i + 1], &pre);
            while total_time + segment_time >= next_desired_time {
                let (part_offset, speed) = acceleration.partial_segment(
                    &self.profile[i],
                    &self.profile[i + 1],
                    &pre,
                    total_time,
                    next_desired_time,
                );
                result[result_counter].state.pos =
                    offset + part_offset + self.correction_offset_per_second * next_desired_time;
                result[result_counter].state.speed = speed;
                result_counter += 1;
                next_desired_time += time_interval;

                if result_counter == result.len() {
                    return result;
                }
            }
            offset += acceleration.segment_offset(&self.profile[i], &self.profile[i + 1], &pre);
            total_time += segment_time;
        }

        while result_counter < result.len() {
            result[result_counter].state.pos =
                offset + self.correction_offset_per_second * total_time;
            result[result_counter].state.speed = self.profile.last().unwrap().v;
            result_counter += 1;
        }

        result
    }

    /// Analytic bounding box over the whole trajectory, including the curve
    /// extrema where an axis speed crosses zero.
    pub fn bounding_box(&self) -> BoundingBox {
        let acceleration = self.integrator();

        let mut bounds = BoundingBox::new(self.s0, self.s0);
        let mut offset = self.s0;
        for i in 0..self.profile.len() - 1 {
            for j in 0..2 {
                let v_first = comp(self.profile[i].v, j);
                let v_second = comp(self.profile[i + 1].v, j);
                if (v_first > 0.0) != (v_second > 0.0) {
                    let proportion = v_first.abs() / (v_first.abs() + v_second.abs());
                    let rel_time = (self.profile[i + 1].t - self.profile[i].t) * proportion;
                    let total_time = self.profile[i].t + rel_time;
                    let zero_segment = VT2 {
                        v: Vector2::zero(),
                        t: total_time,
                    };

                    let pre = acceleration.precompute(&self.profile[i], &zero_segment);
                    let partial_offset = offset
                        + acceleration.segment_offset(&self.profile[i], &zero_segment, &pre)
                        + self.correction_offset_per_second * rel_time;
                    let value = comp(partial_offset, j);
                    let mut min_point = bounds.min;
                    let mut max_point = bounds.max;
                    *comp_mut(&mut min_point, j) = comp(bounds.min, j).min(value);
                    *comp_mut(&mut max_point, j) = comp(bounds.max, j).max(value);
                    bounds.min = min_point;
                    bounds.max = max_point;
                }
            }

            let pre = acceleration.precompute(&self.profile[i], &self.profile[i + 1]);
            offset += acceleration.segment_offset(&self.profile[i], &self.profile[i + 1], &pre)
                + self.correction_offset_per_second
                    * (self.profile[i + 1].t - self.profile[i].t);
            bounds.merge_point(offset);
        }
        bounds
    }
}

fn speed_for_time(first: VT, second: VT, time: f32) -> f32 {
    let time_diff = time - first.t;
    let diff = if second.t == first.t {
        1.0
    } else {
        time_diff / (second.t - first.t)
    };
    first.v + diff * (second.v - first.v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn simple_trajectory(slow_down: f32) -> Trajectory {
        // x: ramp 0 -> 1 m/s over 1s, hold implicitly by second ramp down
        let mut x = SpeedProfile1D::exact_end_speed(0.0, 1.0, 0.5, true, 2.0, 3.0);
        x.integrate_time();
        let mut y = SpeedProfile1D::exact_end_speed(0.5, 0.0, 0.0, true, 2.0, 3.0);
        y.integrate_time();
        Trajectory::new(&x, &y, Vector2::new(1.0, -1.0), slow_down)
    }

    #[test]
    fn test_merge_carries_both_axes() {
        let t = simple_trajectory(0.0);
        assert_eq!(t.start_speed(), Vector2::new(0.0, 0.5));
        // y finishes before x; its final speed must be held in later entries
        let end = t.end_speed();
        assert_relative_eq!(end.y, 0.0);
    }

    #[test]
    fn test_state_at_start_and_end() {
        let t = simple_trajectory(0.0);
        let start = t.state_at(0.0);
        assert_relative_eq!(start.pos.x, 1.0);
        assert_relative_eq!(start.pos.y, -1.0);
        assert_relative_eq!(start.speed.x, 0.0);
        assert_relative_eq!(start.speed.y, 0.5);

        let total = t.time();
        let end = t.state_at(total + 1.0);
        assert_relative_eq!(end.pos.x, t.end_position().x, epsilon = 1e-5);
        assert_relative_eq!(end.pos.y, t.end_position().y, epsilon = 1e-5);
    }

    #[test]
    fn test_positions_match_state_at() {
        let t = simple_trajectory(0.0);
        let total = t.time();
        let samples = t.positions(50, total / 49.0, 0.0);
        for p in &samples {
            let state = t.state_at(p.time);
            assert!(state.pos.distance(p.state.pos) < 1e-3);
            assert!(state.speed.distance(p.state.speed) < 1e-3);
        }
    }

    #[test]
    fn test_limit_to_time_is_prefix() {
        let t = simple_trajectory(0.0);
        let total = t.time();
        let cut = total * 0.6;
        let mut limited = t.clone();
        limited.limit_to_time(cut);
        assert_relative_eq!(limited.time(), cut, epsilon = 1e-5);
        for i in 0..20 {
            let at = cut * i as f32 / 19.0;
            let a = t.state_at(at);
            let b = limited.state_at(at);
            assert!(a.pos.distance(b.pos) < 1e-4);
            assert!(a.speed.distance(b.speed) < 1e-4);
        }
    }

    #[test]
    fn test_slow_down_extends_duration() {
        let plain = simple_trajectory(0.0);
        let slowed = simple_trajectory(SLOW_DOWN_TIME);
        assert!(slowed.time() > plain.time());
    }

    #[test]
    fn test_slow_down_positions_continuous() {
        let t = simple_trajectory(SLOW_DOWN_TIME);
        let total = t.time();
        let mut last = t.state_at(0.0);
        for i in 1..200 {
            let at = total * i as f32 / 199.0;
            let state = t.state_at(at);
            let dt = total / 199.0;
            let step = last.pos.distance(state.pos);
            // position moves no faster than the larger of the two speeds
            let bound = last.speed.length().max(state.speed.length()) * 1.2 * dt + 1e-4;
            assert!(step <= bound, "step {} > bound {} at t={}", step, bound, at);
            last = state;
        }
    }

    #[test]
    fn test_bounding_box_contains_samples() {
        for slow_down in [0.0, SLOW_DOWN_TIME] {
            let t = simple_trajectory(slow_down);
            let total = t.time();
            let bb = t.bounding_box();
            let samples = t.positions(1000, total / 999.0, 0.0);
            let mut sampled = BoundingBox::new(samples[0].state.pos, samples[0].state.pos);
            for p in &samples {
                sampled.merge_point(p.state.pos);
            }
            assert!((sampled.min.x - bb.min.x).abs() < 0.01);
            assert!((sampled.min.y - bb.min.y).abs() < 0.01);
            assert!((sampled.max.x - bb.max.x).abs() < 0.01);
            assert!((sampled.max.y - bb.max.y).abs() < 0.01);
        }
    }
}
