//! One-dimensional acceleration-bounded speed profiles.
//!
//! A profile is a sequence of (speed, time) breakpoints with constant
//! acceleration between neighbours. Constructors produce per-segment
//! durations; [`SpeedProfile1D::integrate_time`] converts them to cumulative
//! timestamps before the profile is merged into a 2D trajectory.

/// One speed/time breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VT {
    pub v: f32,
    pub t: f32,
}

/// Piecewise-linear speed over time on one axis.
#[derive(Debug, Clone, Default)]
pub struct SpeedProfile1D {
    pub profile: Vec<VT>,
}

/// End position and the peak speed of a profile, without materializing it.
///
/// `increase_at_speed` is the speed at which extra time would extend the
/// covered distance: the dwell speed of the excursion.
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryPosInfo1D {
    pub end_pos: f32,
    pub increase_at_speed: f32,
}

fn constant_distance(v: f32, time: f32) -> f32 {
    v * time
}

/// Distance covered by a full-rate ramp from v0 to v1.
fn dist(v0: f32, v1: f32, acc: f32) -> f32 {
    let time = (v0 - v1).abs() / acc;
    0.5 * (v0 + v1) * time
}

/// Distance and dwell speed of a symmetric excursion from `v` that spends
/// `time` extra seconds, clipped into a trapezoid at `v_max`.
fn free_extra_time_distance(v: f32, time: f32, acc: f32, v_max: f32) -> (f32, f32) {
    let to_max_time = 2.0 * (v_max - v).abs() / acc;
    if to_max_time < time {
        (
            2.0 * dist(v, v_max, acc) + constant_distance(v_max, time - to_max_time),
            v_max,
        )
    } else {
        let v1 = (if v > v_max { -1.0 } else { 1.0 }) * acc * time / 2.0 + v;
        (2.0 * dist(v, v1, acc), v1)
    }
}

/// End position of the exact-end-speed profile, position only.
///
/// `hint_dist` is the signed extra time: its sign selects the direction of
/// the dwell, its magnitude the extra duration beyond the mandatory
/// |v0-v1|/acc transition.
pub fn end_position_1d(v0: f32, v1: f32, hint_dist: f32, acc: f32, v_max: f32) -> TrajectoryPosInfo1D {
    let desired_v_max = if hint_dist < 0.0 { -v_max } else { v_max };
    if hint_dist == 0.0 {
        TrajectoryPosInfo1D {
            end_pos: dist(v0, v1, acc),
            increase_at_speed: v0.max(v1),
        }
    } else if (v0 < desired_v_max) != (v1 < desired_v_max) {
        // the profile crosses the signed maximum speed and dwells there
        TrajectoryPosInfo1D {
            end_pos: dist(v0, v1, acc) + constant_distance(desired_v_max, hint_dist.abs()),
            increase_at_speed: desired_v_max,
        }
    } else {
        // the endpoint closer to the desired max speed gets the excursion
        let v0_closer = (v0 - desired_v_max).abs() < (v1 - desired_v_max).abs();
        let closer_speed = if v0_closer { v0 } else { v1 };
        let (extra, at_speed) = free_extra_time_distance(closer_speed, hint_dist.abs(), acc, desired_v_max);
        TrajectoryPosInfo1D {
            end_pos: extra + dist(v0, v1, acc),
            increase_at_speed: at_speed,
        }
    }
}

/// Bound the reachable end speed into [0, v1] (directionally) and compute
/// the time left over after the transition to it.
fn adjust_end_speed(v0: f32, v1: f32, time: f32, direction_positive: bool, acc: f32) -> VT {
    let inv_acc = 1.0 / acc;

    // speed reached after accelerating in the desired direction for the
    // whole time
    let speed_after_t = v0 + (if direction_positive { 1.0 } else { -1.0 }) * (time * acc);
    // bound that speed to the allowed end speed range [0, v1]
    let bounded_speed = speed_after_t.min(v1.max(0.0)).max(v1.min(0.0));
    // time needed to reach the bounded speed from v0
    let necessary_time = (v0 - bounded_speed).abs() * inv_acc;
    VT {
        v: bounded_speed,
        t: time - necessary_time,
    }
}

/// End position of the fast-end-speed profile, position only.
pub fn end_position_1d_fast_speed(
    v0: f32,
    v1: f32,
    time: f32,
    direction_positive: bool,
    acc: f32,
    v_max: f32,
) -> TrajectoryPosInfo1D {
    let end_values = adjust_end_speed(v0, v1, time, direction_positive, acc);
    if end_values.t == 0.0 {
        TrajectoryPosInfo1D {
            end_pos: (v0 + end_values.v) * 0.5 * time,
            increase_at_speed: if direction_positive {
                v0.max(v1)
            } else {
                v0.min(v1)
            },
        }
    } else {
        end_position_1d(
            v0,
            end_values.v,
            if direction_positive {
                end_values.t
            } else {
                -end_values.t
            },
            acc,
            v_max,
        )
    }
}

impl SpeedProfile1D {
    /// Profile from v0 to exactly v1, spending `extra_time` beyond the
    /// mandatory transition.
    pub fn exact_end_speed(
        v0: f32,
        v1: f32,
        extra_time: f32,
        direction_positive: bool,
        acc: f32,
        v_max: f32,
    ) -> Self {
        let mut result = SpeedProfile1D::default();
        result.profile.push(VT { v: v0, t: 0.0 });

        let desired_v_max = if direction_positive { v_max } else { -v_max };
        if extra_time == 0.0 {
            result.profile.push(VT {
                v: v1,
                t: (v0 - v1).abs() / acc,
            });
        } else if (v0 < desired_v_max) != (v1 < desired_v_max) {
            // v0 and v1 lie on opposite sides of the signed maximum speed:
            // ramp to it, dwell for the extra time, ramp to v1
            let acc_inv = 1.0 / acc;
            result.profile.push(VT {
                v: desired_v_max,
                t: (v0 - desired_v_max).abs() * acc_inv,
            });
            result.profile.push(VT {
                v: desired_v_max,
                t: extra_time,
            });
            result.profile.push(VT {
                v: v1,
                t: (v1 - desired_v_max).abs() * acc_inv,
            });
        } else {
            let v0_closer = (v0 - desired_v_max).abs() < (v1 - desired_v_max).abs();
            let closer_speed = if v0_closer { v0 } else { v1 };
            result.push_free_extra_time_segment(v0, closer_speed, v1, extra_time, acc, desired_v_max);
        }
        result
    }

    /// Profile from v0 to the largest reachable speed within [0, v1]
    /// (directionally), using `time` seconds in total.
    pub fn fast_end_speed(
        v0: f32,
        v1: f32,
        time: f32,
        direction_positive: bool,
        acc: f32,
        v_max: f32,
    ) -> Self {
        let end_values = adjust_end_speed(v0, v1, time, direction_positive, acc);
        if end_values.t == 0.0 {
            let mut result = SpeedProfile1D::default();
            result.profile.push(VT { v: v0, t: 0.0 });
            result.profile.push(VT {
                v: end_values.v,
                t: (end_values.v - v0).abs() / acc,
            });
            result
        } else {
            Self::exact_end_speed(v0, end_values.v, end_values.t, direction_positive, acc, v_max)
        }
    }

    /// Two-point profile with the given ramp duration.
    pub fn linear(v0: f32, v1: f32, time: f32) -> Self {
        SpeedProfile1D {
            profile: vec![VT { v: v0, t: 0.0 }, VT { v: v1, t: time }],
        }
    }

    /// Triangle (or vMax-clipped trapezoid) excursion around `v`.
    fn push_free_extra_time_segment(
        &mut self,
        before_speed: f32,
        v: f32,
        next_speed: f32,
        time: f32,
        acc: f32,
        desired_v_max: f32,
    ) {
        let to_max_time = 2.0 * (desired_v_max - v).abs() / acc;
        if to_max_time < time {
            self.profile.push(VT {
                v: desired_v_max,
                t: (desired_v_max - before_speed).abs() / acc,
            });
            self.profile.push(VT {
                v: desired_v_max,
                t: time - to_max_time,
            });
            self.profile.push(VT {
                v: next_speed,
                t: (desired_v_max - next_speed).abs() / acc,
            });
        } else {
            let v1 = (if v > desired_v_max { -1.0 } else { 1.0 }) * acc * time / 2.0 + v;
            self.profile.push(VT {
                v: v1,
                t: (before_speed - v1).abs() / acc,
            });
            self.profile.push(VT {
                v: next_speed,
                t: (next_speed - v1).abs() / acc,
            });
        }
    }

    /// Convert per-segment durations into cumulative timestamps.
    pub fn integrate_time(&mut self) {
        let mut total_time = 0.0;
        for entry in self.profile.iter_mut() {
            total_time += entry.t;
            entry.t = total_time;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn total_time(p: &SpeedProfile1D) -> f32 {
        p.profile.last().unwrap().t
    }

    fn end_pos(p: &SpeedProfile1D) -> f32 {
        // trapezoid integration over the integrated profile
        let mut pos = 0.0;
        for pair in p.profile.windows(2) {
            pos += (pair[0].v + pair[1].v) * 0.5 * (pair[1].t - pair[0].t);
        }
        pos
    }

    #[test]
    fn test_single_ramp() {
        let mut p = SpeedProfile1D::exact_end_speed(0.0, 2.0, 0.0, true, 2.0, 3.0);
        p.integrate_time();
        assert_eq!(p.profile.len(), 2);
        assert_relative_eq!(total_time(&p), 1.0);
        assert_relative_eq!(end_pos(&p), 1.0);
    }

    #[test]
    fn test_extra_time_adds_duration() {
        let extra = 0.5;
        let mut base = SpeedProfile1D::exact_end_speed(0.5, 1.0, 0.0, true, 2.0, 3.0);
        base.integrate_time();
        let mut p = SpeedProfile1D::exact_end_speed(0.5, 1.0, extra, true, 2.0, 3.0);
        p.integrate_time();
        assert_relative_eq!(total_time(&p), total_time(&base) + extra, epsilon = 1e-5);
    }

    #[test]
    fn test_extra_time_dwell_at_vmax() {
        // endpoints on opposite sides of vMax: ramp up, dwell, ramp down
        let mut p = SpeedProfile1D::exact_end_speed(1.0, 3.5, 0.4, true, 2.0, 3.0);
        p.integrate_time();
        assert_eq!(p.profile.len(), 4);
        assert_relative_eq!(p.profile[1].v, 3.0);
        assert_relative_eq!(p.profile[2].v, 3.0);
        assert_relative_eq!(p.profile[2].t - p.profile[1].t, 0.4);
        assert_relative_eq!(p.profile[3].v, 3.5);
    }

    #[test]
    fn test_excursion_clipped_to_trapezoid() {
        // big extra time forces the triangle peak beyond vMax
        let mut p = SpeedProfile1D::exact_end_speed(2.0, 2.0, 5.0, true, 2.0, 3.0);
        p.integrate_time();
        assert_eq!(p.profile.len(), 4);
        assert_relative_eq!(p.profile[1].v, 3.0);
        assert_relative_eq!(total_time(&p), 5.0, epsilon = 1e-5);
    }

    #[test]
    fn test_end_position_matches_profile() {
        for &(v0, v1, extra) in &[
            (0.0f32, 1.5f32, 0.0f32),
            (0.5, 1.0, 0.3),
            (1.0, 3.5, 0.4),
            (2.0, 2.0, 5.0),
            (-1.0, 0.5, 0.2),
        ] {
            let info = end_position_1d(v0, v1, extra, 2.0, 3.0);
            let mut p = SpeedProfile1D::exact_end_speed(v0, v1, extra, true, 2.0, 3.0);
            p.integrate_time();
            assert_relative_eq!(info.end_pos, end_pos(&p), epsilon = 1e-4);
        }
    }

    #[test]
    fn test_negative_direction_mirrors() {
        let mut pos = SpeedProfile1D::exact_end_speed(0.0, 1.0, 0.5, true, 2.0, 3.0);
        pos.integrate_time();
        let mut neg = SpeedProfile1D::exact_end_speed(0.0, -1.0, 0.5, false, 2.0, 3.0);
        neg.integrate_time();
        assert_relative_eq!(end_pos(&pos), -end_pos(&neg), epsilon = 1e-5);
        assert_relative_eq!(total_time(&pos), total_time(&neg), epsilon = 1e-5);
    }

    #[test]
    fn test_fast_end_speed_bounds_endpoint() {
        // not enough time to reach v1: the end speed is what is reachable
        let p = SpeedProfile1D::fast_end_speed(0.0, 3.0, 0.5, true, 2.0, 3.0);
        let end = p.profile.last().unwrap().v;
        assert_relative_eq!(end, 1.0);

        // plenty of time: end speed stays within [0, v1]
        let p = SpeedProfile1D::fast_end_speed(2.0, 1.0, 2.0, true, 2.0, 3.0);
        let end = p.profile.last().unwrap().v;
        assert!(end >= 0.0 && end <= 2.0 + 1e-6);
    }

    #[test]
    fn test_fast_end_speed_matches_position_info() {
        for &(v0, v1, time) in &[(0.0f32, 3.0f32, 0.5f32), (1.0, 2.0, 1.5), (2.0, 0.5, 1.0)] {
            let info = end_position_1d_fast_speed(v0, v1, time, true, 2.0, 3.0);
            let mut p = SpeedProfile1D::fast_end_speed(v0, v1, time, true, 2.0, 3.0);
            p.integrate_time();
            assert_relative_eq!(info.end_pos, end_pos(&p), epsilon = 1e-4);
        }
    }
}
