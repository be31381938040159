//! Static and moving obstacle models.
//!
//! Obstacles are convex regions with a signed distance: negative inside,
//! where the inside distance is the (negated) distance to the nearest point
//! on the boundary. This contract is what the obstacle-relative RRT
//! extension relies on.

use maidan_core::{LineSegment, Vector2};
use serde::{Deserialize, Serialize};

/// A static obstacle with a priority. Higher priority wins when regions
/// overlap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Obstacle {
    Circle {
        center: Vector2,
        radius: f32,
        prio: i32,
    },
    Rect {
        bottom_left: Vector2,
        top_right: Vector2,
        prio: i32,
    },
    Triangle {
        p1: Vector2,
        p2: Vector2,
        p3: Vector2,
        line_width: f32,
        prio: i32,
    },
    ThickLine {
        segment: LineSegment,
        width: f32,
        prio: i32,
    },
}

impl Obstacle {
    pub fn circle(center: Vector2, radius: f32, prio: i32) -> Self {
        Obstacle::Circle {
            center,
            radius,
            prio,
        }
    }

    /// Rectangle from two arbitrary corners.
    pub fn rect(a: Vector2, b: Vector2, prio: i32) -> Self {
        Obstacle::Rect {
            bottom_left: Vector2::new(a.x.min(b.x), a.y.min(b.y)),
            top_right: Vector2::new(a.x.max(b.x), a.y.max(b.y)),
            prio,
        }
    }

    /// Triangle with counter-clockwise winding enforced on construction.
    pub fn triangle(a: Vector2, b: Vector2, c: Vector2, line_width: f32, prio: i32) -> Self {
        if Vector2::det(a, b, c) > 0.0 {
            Obstacle::Triangle {
                p1: a,
                p2: b,
                p3: c,
                line_width,
                prio,
            }
        } else {
            Obstacle::Triangle {
                p1: a,
                p2: c,
                p3: b,
                line_width,
                prio,
            }
        }
    }

    pub fn thick_line(p1: Vector2, p2: Vector2, width: f32, prio: i32) -> Self {
        Obstacle::ThickLine {
            segment: LineSegment::new(p1, p2),
            width,
            prio,
        }
    }

    pub fn priority(&self) -> i32 {
        match *self {
            Obstacle::Circle { prio, .. }
            | Obstacle::Rect { prio, .. }
            | Obstacle::Triangle { prio, .. }
            | Obstacle::ThickLine { prio, .. } => prio,
        }
    }

    /// Signed distance from a point; negative inside the obstacle.
    pub fn distance(&self, v: Vector2) -> f32 {
        match self {
            Obstacle::Circle { center, radius, .. } => v.distance(*center) - radius,
            Obstacle::Rect {
                bottom_left,
                top_right,
                ..
            } => rect_distance(*bottom_left, *top_right, v),
            Obstacle::Triangle {
                p1,
                p2,
                p3,
                line_width,
                ..
            } => triangle_distance(*p1, *p2, *p3, v) - line_width,
            Obstacle::ThickLine { segment, width, .. } => segment.distance(v) - width,
        }
    }

    /// Minimum signed distance between a segment and the obstacle; zero when
    /// the segment intersects or is contained.
    pub fn distance_to_segment(&self, seg: &LineSegment) -> f32 {
        match self {
            Obstacle::Circle { center, radius, .. } => seg.distance(*center) - radius,
            Obstacle::Rect {
                bottom_left,
                top_right,
                ..
            } => rect_segment_distance(*bottom_left, *top_right, seg),
            Obstacle::Triangle {
                p1,
                p2,
                p3,
                line_width,
                ..
            } => triangle_segment_distance(*p1, *p2, *p3, *line_width, seg),
            Obstacle::ThickLine { segment, width, .. } => {
                segment.distance_to_segment(seg) - width
            }
        }
    }
}

fn rect_distance(bottom_left: Vector2, top_right: Vector2, v: Vector2) -> f32 {
    let dist_x = (bottom_left.x - v.x).max(v.x - top_right.x);
    let dist_y = (bottom_left.y - v.y).max(v.y - top_right.y);

    if dist_x >= 0.0 && dist_y >= 0.0 {
        // outside, nearest to a corner
        (dist_x * dist_x + dist_y * dist_y).sqrt()
    } else if dist_x < 0.0 && dist_y < 0.0 {
        // inside
        dist_x.max(dist_y)
    } else if dist_x < 0.0 {
        dist_y
    } else {
        dist_x
    }
}

fn rect_segment_distance(bottom_left: Vector2, top_right: Vector2, seg: &LineSegment) -> f32 {
    let inside = |p: Vector2| {
        p.x >= bottom_left.x && p.x <= top_right.x && p.y >= bottom_left.y && p.y <= top_right.y
    };
    if inside(seg.start()) || inside(seg.end()) {
        return 0.0;
    }

    let bottom_right = Vector2::new(top_right.x, bottom_left.y);
    let top_left = Vector2::new(bottom_left.x, top_right.y);

    let dist_top = seg.distance_to_segment(&LineSegment::new(top_left, top_right));
    let dist_bottom = seg.distance_to_segment(&LineSegment::new(bottom_left, bottom_right));
    let dist_left = seg.distance_to_segment(&LineSegment::new(top_left, bottom_left));
    let dist_right = seg.distance_to_segment(&LineSegment::new(top_right, bottom_right));

    dist_top.min(dist_bottom).min(dist_left.min(dist_right))
}

/// Distance from a point to a bare triangle (no line width applied).
///
/// The three side-line determinants select the region: inside, nearest to a
/// side, or nearest to a vertex. Vertices are counter-clockwise so all
/// determinants are positive for interior points.
fn triangle_distance(p1: Vector2, p2: Vector2, p3: Vector2, v: Vector2) -> f32 {
    let det1 = Vector2::det(p2, p3, v) / p2.distance(p3);
    let det2 = Vector2::det(p3, p1, v) / p3.distance(p1);
    let det3 = Vector2::det(p1, p2, v) / p1.distance(p2);

    // inside: 3 non-negative dets
    if det1 >= 0.0 && det2 >= 0.0 && det3 >= 0.0 {
        return -det1.min(det2.min(det3));
    }
    // nearest to a side: exactly one negative det
    if det1 * det2 * det3 < 0.0 {
        return -det1.min(det2.min(det3));
    }
    // nearest to a corner: exactly one positive det
    if det1 > 0.0 {
        return p1.distance(v);
    }
    if det2 > 0.0 {
        return p2.distance(v);
    }
    if det3 > 0.0 {
        return p3.distance(v);
    }

    // unreachable for well-formed triangles; requires NaN or a degenerate
    // winding
    log::error!(
        "degenerate triangle distance: dets {} {} {}",
        det1,
        det2,
        det3
    );
    p1.distance(v).min(p2.distance(v)).min(p3.distance(v))
}

fn triangle_segment_distance(
    p1: Vector2,
    p2: Vector2,
    p3: Vector2,
    line_width: f32,
    seg: &LineSegment,
) -> f32 {
    let seg1 = LineSegment::new(p1, p2);
    let seg2 = LineSegment::new(p2, p3);
    let seg3 = LineSegment::new(p3, p1);
    let dseg1 = seg1.distance_to_segment(seg);
    let dseg2 = seg2.distance_to_segment(seg);
    let dseg3 = seg3.distance_to_segment(seg);
    // the segment crosses a triangle side
    if dseg1 * dseg2 * dseg3 == 0.0 {
        return 0.0;
    }

    // the segment lies entirely inside the triangle
    let dstart = triangle_distance(p1, p2, p3, seg.start()) - line_width;
    let dend = triangle_distance(p1, p2, p3, seg.end()) - line_width;
    if dstart < 0.0 && dend < 0.0 {
        return 0.0;
    }

    // entirely outside
    (dseg1.min(dseg2.min(dseg3)) - line_width).max(0.0)
}

/// A moving obstacle: position is parametric in time, valid on a window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MovingObstacle {
    Circle(MovingCircle),
    Line(MovingLine),
}

impl MovingObstacle {
    pub fn priority(&self) -> i32 {
        match self {
            MovingObstacle::Circle(c) => c.prio,
            MovingObstacle::Line(l) => l.prio,
        }
    }

    pub fn intersects(&self, pos: Vector2, time: f32) -> bool {
        match self {
            MovingObstacle::Circle(c) => c.intersects(pos, time),
            MovingObstacle::Line(l) => l.intersects(pos, time),
        }
    }

    pub fn distance(&self, pos: Vector2, time: f32) -> f32 {
        match self {
            MovingObstacle::Circle(c) => c.distance(pos, time),
            MovingObstacle::Line(l) => l.distance(pos, time),
        }
    }
}

/// A circle moving with constant acceleration, valid on a time window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovingCircle {
    pub start_pos: Vector2,
    pub speed: Vector2,
    pub acc: Vector2,
    pub start_time: f32,
    pub end_time: f32,
    pub radius: f32,
    pub prio: i32,
}

impl MovingCircle {
    fn center_at(&self, time: f32) -> Vector2 {
        let t = time - self.start_time;
        self.start_pos + self.speed * t + self.acc * (0.5 * t * t)
    }

    pub fn intersects(&self, pos: Vector2, time: f32) -> bool {
        if time < self.start_time || time > self.end_time {
            return false;
        }
        self.center_at(time).distance_squared(pos) < self.radius * self.radius
    }

    pub fn distance(&self, pos: Vector2, time: f32) -> f32 {
        if time < self.start_time || time > self.end_time {
            return f32::MAX;
        }
        self.center_at(time).distance(pos) - self.radius
    }
}

/// A thick line segment whose endpoints move with constant acceleration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MovingLine {
    pub start_pos1: Vector2,
    pub speed1: Vector2,
    pub acc1: Vector2,
    pub start_pos2: Vector2,
    pub speed2: Vector2,
    pub acc2: Vector2,
    pub start_time: f32,
    pub end_time: f32,
    pub width: f32,
    pub prio: i32,
}

impl MovingLine {
    fn segment_at(&self, time: f32) -> LineSegment {
        let t = time - self.start_time;
        let p1 = self.start_pos1 + self.speed1 * t + self.acc1 * (0.5 * t * t);
        let p2 = self.start_pos2 + self.speed2 * t + self.acc2 * (0.5 * t * t);
        LineSegment::new(p1, p2)
    }

    pub fn intersects(&self, pos: Vector2, time: f32) -> bool {
        if time < self.start_time || time > self.end_time {
            return false;
        }
        self.segment_at(time).distance(pos) < self.width
    }

    pub fn distance(&self, pos: Vector2, time: f32) -> f32 {
        if time < self.start_time || time > self.end_time {
            return f32::MAX;
        }
        self.segment_at(time).distance(pos) - self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_circle_distance_sign() {
        let c = Obstacle::circle(Vector2::new(1.0, 0.0), 0.5, 0);
        assert_relative_eq!(c.distance(Vector2::new(3.0, 0.0)), 1.5);
        assert_relative_eq!(c.distance(Vector2::new(1.0, 0.0)), -0.5);
        assert_relative_eq!(c.distance(Vector2::new(1.25, 0.0)), -0.25);
    }

    #[test]
    fn test_rect_distance_regions() {
        let r = Obstacle::rect(Vector2::new(0.0, 0.0), Vector2::new(2.0, 1.0), 0);
        // outside, nearest side
        assert_relative_eq!(r.distance(Vector2::new(1.0, 2.0)), 1.0);
        assert_relative_eq!(r.distance(Vector2::new(-0.5, 0.5)), 0.5);
        // outside, nearest corner
        assert_relative_eq!(r.distance(Vector2::new(3.0, 2.0)), 2.0f32.sqrt());
        // inside: negative distance to nearest side
        assert_relative_eq!(r.distance(Vector2::new(1.0, 0.5)), -0.5);
        assert_relative_eq!(r.distance(Vector2::new(0.25, 0.5)), -0.25);
    }

    #[test]
    fn test_rect_segment_distance() {
        let r = Obstacle::rect(Vector2::new(0.0, 0.0), Vector2::new(1.0, 1.0), 0);
        // endpoint inside
        let inside = LineSegment::new(Vector2::new(0.5, 0.5), Vector2::new(2.0, 2.0));
        assert_relative_eq!(r.distance_to_segment(&inside), 0.0);
        // passing above
        let above = LineSegment::new(Vector2::new(-1.0, 1.5), Vector2::new(2.0, 1.5));
        assert_relative_eq!(r.distance_to_segment(&above), 0.5);
    }

    #[test]
    fn test_triangle_distance_regions() {
        let t = Obstacle::triangle(
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(0.0, 2.0),
            0.0,
            0,
        );
        // inside is negative
        assert!(t.distance(Vector2::new(0.4, 0.4)) < 0.0);
        // nearest to the bottom side
        assert_relative_eq!(t.distance(Vector2::new(1.0, -1.0)), 1.0);
        // nearest to a corner
        assert_relative_eq!(t.distance(Vector2::new(-1.0, -1.0)), 2.0f32.sqrt());
    }

    #[test]
    fn test_triangle_winding_invariance() {
        // clockwise input must produce the same distances
        let ccw = Obstacle::triangle(
            Vector2::new(0.0, 0.0),
            Vector2::new(2.0, 0.0),
            Vector2::new(0.0, 2.0),
            0.0,
            0,
        );
        let cw = Obstacle::triangle(
            Vector2::new(0.0, 0.0),
            Vector2::new(0.0, 2.0),
            Vector2::new(2.0, 0.0),
            0.0,
            0,
        );
        let p = Vector2::new(0.3, 0.3);
        assert_relative_eq!(ccw.distance(p), cw.distance(p));
    }

    #[test]
    fn test_thick_line_distance() {
        let l = Obstacle::thick_line(Vector2::new(0.0, 0.0), Vector2::new(2.0, 0.0), 0.25, 0);
        assert_relative_eq!(l.distance(Vector2::new(1.0, 1.0)), 0.75);
        assert!(l.distance(Vector2::new(1.0, 0.1)) < 0.0);
    }

    #[test]
    fn test_moving_circle_window() {
        let c = MovingCircle {
            start_pos: Vector2::zero(),
            speed: Vector2::new(1.0, 0.0),
            acc: Vector2::zero(),
            start_time: 0.0,
            end_time: 2.0,
            radius: 0.5,
            prio: 1,
        };
        assert!(c.intersects(Vector2::new(1.0, 0.0), 1.0));
        assert!(!c.intersects(Vector2::new(1.0, 0.0), 3.0));
        assert_relative_eq!(c.distance(Vector2::new(2.0, 0.0), 1.0), 0.5);
        assert_eq!(c.distance(Vector2::new(2.0, 0.0), 5.0), f32::MAX);
    }

    #[test]
    fn test_moving_circle_acceleration() {
        let c = MovingCircle {
            start_pos: Vector2::zero(),
            speed: Vector2::zero(),
            acc: Vector2::new(2.0, 0.0),
            start_time: 1.0,
            end_time: 4.0,
            radius: 0.1,
            prio: 1,
        };
        // at t=3: two seconds after start, center at 0.5*2*4 = 4
        assert!(c.intersects(Vector2::new(4.0, 0.0), 3.0));
    }

    #[test]
    fn test_moving_line_uses_both_endpoints() {
        let l = MovingLine {
            start_pos1: Vector2::new(0.0, 0.0),
            speed1: Vector2::new(1.0, 0.0),
            acc1: Vector2::zero(),
            start_pos2: Vector2::new(0.0, 1.0),
            speed2: Vector2::new(1.0, 0.0),
            acc2: Vector2::zero(),
            start_time: 0.0,
            end_time: 2.0,
            width: 0.2,
            prio: 1,
        };
        // at t=1 the segment spans (1,0)-(1,1)
        assert!(l.intersects(Vector2::new(1.1, 0.5), 1.0));
        assert_relative_eq!(l.distance(Vector2::new(2.0, 0.5), 1.0), 0.8);
    }
}
