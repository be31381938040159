//! Line segments with distance queries.

use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

/// A line segment between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineSegment {
    start: Vector2,
    end: Vector2,
}

impl LineSegment {
    pub fn new(start: Vector2, end: Vector2) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn start(&self) -> Vector2 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> Vector2 {
        self.end
    }

    /// Point on the segment closest to `p`.
    pub fn closest_point(&self, p: Vector2) -> Vector2 {
        let dir = self.end - self.start;
        let len_sq = dir.length_squared();
        if len_sq == 0.0 {
            return self.start;
        }
        let t = ((p - self.start).dot(dir) / len_sq).clamp(0.0, 1.0);
        self.start + dir * t
    }

    /// Distance from the segment to a point.
    pub fn distance(&self, p: Vector2) -> f32 {
        self.closest_point(p).distance(p)
    }

    /// Minimum distance between two segments; zero if they intersect.
    pub fn distance_to_segment(&self, other: &LineSegment) -> f32 {
        if self.intersects(other) {
            return 0.0;
        }
        self.distance(other.start)
            .min(self.distance(other.end))
            .min(other.distance(self.start))
            .min(other.distance(self.end))
    }

    /// Whether the two segments properly intersect or touch.
    pub fn intersects(&self, other: &LineSegment) -> bool {
        let d1 = Vector2::det(other.start, other.end, self.start);
        let d2 = Vector2::det(other.start, other.end, self.end);
        let d3 = Vector2::det(self.start, self.end, other.start);
        let d4 = Vector2::det(self.start, self.end, other.end);

        if ((d1 > 0.0) != (d2 > 0.0)) && ((d3 > 0.0) != (d4 > 0.0)) {
            return true;
        }

        // collinear touching cases
        (d1 == 0.0 && on_segment(other.start, other.end, self.start))
            || (d2 == 0.0 && on_segment(other.start, other.end, self.end))
            || (d3 == 0.0 && on_segment(self.start, self.end, other.start))
            || (d4 == 0.0 && on_segment(self.start, self.end, other.end))
    }
}

fn on_segment(a: Vector2, b: Vector2, p: Vector2) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}
