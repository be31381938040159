//! Axis-aligned bounding boxes.

use crate::vector::Vector2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box spanned by two corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vector2,
    pub max: Vector2,
}

impl BoundingBox {
    /// Box spanning the two given points (in any order).
    pub fn new(a: Vector2, b: Vector2) -> Self {
        Self {
            min: Vector2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vector2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Grow the box to contain `p`.
    pub fn merge_point(&mut self, p: Vector2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    pub fn contains(&self, p: Vector2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_point_expands() {
        let mut bb = BoundingBox::new(Vector2::zero(), Vector2::zero());
        bb.merge_point(Vector2::new(1.0, -2.0));
        bb.merge_point(Vector2::new(-0.5, 3.0));
        assert_eq!(bb.min, Vector2::new(-0.5, -2.0));
        assert_eq!(bb.max, Vector2::new(1.0, 3.0));
        assert!(bb.contains(Vector2::new(0.0, 0.0)));
        assert!(!bb.contains(Vector2::new(2.0, 0.0)));
    }
}
