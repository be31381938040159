//! 2D vector type used for positions, velocities and accelerations.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// A 2D vector in meters (or meters per second, depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// The zero vector.
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// Euclidean length.
    #[inline]
    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Squared length (avoids sqrt).
    #[inline]
    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Distance to another vector.
    #[inline]
    pub fn distance(&self, other: Vector2) -> f32 {
        (*self - other).length()
    }

    /// Squared distance to another vector.
    #[inline]
    pub fn distance_squared(&self, other: Vector2) -> f32 {
        (*self - other).length_squared()
    }

    /// Dot product.
    #[inline]
    pub fn dot(&self, other: Vector2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// The perpendicular vector, rotated clockwise.
    #[inline]
    pub fn perpendicular(&self) -> Vector2 {
        Vector2::new(self.y, -self.x)
    }

    /// Bearing of this vector measured from the positive y axis, in radians.
    ///
    /// Chosen so that a trajectory angle alpha maps onto axis shares as
    /// `(sin(alpha), cos(alpha))`: a vector pointing along +y has angle 0.
    #[inline]
    pub fn angle(&self) -> f32 {
        self.x.atan2(self.y)
    }

    /// Unit vector in the same direction, or zero for the zero vector.
    #[inline]
    pub fn normalized(&self) -> Vector2 {
        let len = self.length();
        if len > 0.0 { *self / len } else { Vector2::zero() }
    }

    /// Per-component absolute value.
    #[inline]
    pub fn abs(&self) -> Vector2 {
        Vector2::new(self.x.abs(), self.y.abs())
    }

    /// Signed area of the triangle (a, b, c), twice.
    ///
    /// Positive when c lies left of the line a -> b.
    #[inline]
    pub fn det(a: Vector2, b: Vector2, c: Vector2) -> f32 {
        (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
    }
}

impl Add for Vector2 {
    type Output = Vector2;
    #[inline]
    fn add(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vector2 {
    type Output = Vector2;
    #[inline]
    fn sub(self, rhs: Vector2) -> Vector2 {
        Vector2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Vector2 {
    type Output = Vector2;
    #[inline]
    fn neg(self) -> Vector2 {
        Vector2::new(-self.x, -self.y)
    }
}

impl Mul<f32> for Vector2 {
    type Output = Vector2;
    #[inline]
    fn mul(self, rhs: f32) -> Vector2 {
        Vector2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vector2 {
    type Output = Vector2;
    #[inline]
    fn div(self, rhs: f32) -> Vector2 {
        Vector2::new(self.x / rhs, self.y / rhs)
    }
}

impl AddAssign for Vector2 {
    #[inline]
    fn add_assign(&mut self, rhs: Vector2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vector2 {
    #[inline]
    fn sub_assign(&mut self, rhs: Vector2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vector2 {
    #[inline]
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_length_and_distance() {
        let a = Vector2::new(3.0, 4.0);
        assert_relative_eq!(a.length(), 5.0);
        assert_relative_eq!(a.length_squared(), 25.0);
        assert_relative_eq!(Vector2::zero().distance(a), 5.0);
    }

    #[test]
    fn test_normalized() {
        let a = Vector2::new(0.0, -2.0);
        let n = a.normalized();
        assert_relative_eq!(n.x, 0.0);
        assert_relative_eq!(n.y, -1.0);
        assert_eq!(Vector2::zero().normalized(), Vector2::zero());
    }

    #[test]
    fn test_perpendicular_is_orthogonal() {
        let a = Vector2::new(1.5, -0.7);
        assert_relative_eq!(a.dot(a.perpendicular()), 0.0);
    }

    #[test]
    fn test_angle_convention() {
        // +y axis is angle zero, +x axis is pi/2
        assert_relative_eq!(Vector2::new(0.0, 1.0).angle(), 0.0);
        assert_relative_eq!(Vector2::new(1.0, 0.0).angle(), FRAC_PI_2);
        assert_relative_eq!(Vector2::new(0.0, -1.0).angle().abs(), PI);
    }

    #[test]
    fn test_det_orientation() {
        let a = Vector2::new(0.0, 0.0);
        let b = Vector2::new(1.0, 0.0);
        // above the line a->b is left (positive)
        assert!(Vector2::det(a, b, Vector2::new(0.5, 1.0)) > 0.0);
        assert!(Vector2::det(a, b, Vector2::new(0.5, -1.0)) < 0.0);
        assert_relative_eq!(Vector2::det(a, b, Vector2::new(2.0, 0.0)), 0.0);
    }
}
