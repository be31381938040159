//! Angle normalization and angular arithmetic.

use std::f32::consts::PI;

/// Normalize an angle to [0, 2π).
#[inline]
pub fn normalize_angle_positive(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a < 0.0 {
        a += 2.0 * PI;
    }
    a
}

/// Normalize an angle to [-π, π).
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % (2.0 * PI);
    if a >= PI {
        a -= 2.0 * PI;
    } else if a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Signed difference `a - b`, normalized to [-π, π).
#[inline]
pub fn angle_diff(a: f32, b: f32) -> f32 {
    normalize_angle(a - b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize_positive() {
        assert_relative_eq!(normalize_angle_positive(0.0), 0.0);
        assert_relative_eq!(normalize_angle_positive(-PI / 2.0), 1.5 * PI);
        assert_relative_eq!(normalize_angle_positive(2.5 * PI), 0.5 * PI, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_signed() {
        assert_relative_eq!(normalize_angle(PI), -PI);
        assert_relative_eq!(normalize_angle(3.0 * PI), -PI, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(-0.5), -0.5);
    }

    #[test]
    fn test_angle_diff_shortest_path() {
        assert_relative_eq!(angle_diff(0.1, -0.1), 0.2, epsilon = 1e-6);
        // crossing the 0/2pi boundary takes the short way
        assert_relative_eq!(
            angle_diff(0.05, 2.0 * PI - 0.05),
            0.1,
            epsilon = 1e-6
        );
    }
}
