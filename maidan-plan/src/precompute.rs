//! Precomputed trajectory samples.
//!
//! The sampler can load a table of normalized (time, angle, mid-speed)
//! tuples bucketed by request distance. At runtime each tuple is rotated
//! into the start-to-goal frame and replaces the online random search for
//! the matching distance bucket. A missing file is not an error; the
//! planner falls back to pure online sampling.

use crate::error::Result;
use maidan_core::{math::normalize_angle_positive, Vector2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One normalized mid-point sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PrecomputedSample {
    pub time: f32,
    pub angle: f32,
    pub mid_speed_x: f32,
    pub mid_speed_y: f32,
}

/// Samples valid for requests whose distance lies in [min, max].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecomputationSegment {
    pub min_distance: f32,
    pub max_distance: f32,
    pub samples: Vec<PrecomputedSample>,
}

/// The full precomputation table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplerPrecomputation {
    pub segments: Vec<PrecomputationSegment>,
}

impl SamplerPrecomputation {
    /// Load a table from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// The segment covering the given request distance, if any.
    pub fn segment_for(&self, distance: f32) -> Option<&PrecomputationSegment> {
        self.segments
            .iter()
            .find(|s| s.min_distance <= distance && s.max_distance >= distance)
    }
}

impl PrecomputedSample {
    /// Rotate the normalized sample into the start-to-goal frame.
    ///
    /// Normalized samples are stored with the goal direction along x; the
    /// mid speed and angle are rotated by the actual goal bearing.
    pub fn denormalize(&self, s0: Vector2, s1: Vector2) -> (f32, f32, Vector2) {
        let to_target = (s1 - s0).normalized();
        let sideways = to_target.perpendicular();
        let mid_speed = to_target * self.mid_speed_x + sideways * self.mid_speed_y;
        let angle = normalize_angle_positive(self.angle + to_target.angle());
        (self.time, angle, mid_speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_segment_lookup() {
        let table = SamplerPrecomputation {
            segments: vec![
                PrecomputationSegment {
                    min_distance: 0.0,
                    max_distance: 1.0,
                    samples: vec![],
                },
                PrecomputationSegment {
                    min_distance: 1.0,
                    max_distance: 3.0,
                    samples: vec![],
                },
            ],
        };
        assert_relative_eq!(table.segment_for(0.5).unwrap().max_distance, 1.0);
        assert_relative_eq!(table.segment_for(2.0).unwrap().max_distance, 3.0);
        assert!(table.segment_for(5.0).is_none());
    }

    #[test]
    fn test_denormalize_rotates_with_goal() {
        let sample = PrecomputedSample {
            time: 0.5,
            angle: 0.0,
            mid_speed_x: 1.0,
            mid_speed_y: 0.0,
        };
        // goal along +x: mid speed points at the goal
        let (time, _, mid) = sample.denormalize(Vector2::zero(), Vector2::new(2.0, 0.0));
        assert_relative_eq!(time, 0.5);
        assert_relative_eq!(mid.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(mid.y, 0.0, epsilon = 1e-6);

        // goal along +y
        let (_, _, mid) = sample.denormalize(Vector2::zero(), Vector2::new(0.0, 2.0));
        assert_relative_eq!(mid.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(mid.y, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let table = SamplerPrecomputation {
            segments: vec![PrecomputationSegment {
                min_distance: 0.0,
                max_distance: 2.0,
                samples: vec![PrecomputedSample {
                    time: 0.3,
                    angle: 1.0,
                    mid_speed_x: 0.5,
                    mid_speed_y: -0.5,
                }],
            }],
        };
        let text = serde_yaml::to_string(&table).unwrap();
        let parsed: SamplerPrecomputation = serde_yaml::from_str(&text).unwrap();
        assert_eq!(parsed.segments.len(), 1);
        assert_eq!(parsed.segments[0].samples.len(), 1);
    }
}
