//! maidan-plan - Acceleration-bounded trajectory planning for the maidan
//! soccer robot controller.
//!
//! # Module layout
//! - [`profile`]    — 1D acceleration-bounded speed profiles
//! - [`trajectory`] — merged 2D trajectories with exponential slow-down
//! - [`alpha_time`] — (time, angle) trajectory parameterization and search
//! - [`obstacle`]   — static and moving obstacle models
//! - [`world`]      — per-frame obstacle context and collision queries
//! - [`sampler`]    — per-request planner: direct / mid-point / end-point /
//!   escape searches
//! - [`precompute`] — optional precomputed sample table
//! - [`rrt`]        — bidirectional RRT fallback over static geometry
//!
//! All positions are meters in field coordinates, speeds in meters per
//! second, times in seconds relative to the request.

pub mod alpha_time;
pub mod error;
pub mod obstacle;
pub mod precompute;
pub mod profile;
pub mod rrt;
pub mod sampler;
pub mod trajectory;
pub mod world;

pub use error::{PlanError, Result};
pub use obstacle::{MovingCircle, MovingLine, MovingObstacle, Obstacle};
pub use rrt::RrtPlanner;
pub use sampler::{PlanRequest, TrajectoryPlanner};
pub use trajectory::Trajectory;
pub use world::{PlanningWorld, WorldConfig};
