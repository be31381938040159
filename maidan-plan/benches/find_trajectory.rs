//! Benchmarks for the alpha-time trajectory search and the planner
//! pipeline.
//!
//! Run with: `cargo bench -p maidan-plan`

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use maidan_core::Vector2;
use maidan_plan::sampler::{PlanRequest, TrajectoryPlanner};
use maidan_plan::world::WorldConfig;
use maidan_plan::{Obstacle, alpha_time};

fn bench_find_trajectory(c: &mut Criterion) {
    c.bench_function("find_trajectory_straight", |b| {
        b.iter(|| {
            alpha_time::find_trajectory(
                black_box(Vector2::zero()),
                black_box(Vector2::zero()),
                black_box(Vector2::new(2.0, 1.0)),
                black_box(Vector2::zero()),
                3.0,
                3.0,
                0.0,
                false,
                false,
            )
        })
    });

    c.bench_function("find_trajectory_moving_start", |b| {
        b.iter(|| {
            alpha_time::find_trajectory(
                black_box(Vector2::zero()),
                black_box(Vector2::new(1.5, -0.5)),
                black_box(Vector2::new(-1.0, 2.0)),
                black_box(Vector2::new(0.5, 0.5)),
                3.0,
                3.0,
                0.0,
                false,
                true,
            )
        })
    });
}

fn bench_planner(c: &mut Criterion) {
    let mut request = PlanRequest {
        s0: Vector2::zero(),
        v0: Vector2::zero(),
        s1: Vector2::new(2.0, 0.0),
        v1: Vector2::zero(),
        max_speed: 3.0,
        acceleration: 3.0,
        allow_slow_down: true,
        obstacles: Vec::new(),
        moving_obstacles: Vec::new(),
    };
    request
        .obstacles
        .push(Obstacle::circle(Vector2::new(1.0, 0.0), 0.2, 1));

    c.bench_function("plan_around_obstacle", |b| {
        let mut planner = TrajectoryPlanner::new(1, &WorldConfig::default());
        b.iter(|| black_box(planner.plan(&request)))
    });
}

criterion_group!(benches, bench_find_trajectory, bench_planner);
criterion_main!(benches);
