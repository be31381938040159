//! Bidirectional RRT path planner over static geometry.
//!
//! Used as the fallback when trajectory search cannot produce a result:
//! two trees rooted at start and end grow toward each other through the
//! static obstacle set. Because the trees are rooted at the endpoints, the
//! search leaves any obstacles covering them before the trees can merge;
//! extension inside an obstacle region is only allowed while the summed
//! obstacle coverage decreases.

use crate::obstacle::Obstacle;
use crate::world::PlanningWorld;
use kiddo::{KdTree, SquaredEuclidean};
use maidan_core::{BoundingBox, LineSegment, Vector2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const STEP_SIZE: f32 = 0.1;
const WAYPOINT_CACHE_SIZE: usize = 200;
const MAX_ITERATIONS: usize = 300;
const EXTEND_MULTI_STEPS: usize = 4;
const TREE_TOUCH_DISTANCE: f32 = 1e-5;

#[derive(Debug, Clone, Copy)]
struct RrtNode {
    pos: Vector2,
    in_obstacle: bool,
    parent: Option<usize>,
}

/// Node arena plus a KD-tree index over the node positions.
struct SearchTree {
    nodes: Vec<RrtNode>,
    kd: KdTree<f32, 2>,
}

impl SearchTree {
    fn new(root: Vector2, in_obstacle: bool) -> Self {
        let mut kd: KdTree<f32, 2> = KdTree::new();
        kd.add(&[root.x, root.y], 0);
        Self {
            nodes: vec![RrtNode {
                pos: root,
                in_obstacle,
                parent: None,
            }],
            kd,
        }
    }

    fn nearest(&self, p: Vector2) -> usize {
        self.kd.nearest_one::<SquaredEuclidean>(&[p.x, p.y]).item as usize
    }

    fn insert(&mut self, pos: Vector2, in_obstacle: bool, parent: usize) -> usize {
        let index = self.nodes.len();
        self.kd.add(&[pos.x, pos.y], index as u64);
        self.nodes.push(RrtNode {
            pos,
            in_obstacle,
            parent: Some(parent),
        });
        index
    }

    #[inline]
    fn position(&self, index: usize) -> Vector2 {
        self.nodes[index].pos
    }

    #[inline]
    fn in_obstacle(&self, index: usize) -> bool {
        self.nodes[index].in_obstacle
    }

    #[inline]
    fn parent(&self, index: usize) -> Option<usize> {
        self.nodes[index].parent
    }
}

/// The RRT path planner. Keeps a waypoint cache across frames to seed
/// subsequent searches in a slowly changing world.
pub struct RrtPlanner {
    rng: StdRng,
    p_dest: f32,
    p_wp: f32,
    step_size: f32,
    waypoints: Vec<Vector2>,
    seed_targets: Vec<Vector2>,
    sample_rect: BoundingBox,
}

impl RrtPlanner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            p_dest: 0.1,
            p_wp: 0.4,
            step_size: STEP_SIZE,
            waypoints: Vec::new(),
            seed_targets: Vec::new(),
            sample_rect: BoundingBox::new(Vector2::zero(), Vector2::zero()),
        }
    }

    /// Probability of sampling the other tree's root / a cached waypoint.
    pub fn set_probabilities(&mut self, p_dest: f32, p_wp: f32) {
        self.p_dest = p_dest;
        self.p_wp = p_wp;
    }

    /// Additional straight-line seeds rastered into the start tree.
    pub fn add_seed_target(&mut self, pos: Vector2) {
        self.seed_targets.push(pos);
    }

    pub fn reset(&mut self) {
        self.waypoints.clear();
        self.seed_targets.clear();
    }

    /// Find a geometric path from start to end through the static
    /// obstacles of `world`. The result starts at `start`; the endpoint is
    /// as close to `end` as the search got.
    pub fn find_path(&mut self, world: &PlanningWorld, start: Vector2, end: Vector2) -> Vec<Vector2> {
        let radius = world.radius();
        let obstacles: Vec<&Obstacle> = world.obstacles().iter().collect();

        // symmetric sampling around the midpoint, covering the whole field
        let middle = (start + end) * 0.5;
        let boundary = world.boundary();
        let x_half = (middle.x - boundary.min.x).max(boundary.max.x - middle.x);
        let y_half = (middle.y - boundary.min.y).max(boundary.max.y - middle.y);
        self.sample_rect = BoundingBox::new(
            Vector2::new(middle.x - x_half, middle.y - y_half),
            Vector2::new(middle.x + x_half, middle.y + y_half),
        );

        let starting_in_obstacle = !world.test_point(start, radius, &obstacles);
        let ending_in_obstacle = !world.test_point(end, radius, &obstacles);

        let mut tree_start = SearchTree::new(start, starting_in_obstacle);
        let mut tree_end = SearchTree::new(end, ending_in_obstacle);

        let mut path_completed = false;
        // shortcuts only apply when neither endpoint is covered
        if !starting_in_obstacle && !ending_in_obstacle {
            if start == end {
                path_completed = true;
            } else if world.test_segment(&LineSegment::new(start, end), radius, &obstacles) {
                path_completed = true;
                let nearest = tree_start.nearest(start);
                self.raster_path(
                    world,
                    &obstacles,
                    &mut tree_start,
                    &LineSegment::new(start, end),
                    nearest,
                );
            }
        }

        if !path_completed && !self.seed_targets.is_empty() {
            let seed_targets = self.seed_targets.clone();
            for seed_target in seed_targets {
                let nearest = tree_start.nearest(start);
                self.raster_path(
                    world,
                    &obstacles,
                    &mut tree_start,
                    &LineSegment::new(start, seed_target),
                    nearest,
                );
            }
        }

        // grow both trees toward each other; roles alternate every round
        let mut merger_pos: Option<Vector2> = None;
        let mut start_tree_is_a = true;
        for _iteration in 1..MAX_ITERATIONS {
            if path_completed {
                break;
            }
            let target_root = if start_tree_is_a { end } else { start };
            let target = self.get_target(target_root);

            let (tree_a, tree_b) = if start_tree_is_a {
                (&mut tree_start, &mut tree_end)
            } else {
                (&mut tree_end, &mut tree_start)
            };

            let nearest_a = tree_a.nearest(target);
            let extended_a =
                extend(world, &obstacles, tree_a, nearest_a, target, radius, self.step_size);

            if let Some(new_node) = extended_a {
                // pull the other tree toward the fresh node
                let target = tree_a.position(new_node);
                let mut node = Some(tree_b.nearest(target));
                for _ in 0..EXTEND_MULTI_STEPS {
                    let Some(from) = node else { break };
                    node = extend(world, &obstacles, tree_b, from, target, radius, self.step_size);
                    let Some(extended) = node else { break };

                    let extended_pos = tree_b.position(extended);
                    if extended_pos.distance(target) <= TREE_TOUCH_DISTANCE
                        && !tree_b.in_obstacle(extended)
                    {
                        path_completed = true;
                        merger_pos = Some(extended_pos);
                        break;
                    }
                }
            }
            start_tree_is_a = !start_tree_is_a;
        }

        // walk the start tree back from the merge point (or the node
        // closest to the target if the trees never met)
        let (mid, mut nearest_node) = match merger_pos {
            Some(pos) => (pos, Some(tree_start.nearest(pos))),
            None => {
                let nearest = tree_start.nearest(end);
                (tree_start.position(nearest), Some(nearest))
            }
        };

        let mut points: Vec<Vector2> = Vec::new();
        {
            let mut inverse_points = Vec::new();
            let mut node = nearest_node;
            while let Some(n) = node {
                inverse_points.push(tree_start.position(n));
                node = tree_start.parent(n);
            }
            points.extend(inverse_points.into_iter().rev());
        }

        nearest_node = Some(tree_end.nearest(mid));
        if merger_pos.is_some() {
            // traverse the end tree, skipping the merger node, until an
            // obstacle-covered node is reached
            nearest_node = nearest_node.and_then(|n| tree_end.parent(n));
            while let Some(n) = nearest_node {
                if tree_end.in_obstacle(n) {
                    break;
                }
                points.push(tree_end.position(n));
                nearest_node = tree_end.parent(n);
            }
            // get as close to the target as possible if it is not reached
            if let Some(n) = nearest_node {
                if let Some(&line_start) = points.last() {
                    let best_pos = find_valid_point(
                        world,
                        &obstacles,
                        &LineSegment::new(line_start, tree_end.position(n)),
                        radius,
                    );
                    if line_start != best_pos
                        && world.point_in_playfield(best_pos, radius)
                        && world.test_segment(
                            &LineSegment::new(line_start, best_pos),
                            radius,
                            &obstacles,
                        )
                    {
                        points.push(best_pos);
                    }
                }
            }
        }

        // don't keep more waypoints for a longer path
        let normalized_waypoint_count = (start.distance(end) * 1.05 / self.step_size).ceil();
        let keep_probability = if points.is_empty() {
            0.0
        } else {
            (normalized_waypoint_count / points.len() as f32).clamp(0.0, 1.0)
        };
        for i in 0..points.len() {
            if self.rng.random_range(0.0..1.0f32) <= keep_probability {
                self.add_to_waypoint_cache(points[i]);
            }
        }
        // the remaining (covered) end tree nodes still make useful seeds
        while let Some(n) = nearest_node {
            self.add_to_waypoint_cache(tree_end.position(n));
            nearest_node = tree_end.parent(n);
        }

        // cut corners several times
        for _ in 0..3 {
            simplify(world, &obstacles, &mut points, radius);
            cut_corners(world, &obstacles, &mut points, radius);
        }
        simplify(world, &obstacles, &mut points, radius);

        points
    }

    fn raster_path(
        &mut self,
        world: &PlanningWorld,
        obstacles: &[&Obstacle],
        tree: &mut SearchTree,
        segment: &LineSegment,
        mut last_node: usize,
    ) {
        // assumes the collision check for the segment was successful
        let steps = (segment.start().distance(segment.end()) / self.step_size).ceil() as usize;
        for _ in 0..steps {
            match extend(
                world,
                obstacles,
                tree,
                last_node,
                segment.end(),
                world.radius(),
                self.step_size,
            ) {
                Some(node) => last_node = node,
                None => return,
            }
        }
    }

    fn get_target(&mut self, end: Vector2) -> Vector2 {
        let p = self.rng.random_range(0.0..1.0f32);
        if p < self.p_dest {
            end
        } else if p < self.p_dest + self.p_wp && !self.waypoints.is_empty() {
            self.waypoints[self.rng.random_range(0..self.waypoints.len())]
        } else {
            self.random_state()
        }
    }

    fn random_state(&mut self) -> Vector2 {
        Vector2::new(
            self.rng
                .random_range(self.sample_rect.min.x..=self.sample_rect.max.x),
            self.rng
                .random_range(self.sample_rect.min.y..=self.sample_rect.max.y),
        )
    }

    fn add_to_waypoint_cache(&mut self, pos: Vector2) {
        if self.waypoints.len() < WAYPOINT_CACHE_SIZE {
            self.waypoints.push(pos);
        } else {
            // reservoir: replace uniformly at random once full
            let index = self.rng.random_range(0..WAYPOINT_CACHE_SIZE);
            self.waypoints[index] = pos;
        }
    }
}

/// How deep the robot sits inside the given obstacles, summed and capped
/// at twice the robot radius per obstacle.
fn obstacle_coverage(v: Vector2, obstacles: &[&Obstacle], robot_radius: f32) -> f32 {
    let mut d_sum = 0.0;
    for o in obstacles {
        let d = o.distance(v) - robot_radius;
        if d < 0.0 {
            d_sum += (2.0 * robot_radius).min(-d);
        }
    }
    d_sum
}

/// Movement check while standing inside obstacles: the coverage by the
/// start obstacle set must decrease monotonically along the segment, and
/// no other obstacle of at least the same priority may be entered.
fn check_movement_relative_to_obstacles(
    world: &PlanningWorld,
    obstacles: &[&Obstacle],
    segment: &LineSegment,
    radius: f32,
) -> bool {
    let p = segment.start();
    let step = segment.end() - segment.start();
    let l = step.length();

    if l == 0.0 {
        return false;
    }

    // only allow moving further into the field
    if world.outside_playfield_coverage(segment.end(), radius)
        > world.outside_playfield_coverage(segment.start(), radius)
    {
        return false;
    }

    // the start obstacle set keeps only the highest priority; leaving a
    // high priority obstacle through a lower priority one is allowed
    let mut max_obstacle_prio = -1;
    for o in obstacles {
        if o.distance(p) < radius && o.priority() > max_obstacle_prio {
            max_obstacle_prio = o.priority();
        }
    }
    let start_obstacles: Vec<&Obstacle> = obstacles
        .iter()
        .filter(|o| o.distance(p) < radius && o.priority() == max_obstacle_prio)
        .copied()
        .collect();
    let other_obstacles: Vec<&Obstacle> = obstacles
        .iter()
        .filter(|o| o.distance(p) >= radius && o.priority() >= max_obstacle_prio)
        .copied()
        .collect();

    if start_obstacles.len() == 1 {
        let step_size = 1e-3f32.min(l);
        let step = step * (step_size / l);

        // the obstacle is convex and inside distance is the distance to the
        // border, so the coverage at the start decreases iff the obstacle
        // is being left
        let start_d_sum = obstacle_coverage(p, &start_obstacles, radius);
        let step_d_sum = obstacle_coverage(p + step, &start_obstacles, radius);
        if step_d_sum > start_d_sum {
            return false;
        }
    } else if start_obstacles.len() > 1 {
        let mut step_size = 2e-3;
        let num_steps = (l / step_size).ceil() as usize;
        step_size = l / num_steps as f32;
        let step = if l > step_size {
            step * (step_size / l)
        } else {
            step
        };

        // the coverage is capped per obstacle, so a fully covered robot can
        // swing between the covering obstacles while the sum stays equal
        let mut last_d_sum = f32::INFINITY;
        let mut point = p;
        for i in 0..=num_steps {
            let d_sum = obstacle_coverage(point, &start_obstacles, radius);
            if d_sum > last_d_sum {
                return false;
            } else if d_sum == 0.0 && i < num_steps {
                if !world.test_segment(
                    &LineSegment::new(point, segment.end()),
                    radius,
                    &start_obstacles,
                ) {
                    return false;
                }
                break;
            }
            last_d_sum = d_sum;
            point += step;
        }
    }
    // new obstacles must not be entered
    world.test_segment(segment, radius, &other_obstacles)
}

fn extend(
    world: &PlanningWorld,
    obstacles: &[&Obstacle],
    tree: &mut SearchTree,
    from_node: usize,
    to: Vector2,
    radius: f32,
    step_size: f32,
) -> Option<usize> {
    let from = tree.position(from_node);
    let in_obstacle = tree.in_obstacle(from_node);
    let mut d = to - from;
    let l = d.length();
    if l == 0.0 {
        // point already reached
        return None;
    } else if l > step_size {
        d *= step_size / l;
    }

    let extended = from + d;

    let success = if in_obstacle {
        // the new point is only valid if it is farther away from the
        // obstacles than right now
        check_movement_relative_to_obstacles(
            world,
            obstacles,
            &LineSegment::new(from, extended),
            radius,
        )
    } else {
        world.point_in_playfield(extended, radius)
            && world.test_segment(&LineSegment::new(from, extended), radius, obstacles)
    };

    if !success {
        return None;
    }

    // once every obstacle was left, re-entering one is impossible, so the
    // flag only needs to be recomputed while still covered
    let new_in_obstacle = in_obstacle && !world.test_point(extended, radius, obstacles);
    Some(tree.insert(extended, new_in_obstacle, from_node))
}

/// Binary search along the segment for the last point still reachable from
/// its start.
fn find_valid_point(
    world: &PlanningWorld,
    obstacles: &[&Obstacle],
    segment: &LineSegment,
    radius: f32,
) -> Vector2 {
    let line_start = segment.start();
    let mut start = line_start;
    let mut end = segment.end();
    let mut dist = start.distance(end);

    while dist > 0.001 {
        let mid = (end + start) * 0.5;
        if world.point_in_playfield(mid, radius)
            && world.test_segment(&LineSegment::new(line_start, mid), radius, obstacles)
        {
            start = mid;
        } else {
            end = mid;
        }
        dist /= 2.0;
    }

    (start + end) * 0.5
}

/// Multi-pass shortcutting: drop interior points while the connecting
/// segments stay collision free. Points before `split` are still inside
/// the start obstacles and use the obstacle-relative movement rule.
fn simplify(world: &PlanningWorld, obstacles: &[&Obstacle], points: &mut Vec<Vector2>, radius: f32) {
    // every point before this index is inside the start obstacles
    let mut split = points.len();
    for (i, point) in points.iter().enumerate() {
        if world.test_point(*point, radius, obstacles) {
            split = i;
            break;
        }
    }

    let mut start_index = 0;
    while start_index < points.len() {
        let mut end_index = points.len().saturating_sub(1);
        while end_index > start_index + 1 {
            // common points in start and end tree, remove everything in
            // between
            if points[start_index] == points[end_index] {
                split -= (split.saturating_sub(start_index)).min(end_index - start_index);
                points.drain(start_index..end_index);
                break;
            }
            let seg = LineSegment::new(points[start_index], points[end_index]);
            let passable = if start_index < split {
                check_movement_relative_to_obstacles(world, obstacles, &seg, radius)
            } else {
                world.test_segment(&seg, radius, obstacles)
            };
            if passable {
                split -= (split.saturating_sub(start_index + 1)).min(end_index - start_index - 1);
                points.drain(start_index + 1..end_index);
                break;
            }
            end_index -= 1;
        }
        start_index += 1;
    }
}

/// Cut each interior corner symmetrically as far as a binary search finds
/// collision-free chords.
fn cut_corners(world: &PlanningWorld, obstacles: &[&Obstacle], points: &mut Vec<Vector2>, radius: f32) {
    let mut i = 1;
    while i + 1 < points.len() {
        let left = points[i - 1];
        let mid = points[i];
        let right = points[i + 1];

        let diff_left = left - mid;
        let diff_right = right - mid;
        let mut step = diff_left.length().min(diff_right.length());
        let diff_left = diff_left.normalized();
        let diff_right = diff_right.normalized();

        // start in the middle of [0, step]; pretend a binary search works
        // even though there may be multiple separate valid ranges
        step /= 2.0;
        let mut dist = step;
        let mut last_good = 0.0;
        while step > 0.01 {
            let line = LineSegment::new(mid + diff_left * dist, mid + diff_right * dist);
            step /= 2.0;
            // only obstacles matter here, paths into the playfield may be
            // smoothed as well
            if world.test_segment(&line, radius, obstacles) {
                last_good = dist;
                dist += step;
            } else {
                dist -= step;
            }
        }

        if last_good > 0.0 {
            points[i] = mid + diff_left * last_good;
            i += 1;
            points.insert(i, mid + diff_right * last_good);
        }
        i += 1;
    }
}
