//! Pairwise shape physics: forces, collisions and color blending
//!
//! The shape set is small (single digits), so forces and blending are plain
//! O(n^2) passes. Collisions go through the uniform grid.

use glam::Vec3;
use rand::Rng;

use crate::color::{self, Color};
use crate::config::SimulationConfig;
use crate::scheduler::Scheduler;
use crate::shapes::Shape;
use crate::spatial_grid::SpatialGrid;

/// Reported once per colliding pair per pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollisionEvent {
    pub a: usize,
    pub b: usize,
    /// Midpoint of the two centers after separation
    pub point: Vec3,
}

/// Mutable borrow of two distinct elements.
fn pair_mut<T>(items: &mut [T], i: usize, j: usize) -> (&mut T, &mut T) {
    debug_assert!(i != j);
    if i < j {
        let (lo, hi) = items.split_at_mut(j);
        (&mut lo[i], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(i);
        (&mut hi[0], &mut lo[j])
    }
}

// ============================================================================
// Forces
// ============================================================================

/// Attract pairs inside the attraction band, repel pairs inside the
/// repulsion radius. Both fall off linearly to zero at their radius.
pub fn apply_forces(shapes: &mut [Shape], cfg: &SimulationConfig) {
    let ic = &cfg.interaction;
    for i in 0..shapes.len() {
        for j in i + 1..shapes.len() {
            let (a, b) = pair_mut(shapes, i, j);
            if !a.is_active() || !b.is_active() {
                continue;
            }
            let delta = b.pos - a.pos;
            let distance = delta.length();
            if distance == 0.0 {
                continue;
            }
            let dir = delta / distance;

            if distance > ic.repulsion_radius && distance < ic.attraction_radius {
                let force = ic.attraction_force * (1.0 - distance / ic.attraction_radius);
                a.vel += dir * force;
                b.vel -= dir * force;
            } else if distance <= ic.repulsion_radius {
                let force = ic.repulsion_force * (1.0 - distance / ic.repulsion_radius);
                a.vel -= dir * force;
                b.vel += dir * force;
            }
        }
    }
}

// ============================================================================
// Collisions
// ============================================================================

pub struct CollisionHandler {
    grid: SpatialGrid,
    candidates: Vec<usize>,
}

impl CollisionHandler {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            candidates: Vec::new(),
        }
    }

    /// Resolve overlapping pairs with an equal-mass elastic impulse and
    /// positional separation, then flash both shapes and report the pair.
    pub fn handle_collisions(
        &mut self,
        shapes: &mut [Shape],
        now_ms: f64,
        scheduler: &mut Scheduler,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
        mut on_collide: impl FnMut(CollisionEvent),
    ) -> usize {
        let ic = &cfg.interaction;
        if self.grid.cell_size() != ic.collision_grid_size {
            self.grid.set_cell_size(ic.collision_grid_size);
        }
        self.grid.clear();
        for (index, shape) in shapes.iter().enumerate() {
            if shape.is_active() {
                self.grid.insert(index, shape.pos);
            }
        }

        let mut collisions = 0;
        for i in 0..shapes.len() {
            if !shapes[i].is_active() {
                continue;
            }
            self.candidates.clear();
            self.grid.neighbors(shapes[i].pos, &mut self.candidates);

            for c in 0..self.candidates.len() {
                let j = self.candidates[c];
                // Each unordered pair once.
                if j <= i {
                    continue;
                }
                let (a, b) = pair_mut(shapes, i, j);
                if !a.is_active() || !b.is_active() {
                    continue;
                }
                let delta = b.pos - a.pos;
                let distance = delta.length();
                let reach = a.radius + b.radius;
                if distance >= reach {
                    continue;
                }

                resolve_collision(a, b, delta, distance, ic.max_collision_velocity);

                a.color = color::random_cyberpunk_color(rng);
                b.color = color::random_cyberpunk_color(rng);
                a.trigger_collision_visuals(now_ms, scheduler, cfg);
                b.trigger_collision_visuals(now_ms, scheduler, cfg);

                collisions += 1;
                on_collide(CollisionEvent {
                    a: i,
                    b: j,
                    point: (a.pos + b.pos) * 0.5,
                });
            }
        }
        collisions
    }
}

/// Velocity and position response for one overlapping pair.
///
/// `delta` points from `a` to `b`. Coincident centers have no normal and
/// are separated along +X.
pub fn resolve_collision(a: &mut Shape, b: &mut Shape, delta: Vec3, distance: f32, max_velocity: f32) {
    let normal = if distance > 0.0 { delta / distance } else { Vec3::X };

    // Negative when the pair is closing.
    let vn = (b.vel - a.vel).dot(normal);
    if vn < 0.0 {
        let impulse = -2.0 * vn / 2.0;
        a.vel -= normal * impulse;
        b.vel += normal * impulse;
    }

    let overlap = a.radius + b.radius - distance;
    let correction = normal * (overlap / 2.0);
    a.pos -= correction;
    b.pos += correction;

    let limit = Vec3::splat(max_velocity);
    a.vel = a.vel.clamp(-limit, limit);
    b.vel = b.vel.clamp(-limit, limit);
}

// ============================================================================
// Color blending
// ============================================================================

/// Eases each shape's color toward the mean of its neighbours in range.
/// Colors are read from a snapshot so the pass is order independent. Both
/// buffers are kept between frames.
#[derive(Default)]
pub struct ColorBlender {
    snapshot: Vec<(Vec3, Color, bool)>,
    neighbours: Vec<Color>,
}

impl ColorBlender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blend(&mut self, shapes: &mut [Shape], cfg: &SimulationConfig) {
        let radius = cfg.interaction.color_influence_radius;
        let rate = cfg.interaction.color_blend_rate;
        self.snapshot.clear();
        self.snapshot
            .extend(shapes.iter().map(|s| (s.pos, s.color, s.is_active())));

        for (i, shape) in shapes.iter_mut().enumerate() {
            if !shape.is_active() {
                continue;
            }
            self.neighbours.clear();
            self.neighbours.extend(
                self.snapshot
                    .iter()
                    .enumerate()
                    .filter(|&(j, &(pos, _, active))| j != i && active && pos.distance(shape.pos) < radius)
                    .map(|(_, &(_, color, _))| color),
            );
            if let Some(average) = color::average_colors(&self.neighbours) {
                shape.color = shape.color.lerp(average, rate);
            }
        }
    }
}
