//! Proximity graph between particles
//!
//! Each call rebuilds an octree of the visible particles, refreshes or
//! creates links between pairs that are close on screen, and decays links
//! that dropped out of range until they disappear.

use glam::Vec3;
use rand::Rng;
use std::collections::HashMap;

use crate::color::Color;
use crate::config::{ConnectionConfig, SimulationConfig};
use crate::octree::{Aabb, Octree, OctreeItem};
use crate::particles::Particle;
use crate::surface::Surface;
use crate::vector_math::{Viewport, MIN_SCALE};

/// Canonical `(smaller id, larger id)` pair.
pub type ConnectionKey = (u64, u64);

pub fn connection_key(a: u64, b: u64) -> ConnectionKey {
    (a.min(b), a.max(b))
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Connection {
    pub created_at_ms: f64,
    pub duration_ms: f64,
    pub opacity: f32,
    /// Seen in range during the current pass
    refreshed: bool,
}

impl Connection {
    fn new(created_at_ms: f64, duration_ms: f64) -> Self {
        Self {
            created_at_ms,
            duration_ms,
            opacity: 0.0,
            refreshed: true,
        }
    }
}

pub struct ParticleConnector {
    connections: HashMap<ConnectionKey, Connection>,
    octree: Octree<usize>,
    found: Vec<OctreeItem<usize>>,
    index_of: HashMap<u64, usize>,
}

impl ParticleConnector {
    pub fn new(cfg: &ConnectionConfig) -> Self {
        Self {
            connections: HashMap::new(),
            octree: Octree::new(
                Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0)),
                cfg.octree_max_objects,
                cfg.octree_max_depth,
            ),
            found: Vec::new(),
            index_of: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get(&self, a: u64, b: u64) -> Option<&Connection> {
        self.connections.get(&connection_key(a, b))
    }

    /// World-space box holding everything that can project into the viewport.
    fn bounds_for(viewport: Viewport, depth: f32) -> Aabb {
        let half = Vec3::new(
            viewport.width / (2.0 * MIN_SCALE),
            viewport.height / (2.0 * MIN_SCALE),
            depth.max(1.0),
        );
        Aabb::from_center(Vec3::ZERO, half)
    }

    /// Advance the graph by one frame.
    pub fn update(
        &mut self,
        particles: &mut [Particle],
        now_ms: f64,
        viewport: Viewport,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) {
        let cc = &cfg.connections;

        self.octree.reset(Self::bounds_for(viewport, cfg.particles.depth_range));
        self.index_of.clear();
        for (index, particle) in particles.iter().enumerate() {
            self.index_of.insert(particle.id, index);
            if particle.is_visible() {
                self.octree.insert(OctreeItem {
                    position: particle.pos,
                    radius: particle.size,
                    data: index,
                });
            }
        }

        for connection in self.connections.values_mut() {
            connection.refreshed = false;
        }

        let reach = Vec3::splat(cc.particle_distance * cc.query_scale);
        for i in 0..particles.len() {
            if !particles[i].is_visible() {
                continue;
            }
            self.found.clear();
            self.octree.query(&Aabb::from_center(particles[i].pos, reach), &mut self.found);
            let screen_a = viewport.project(particles[i].pos).pos();

            for f in 0..self.found.len() {
                let j = self.found[f].data;
                // Each pair once, from the smaller id.
                if particles[j].id <= particles[i].id {
                    continue;
                }
                let screen_b = viewport.project(particles[j].pos).pos();
                if screen_a.distance(screen_b) > cc.particle_distance {
                    continue;
                }

                let key = connection_key(particles[i].id, particles[j].id);
                if let Some(connection) = self.connections.get_mut(&key) {
                    let elapsed = now_ms - connection.created_at_ms;
                    connection.opacity = (elapsed / connection.duration_ms.max(1.0)).min(1.0) as f32;
                    connection.refreshed = true;
                    continue;
                }
                if self.connections.len() >= cc.max_connections {
                    continue;
                }
                // Short-circuits: `j` keeps its slot when `i` is throttled.
                if particles[i].can_create_new_connection(now_ms, cc.min_delay_ms, cc.max_delay_ms, rng)
                    && particles[j].can_create_new_connection(now_ms, cc.min_delay_ms, cc.max_delay_ms, rng)
                {
                    self.connections.insert(key, Connection::new(now_ms, cc.animation_duration_ms));
                    particles[i].increment_connection_count();
                    particles[j].increment_connection_count();
                }
            }
        }

        let decay = cc.decay_step;
        let index_of = &self.index_of;
        // A lowered cap sheds links straight away.
        let mut excess = self.connections.len().saturating_sub(cc.max_connections);
        self.connections.retain(|&(a, b), connection| {
            let orphaned = !index_of.contains_key(&a) || !index_of.contains_key(&b);
            if orphaned || excess > 0 {
                excess = excess.saturating_sub(1);
            } else {
                if connection.refreshed {
                    return true;
                }
                connection.opacity = (connection.opacity - decay).max(0.0);
                if connection.opacity > 0.0 {
                    return true;
                }
            }
            for id in [a, b] {
                if let Some(&index) = index_of.get(&id) {
                    particles[index].decrement_connection_count();
                }
            }
            false
        });
    }

    /// Stroke every live link in the averaged endpoint color. Expects the
    /// same particle slice that was passed to the last [`update`](Self::update).
    pub fn draw(&self, particles: &[Particle], surface: &mut Surface, viewport: Viewport, cfg: &SimulationConfig) {
        for (&(a, b), connection) in &self.connections {
            if connection.opacity <= 0.0 {
                continue;
            }
            let (Some(&ia), Some(&ib)) = (self.index_of.get(&a), self.index_of.get(&b)) else {
                continue;
            };
            let (pa, pb) = (&particles[ia], &particles[ib]);
            let line: Color = pa.color.midpoint(pb.color);
            surface.stroke_line(
                viewport.project(pa.pos).pos(),
                viewport.project(pb.pos).pos(),
                line.with_alpha(connection.opacity * cfg.connections.line_alpha),
                1.0,
            );
        }
    }

    /// Forget every link and its bookkeeping. Particle counters are not
    /// touched; callers clear the particles at the same time.
    pub fn clear(&mut self) {
        self.connections.clear();
        self.index_of.clear();
    }
}
