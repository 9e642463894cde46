//! Object pools for particles
//!
//! A pool is a soft cap: when empty it constructs a fresh instance instead of
//! failing, and when full it hands the returned instance back to the caller's
//! normal drop path instead of retaining it.

use glam::Vec3;
use rand::Rng;

use crate::color::Color;
use crate::config::SimulationConfig;
use crate::particles::{CollisionParticle, ExpiryCallback, Particle};
use crate::vector_math::Viewport;

/// What happened to an instance handed back with [`Pool::release`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Kept for reuse
    Pooled,
    /// Pool already at capacity; the instance was dropped
    Dropped,
}

pub struct Pool<T> {
    free: Vec<T>,
    capacity: usize,
    fresh_allocations: usize,
}

impl<T> Pool<T> {
    /// Pre-fill `capacity` instances.
    pub fn new(capacity: usize, mut make: impl FnMut() -> T) -> Self {
        let mut free = Vec::with_capacity(capacity);
        free.extend((0..capacity).map(|_| make()));
        Self {
            free,
            capacity,
            fresh_allocations: 0,
        }
    }

    /// Pop a pooled instance, or construct one when the pool is empty.
    pub fn acquire(&mut self, make: impl FnOnce() -> T) -> T {
        match self.free.pop() {
            Some(item) => item,
            None => {
                self.fresh_allocations += 1;
                log::trace!("pool empty, allocating (total fresh: {})", self.fresh_allocations);
                make()
            }
        }
    }

    pub fn release(&mut self, item: T) -> ReleaseOutcome {
        if self.free.len() < self.capacity {
            self.free.push(item);
            ReleaseOutcome::Pooled
        } else {
            ReleaseOutcome::Dropped
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Instances built because the pool was empty at acquire time.
    pub fn fresh_allocations(&self) -> usize {
        self.fresh_allocations
    }

    /// Shrinking drops surplus idle instances; growing does not pre-fill.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.free.truncate(capacity);
    }
}

/// The two independent pools the engine draws from.
pub struct ParticlePools {
    pub particles: Pool<Particle>,
    pub bursts: Pool<CollisionParticle>,
}

impl ParticlePools {
    pub fn new(particle_capacity: usize, burst_capacity: usize) -> Self {
        Self {
            particles: Pool::new(particle_capacity, Particle::default),
            bursts: Pool::new(burst_capacity, CollisionParticle::default),
        }
    }

    pub fn get_particle(
        &mut self,
        id: u64,
        viewport: Viewport,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> Particle {
        let mut particle = self.particles.acquire(Particle::default);
        particle.reset(id, viewport, cfg, rng);
        particle
    }

    pub fn return_particle(&mut self, particle: Particle) -> ReleaseOutcome {
        self.particles.release(particle)
    }

    pub fn get_collision_particle(
        &mut self,
        position: Vec3,
        on_expire: Option<ExpiryCallback>,
        color: Color,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> CollisionParticle {
        let mut particle = self.bursts.acquire(CollisionParticle::default);
        particle.init(position, on_expire, color, &cfg.bursts, rng);
        particle
    }

    /// Settles any outstanding expiry callback before the instance is reused.
    pub fn return_collision_particle(&mut self, mut particle: CollisionParticle) -> ReleaseOutcome {
        particle.fire_expiry();
        self.bursts.release(particle)
    }
}
