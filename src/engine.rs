//! The CyberScape engine
//!
//! Owns every entity, pool, effect and the live configuration, and runs the
//! per-frame pipeline against a caller-provided surface.

use glam::{Vec2, Vec3};
use image::Rgba;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::rc::Rc;

use crate::color::{self, Color};
use crate::config::SimulationConfig;
use crate::connector::ParticleConnector;
use crate::datastream::DatastreamEffect;
use crate::interactions::{self, CollisionEvent, CollisionHandler, ColorBlender};
use crate::particles::{self, CollisionParticle, ExpiryCallback, Particle};
use crate::performance::PerformanceController;
use crate::pool::ParticlePools;
use crate::postprocess::GlitchScheduler;
use crate::scheduler::{Scheduler, TaskAction};
use crate::shapes::{Shape, ShapeKind};
use crate::surface::Surface;
use crate::vector_math::Viewport;

const INITIAL_HUE: f32 = 210.0;
const HUE_STEP: f32 = 0.2;

/// What the presentation layer hands over every frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInput {
    pub width: f32,
    pub height: f32,
    /// Pointer in surface pixels
    pub pointer: Option<Vec2>,
    /// Pointer forces apply only while this is set
    pub pointer_over: bool,
}

impl FrameInput {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            pointer: None,
            pointer_over: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EngineStats {
    pub frames: u64,
    pub particles: usize,
    pub explosion_particles: usize,
    pub datastream_particles: usize,
    pub live_explosions: usize,
    pub shapes: usize,
    pub exploded_shapes: usize,
    pub connections: usize,
    pub pending_tasks: usize,
    pub performance_level: f32,
    pub hue: f32,
}

pub struct CyberScape {
    config: SimulationConfig,
    rng: StdRng,
    viewport: Viewport,

    particles: Vec<Particle>,
    bursts: Vec<CollisionParticle>,
    shapes: Vec<Shape>,
    pools: ParticlePools,

    scheduler: Scheduler,
    collisions: CollisionHandler,
    connector: ParticleConnector,
    performance: PerformanceController,
    glitch: GlitchScheduler,
    datastream: DatastreamEffect,

    hue: f32,
    frames: u64,
    last_frame_ms: Option<f64>,
    next_particle_id: u64,

    /// Explosion particles in flight
    burst_live: Rc<Cell<usize>>,
    /// Datastream particles in flight
    datastream_live: Rc<Cell<usize>>,
    /// Explosions with at least one particle still in flight
    explosions_live: Rc<Cell<usize>>,
    last_explosion_ms: Option<f64>,

    due: Vec<TaskAction>,
    events: Vec<CollisionEvent>,
    blender: ColorBlender,
}

impl CyberScape {
    pub fn new(width: f32, height: f32, config: SimulationConfig) -> Self {
        Self::with_rng(width, height, config, StdRng::from_entropy())
    }

    /// Deterministic engine for tests and captures.
    pub fn with_seed(width: f32, height: f32, config: SimulationConfig, seed: u64) -> Self {
        Self::with_rng(width, height, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width: f32, height: f32, mut config: SimulationConfig, rng: StdRng) -> Self {
        config.recompute_derived();
        let viewport = Viewport::new(width.max(0.0), height.max(0.0));
        let pools = ParticlePools::new(config.particles.pool_size, config.bursts.pool_size);

        let mut engine = Self {
            rng,
            viewport,
            particles: Vec::new(),
            bursts: Vec::new(),
            shapes: Vec::new(),
            pools,
            scheduler: Scheduler::new(),
            collisions: CollisionHandler::new(config.interaction.collision_grid_size),
            connector: ParticleConnector::new(&config.connections),
            performance: PerformanceController::new(&config),
            glitch: GlitchScheduler::new(width as u32, height as u32, &config.glitch),
            datastream: DatastreamEffect::new(),
            hue: INITIAL_HUE,
            frames: 0,
            last_frame_ms: None,
            next_particle_id: 0,
            burst_live: Rc::new(Cell::new(0)),
            datastream_live: Rc::new(Cell::new(0)),
            explosions_live: Rc::new(Cell::new(0)),
            last_explosion_ms: None,
            due: Vec::new(),
            events: Vec::new(),
            blender: ColorBlender::new(),
            config,
        };
        engine.adjust_shape_count();
        log::info!(
            "cyberscape ready: {}x{}, {} shapes, particle target {}",
            width,
            height,
            engine.shapes.len(),
            engine.particle_target()
        );
        engine
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Raw access; call [`update_config`](Self::update_config) instead when
    /// derived values or pool capacities must follow.
    pub fn config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }

    pub fn update_config(&mut self, change: impl FnOnce(&mut SimulationConfig)) {
        self.config.update(change);
        self.performance.rebase(&self.config);
        self.sync_capacities();
    }

    /// Replace the live table with stock defaults.
    pub fn reset_config(&mut self) {
        self.config = SimulationConfig::default();
        self.performance.rebase(&self.config);
        self.sync_capacities();
        log::debug!("configuration reset to defaults");
    }

    fn sync_capacities(&mut self) {
        self.pools.particles.set_capacity(self.config.particles.pool_size);
        self.pools.bursts.set_capacity(self.config.bursts.pool_size);
        self.adjust_shape_count();
        self.cull_surplus_particles();
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn shapes_mut(&mut self) -> &mut [Shape] {
        &mut self.shapes
    }

    pub fn bursts(&self) -> &[CollisionParticle] {
        &self.bursts
    }

    pub fn pools(&self) -> &ParticlePools {
        &self.pools
    }

    pub fn is_animating(&self) -> bool {
        self.datastream.is_active()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            frames: self.frames,
            particles: self.particles.len(),
            explosion_particles: self.burst_live.get(),
            datastream_particles: self.datastream_live.get(),
            live_explosions: self.explosions_live.get(),
            shapes: self.shapes.len(),
            exploded_shapes: self.shapes.iter().filter(|s| s.is_exploded()).count(),
            connections: self.connector.len(),
            pending_tasks: self.scheduler.pending(),
            performance_level: self.performance.level(),
            hue: self.hue,
        }
    }

    pub fn particle_target(&self) -> usize {
        self.config
            .calculate_particle_count(self.viewport.width, self.viewport.height)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the datastream animation at a screen position.
    pub fn trigger_special_animation(&mut self, x: f32, y: f32) {
        log::debug!("special animation at ({:.0}, {:.0})", x, y);
        self.datastream.trigger(Vec2::new(x, y));
    }

    /// Cancel every scheduled task and hand all particles back to the pools.
    pub fn shutdown(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        for particle in self.particles.drain(..) {
            self.pools.return_particle(particle);
        }
        for burst in self.bursts.drain(..) {
            self.pools.return_collision_particle(burst);
        }
        self.connector.clear();
        self.datastream.cancel();
        log::info!("cyberscape shut down ({} scheduled tasks cancelled)", cancelled);
    }

    fn resize(&mut self, width: f32, height: f32) {
        let viewport = Viewport::new(width.max(0.0), height.max(0.0));
        if viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.adjust_shape_count();
        self.cull_surplus_particles();
        log::debug!("viewport {}x{}", width, height);
    }

    /// Grow by cycling through the kinds, or drop the tail together with its
    /// pending tasks.
    fn adjust_shape_count(&mut self) {
        let target = self.config.shape_count(self.viewport.width);
        if self.shapes.len() > target {
            self.shapes.truncate(target);
            self.scheduler.retain(|action| action.slot() < target);
        }
        while self.shapes.len() < target {
            let slot = self.shapes.len();
            let kind = ShapeKind::ALL[slot % ShapeKind::ALL.len()];
            let shape = Shape::new(kind, slot, self.viewport, &self.config, &mut self.rng);
            self.shapes.push(shape);
        }
    }

    /// Hand the newest particles back to the pool until the population fits
    /// the current target.
    fn cull_surplus_particles(&mut self) {
        let target = self.particle_target();
        if self.particles.len() <= target {
            return;
        }
        let surplus = self.particles.len() - target;
        for particle in self.particles.drain(target..) {
            self.pools.return_particle(particle);
        }
        log::debug!("culled {} particles (target {})", surplus, target);
    }

    fn next_id(&mut self) -> u64 {
        self.next_particle_id += 1;
        self.next_particle_id
    }

    // ------------------------------------------------------------------------
    // Frame
    // ------------------------------------------------------------------------

    /// Run one frame into `surface`. Returns false when the frame was skipped
    /// because less than one frame time elapsed since the last one.
    pub fn render_frame(&mut self, now_ms: f64, input: &FrameInput, surface: &mut Surface) -> bool {
        let delta = self.last_frame_ms.map(|last| now_ms - last);
        if let Some(delta) = delta {
            if delta < self.config.render.frame_time_ms as f64 {
                return false;
            }
        }
        self.last_frame_ms = Some(now_ms);

        self.resize(input.width, input.height);
        surface.resize(self.viewport.width as u32, self.viewport.height as u32);
        let viewport = self.viewport;

        if let Some(delta) = delta {
            if self.performance.sample(delta, now_ms, &mut self.config) {
                self.sync_capacities();
            }
        }

        self.run_due_tasks(now_ms);

        surface.clear(Rgba(self.config.render.background));
        self.update_hue();

        let cursor = match (input.pointer_over, input.pointer) {
            (true, Some(p)) => Some(viewport.to_world(p)),
            _ => None,
        };

        self.spawn_particle();

        // shape physics
        interactions::apply_forces(&mut self.shapes, &self.config);
        self.events.clear();
        let events = &mut self.events;
        self.collisions.handle_collisions(
            &mut self.shapes,
            now_ms,
            &mut self.scheduler,
            &self.config,
            &mut self.rng,
            |event| events.push(event),
        );
        for i in 0..self.events.len() {
            let event = self.events[i];
            self.explode(event, now_ms);
        }
        self.blender.blend(&mut self.shapes, &self.config);

        // entities
        let step = self.config.render.age_step_ms;
        for particle in self.particles.iter_mut() {
            if particle.is_ready() {
                particle.update(cursor, viewport, &mut self.shapes, &self.config, &mut self.rng);
                particle.draw(surface, viewport, cursor);
            } else {
                particle.update_delay(step);
            }
        }

        for i in 0..self.shapes.len() {
            let shape = &mut self.shapes[i];
            shape.update(cursor, viewport, &self.particles, &self.config, &mut self.rng);
            shape.draw(surface, viewport, self.config.shapes.line_width);
            if shape.is_faded_out() {
                shape.reset(viewport, &self.config, &mut self.rng);
            }
            if shape.is_active() && self.rng.gen::<f32>() < self.config.shapes.emission_chance {
                let (pos, tint) = (shape.pos, shape.color);
                self.emit_from_shape(pos, tint);
            }
        }

        self.draw_shape_links(surface);

        // connection graph
        self.connector
            .update(&mut self.particles, now_ms, viewport, &self.config, &mut self.rng);
        self.connector.draw(&self.particles, surface, viewport, &self.config);

        self.recycle_expired();

        // bursts
        let mut i = 0;
        while i < self.bursts.len() {
            if self.bursts[i].update(step) {
                self.bursts[i].draw(surface, viewport, &mut self.rng);
                i += 1;
            } else {
                let burst = self.bursts.swap_remove(i);
                self.pools.return_collision_particle(burst);
            }
        }
        if !self.bursts.is_empty() {
            particles::draw_burst_web(
                &self.bursts,
                &mut self.shapes,
                surface,
                viewport,
                &self.config.bursts,
                &mut self.rng,
            );
        }

        self.datastream.step(
            surface,
            viewport,
            self.hue,
            &mut self.shapes,
            &mut self.pools,
            &mut self.bursts,
            &self.datastream_live,
            &self.config,
            &mut self.rng,
        );

        self.glitch.update(surface, now_ms, &self.config, &mut self.rng);

        self.frames += 1;
        true
    }

    fn run_due_tasks(&mut self, now_ms: f64) {
        self.due.clear();
        self.scheduler.drain_due(now_ms, &mut self.due);
        for i in 0..self.due.len() {
            let action = self.due[i];
            let Some(shape) = self.shapes.get_mut(action.slot()) else {
                log::trace!("dropping task for missing slot: {:?}", action);
                continue;
            };
            let applied = match action {
                TaskAction::RespawnShape { generation, .. } => {
                    let done = shape.respawn(generation, self.viewport, &self.config, &mut self.rng);
                    if done {
                        log::debug!("shape {} ({}) respawned", shape.slot, shape.kind);
                    }
                    done
                }
                TaskAction::EndFlash { generation, flash, .. } => shape.end_flash(generation, flash),
            };
            if !applied {
                log::trace!("stale task ignored: {:?}", action);
            }
        }
    }

    fn update_hue(&mut self) {
        self.hue = (self.hue + HUE_STEP) % 360.0;
        if !color::is_valid_cyberpunk_hue(self.hue) {
            self.hue = color::random_cyberpunk_hue(&mut self.rng);
        }
    }

    /// While below the population target, sometimes fetch a pooled particle
    /// that fades in after a random delay.
    fn spawn_particle(&mut self) {
        if self.particles.len() >= self.particle_target()
            || self.rng.gen::<f32>() >= self.config.particles.spawn_chance
        {
            return;
        }
        let id = self.next_id();
        let mut particle = self
            .pools
            .get_particle(id, self.viewport, &self.config, &mut self.rng);
        particle.set_delayed_appearance(self.config.particles.max_appearance_delay_ms, &mut self.rng);
        self.particles.push(particle);
    }

    fn emit_from_shape(&mut self, pos: Vec3, tint: Color) {
        let id = self.next_id();
        let mut particle = self
            .pools
            .get_particle(id, self.viewport, &self.config, &mut self.rng);
        particle.pos = pos;
        particle.size = self.rng.gen_range(0.5..1.5);
        particle.color = tint;
        particle.lifespan = Some(self.config.shapes.emitted_lifespan_ms);
        self.particles.push(particle);
    }

    fn draw_shape_links(&self, surface: &mut Surface) {
        let cc = &self.config.connections;
        let line = Color::WHITE.with_alpha(cc.shape_line_alpha);
        for (i, a) in self.shapes.iter().enumerate() {
            if !a.is_active() {
                continue;
            }
            for b in self.shapes[i + 1..].iter().filter(|s| s.is_active()) {
                if a.pos.distance(b.pos) < cc.shape_distance {
                    let pa = self.viewport.project(a.pos).pos();
                    let pb = self.viewport.project(b.pos).pos();
                    surface.stroke_line(pa, pb, line, 1.0);
                }
            }
        }
    }

    fn recycle_expired(&mut self) {
        let mut i = 0;
        while i < self.particles.len() {
            if self.particles[i].is_expired() {
                let particle = self.particles.swap_remove(i);
                self.pools.return_particle(particle);
            } else {
                i += 1;
            }
        }
    }

    /// Collision callback: a burst at the contact point and both shapes
    /// blown up, unless explosions are cooling down or saturated.
    fn explode(&mut self, event: CollisionEvent, now_ms: f64) {
        let bc = &self.config.bursts;
        let cooling = self
            .last_explosion_ms
            .is_some_and(|last| now_ms - last < bc.explosion_cooldown_ms);
        if cooling || self.explosions_live.get() >= bc.max_simultaneous_explosions {
            return;
        }

        let count = bc.particles_per_explosion;
        let room_in_pool = self.particles.len() + count <= self.config.particles.pool_size;
        let room_for_bursts = self.burst_live.get() + count <= bc.max_explosion_particles;
        if room_in_pool && room_for_bursts && count > 0 {
            let tint = color::hex_to_rgb(&bc.color).unwrap_or(Color::MAGENTA);
            let remaining = Rc::new(Cell::new(count));
            for _ in 0..count {
                let burst_live = Rc::clone(&self.burst_live);
                let explosions_live = Rc::clone(&self.explosions_live);
                let remaining = Rc::clone(&remaining);
                let on_expire: ExpiryCallback = Box::new(move || {
                    burst_live.set(burst_live.get().saturating_sub(1));
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        explosions_live.set(explosions_live.get().saturating_sub(1));
                    }
                });
                let mut burst = self.pools.get_collision_particle(
                    event.point,
                    Some(on_expire),
                    tint,
                    &self.config,
                    &mut self.rng,
                );
                burst.set_lifespan(bc.explosion_lifespan_ms, bc.explosion_fade_out_ms);
                self.bursts.push(burst);
                self.burst_live.set(self.burst_live.get() + 1);
            }
            self.explosions_live.set(self.explosions_live.get() + 1);
            self.last_explosion_ms = Some(now_ms);
        }

        for slot in [event.a, event.b] {
            if let Some(shape) = self.shapes.get_mut(slot) {
                shape.explode_and_respawn(now_ms, &mut self.scheduler, &self.config, &mut self.rng);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (CyberScape, Surface, FrameInput) {
        let cfg = SimulationConfig::default();
        (
            CyberScape::with_seed(320.0, 240.0, cfg, 7),
            Surface::new(320, 240),
            FrameInput::new(320.0, 240.0),
        )
    }

    #[test]
    fn test_frames_are_paced() {
        let (mut engine, mut surface, input) = engine();
        assert!(engine.render_frame(0.0, &input, &mut surface));
        assert!(!engine.render_frame(10.0, &input, &mut surface));
        assert!(engine.render_frame(40.0, &input, &mut surface));
        assert_eq!(engine.stats().frames, 2);
    }

    #[test]
    fn test_mobile_width_uses_mobile_shape_count() {
        let (mut engine, mut surface, _) = engine();
        assert_eq!(engine.shapes().len(), engine.config().shapes.mobile_count);

        let wide = FrameInput::new(1280.0, 720.0);
        engine.render_frame(0.0, &wide, &mut surface);
        assert_eq!(engine.shapes().len(), engine.config().shapes.count);
        assert_eq!((surface.width(), surface.height()), (1280, 720));
    }

    #[test]
    fn test_shrinking_viewport_culls_particles() {
        let mut cfg = SimulationConfig::default();
        cfg.particles.spawn_chance = 1.0;
        cfg.particles.particles_per_pixel = 1.0 / 20000.0;
        cfg.particles.base_count = 40;
        cfg.shapes.emission_chance = 0.0;
        cfg.performance.enabled = false;
        let mut engine = CyberScape::with_seed(1280.0, 720.0, cfg, 3);
        let mut surface = Surface::new(1280, 720);

        let wide = FrameInput::new(1280.0, 720.0);
        for frame in 0..60 {
            engine.render_frame(frame as f64 * 40.0, &wide, &mut surface);
        }
        assert_eq!(engine.particle_target(), 46);
        assert_eq!(engine.stats().particles, 46);
        let pooled = engine.pools().particles.available();

        // mobile width: 40 * 0.8
        let narrow = FrameInput::new(600.0, 400.0);
        engine.render_frame(60.0 * 40.0, &narrow, &mut surface);
        assert_eq!(engine.particle_target(), 32);
        assert_eq!(engine.stats().particles, 32);
        assert_eq!(engine.pools().particles.available(), pooled + 14);
    }

    #[test]
    fn test_collision_explodes_both_shapes_once() {
        let (mut engine, mut surface, input) = engine();
        for (i, shape) in engine.shapes_mut().iter_mut().enumerate() {
            shape.pos = Vec3::new(i as f32 * 1000.0, 0.0, 0.0);
        }
        engine.shapes_mut()[1].pos = Vec3::new(10.0, 0.0, 0.0);

        engine.render_frame(0.0, &input, &mut surface);
        let stats = engine.stats();
        assert_eq!(stats.exploded_shapes, 2);
        assert_eq!(stats.live_explosions, 1);
        assert_eq!(stats.explosion_particles, engine.config().bursts.particles_per_explosion);
    }

    #[test]
    fn test_shutdown_cancels_and_returns_everything() {
        let (mut engine, mut surface, input) = engine();
        engine.shapes_mut()[0].pos = Vec3::ZERO;
        engine.shapes_mut()[1].pos = Vec3::new(5.0, 0.0, 0.0);
        engine.render_frame(0.0, &input, &mut surface);
        assert!(engine.stats().pending_tasks > 0);

        engine.shutdown();
        let stats = engine.stats();
        assert_eq!(stats.pending_tasks, 0);
        assert_eq!(stats.particles, 0);
        assert_eq!(stats.explosion_particles, 0);
        assert_eq!(stats.datastream_particles, 0);
        assert_eq!(stats.live_explosions, 0);
    }
}
