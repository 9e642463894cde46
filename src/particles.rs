//! Particles for CyberScape
//! Drifting star particles and the short-lived burst particles spawned by
//! explosions and the datastream effect

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::color::{self, Color};
use crate::config::{BurstConfig, SimulationConfig};
use crate::shapes::Shape;
use crate::surface::Surface;
use crate::vector_math::{self, Viewport};

/// Called exactly once when a burst particle fades out.
pub type ExpiryCallback = Box<dyn FnOnce()>;

// ============================================================================
// Particle
// ============================================================================

#[derive(Clone, Debug)]
pub struct Particle {
    /// Fresh on every activation from the pool; connection keys use it
    pub id: u64,
    pub pos: Vec3,
    pub vel: Vec3,
    pub size: f32,
    pub hue: f32,
    pub color: Color,
    /// `None` never ages
    pub lifespan: Option<f32>,
    pub age: f32,
    pub opacity: f32,
    appearance_delay: f32,
    ready: bool,
    on_screen: bool,
    connection_count: u32,
    last_connection_ms: Option<f64>,
    connection_delay_ms: f64,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            id: 0,
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            size: 2.0,
            hue: 180.0,
            color: Color::WHITE,
            lifespan: None,
            age: 0.0,
            opacity: 1.0,
            appearance_delay: 0.0,
            ready: true,
            on_screen: false,
            connection_count: 0,
            last_connection_ms: None,
            connection_delay_ms: 0.0,
        }
    }
}

impl Particle {
    pub fn new(id: u64, viewport: Viewport, cfg: &SimulationConfig, rng: &mut impl Rng) -> Self {
        let mut particle = Self::default();
        particle.reset(id, viewport, cfg, rng);
        particle
    }

    /// Re-seed a pooled instance as if freshly constructed.
    pub fn reset(&mut self, id: u64, viewport: Viewport, cfg: &SimulationConfig, rng: &mut impl Rng) {
        let pc = &cfg.particles;
        self.id = id;
        self.pos = viewport.random_position(pc.depth_range, rng);
        self.vel = vector_math::random_velocity(rng, pc.min_speed, pc.max_speed);
        self.size = vector_math::random_between(rng, pc.size_min, pc.size_max);
        self.hue = color::random_cyberpunk_hue(rng);
        self.color = color::hsl_to_rgb(self.hue, 1.0, 0.5);
        self.lifespan = pc.lifespan_ms;
        self.age = 0.0;
        self.opacity = 1.0;
        self.appearance_delay = 0.0;
        self.ready = true;
        self.on_screen = viewport.contains(&viewport.project(self.pos));
        self.connection_count = 0;
        self.last_connection_ms = None;
        self.connection_delay_ms = 0.0;
    }

    pub fn set_delayed_appearance(&mut self, max_delay_ms: f32, rng: &mut impl Rng) {
        self.appearance_delay = rng.gen::<f32>() * max_delay_ms;
        self.ready = false;
    }

    /// Count the appearance delay down by one frame.
    pub fn update_delay(&mut self, step_ms: f32) {
        if !self.ready {
            self.appearance_delay -= step_ms;
            if self.appearance_delay <= 0.0 {
                self.ready = true;
            }
        }
    }

    /// Past its appearance delay and taking part in the simulation.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Ready and projected inside the viewport this frame.
    pub fn is_visible(&self) -> bool {
        self.ready && self.on_screen
    }

    pub fn is_expired(&self) -> bool {
        self.opacity <= 0.0
    }

    pub fn update(
        &mut self,
        cursor: Option<Vec2>,
        viewport: Viewport,
        shapes: &mut [Shape],
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) {
        if !self.ready {
            return;
        }
        let pc = &cfg.particles;
        let ic = &cfg.interaction;

        if let Some(cursor) = cursor {
            let to_cursor = cursor - self.pos.truncate();
            let distance = to_cursor.length();
            if distance > 0.0 && distance < ic.cursor_influence_radius {
                let force = (ic.cursor_influence_radius - distance) / ic.cursor_influence_radius
                    * ic.cursor_force;
                self.vel += (to_cursor / distance * force).extend(0.0);
            }
        }

        if viewport.width > 0.0 && viewport.height > 0.0 {
            self.vel.x += -self.pos.x / (viewport.width * 10.0) * ic.center_attraction_force;
            self.vel.y += -self.pos.y / (viewport.height * 10.0) * ic.center_attraction_force;
        }

        self.pos += self.vel;
        viewport.wrap(&mut self.pos, pc.wrap_buffer, pc.depth_range);

        vector_math::clamp_speed(&mut self.vel, pc.min_speed, pc.max_speed);
        self.vel += vector_math::jitter(rng, pc.jitter);

        if let Some(lifespan) = self.lifespan {
            self.age += cfg.render.age_step_ms;
            self.opacity = (1.0 - self.age / lifespan.max(1.0)).max(0.0);
        }

        self.interact_with_shapes(shapes, cfg, rng);
        self.refresh_visibility(viewport);
    }

    /// Recompute the on-screen flag from the current position.
    pub fn refresh_visibility(&mut self, viewport: Viewport) {
        self.on_screen = viewport.contains(&viewport.project(self.pos));
    }

    fn interact_with_shapes(&mut self, shapes: &mut [Shape], cfg: &SimulationConfig, rng: &mut impl Rng) {
        let radius = cfg.particles.shape_interaction_radius;
        let strength = cfg.particles.shape_interaction_force;
        let nudge = cfg.particles.shape_rotation_nudge;

        for shape in shapes.iter_mut().filter(|s| s.is_active()) {
            let delta = shape.pos - self.pos;
            let distance = delta.length();
            if distance < radius {
                self.vel += delta * (strength * (1.0 - distance / radius));
                shape.rotation_speed += vector_math::jitter(rng, nudge);
            }
        }
    }

    pub fn draw(&self, surface: &mut Surface, viewport: Viewport, cursor: Option<Vec2>) {
        if !self.ready || self.opacity <= 0.0 {
            return;
        }
        let p = viewport.project(self.pos);
        if !viewport.contains(&p) {
            return;
        }

        // Halo widens as the pointer gets close.
        let cursor_distance = cursor.map_or(200.0, |c| c.distance(self.pos.truncate()));
        let blur = 10.0 + (200.0 - cursor_distance.min(200.0)) / 20.0;
        let radius = self.size * p.scale;

        surface.glow(p.pos(), radius + blur * 0.5, self.color, 0.45 * self.opacity);
        surface.fill_circle(p.pos(), radius, self.color.with_alpha(self.opacity));
    }

    /// Rate limiter for new connections. The first call always succeeds; later
    /// calls succeed once the randomized delay since the last success elapsed.
    pub fn can_create_new_connection(
        &mut self,
        now_ms: f64,
        min_delay_ms: f64,
        max_delay_ms: f64,
        rng: &mut impl Rng,
    ) -> bool {
        let eligible = match self.last_connection_ms {
            None => true,
            Some(last) => now_ms - last >= self.connection_delay_ms,
        };
        if eligible {
            self.last_connection_ms = Some(now_ms);
            self.connection_delay_ms = if max_delay_ms > min_delay_ms {
                rng.gen_range(min_delay_ms..max_delay_ms)
            } else {
                min_delay_ms
            };
        }
        eligible
    }

    pub fn connection_count(&self) -> u32 {
        self.connection_count
    }

    pub fn increment_connection_count(&mut self) {
        self.connection_count += 1;
    }

    pub fn decrement_connection_count(&mut self) {
        self.connection_count = self.connection_count.saturating_sub(1);
    }
}

// ============================================================================
// Collision particle
// ============================================================================

/// Burst particle flying outward from an explosion or datastream center.
pub struct CollisionParticle {
    pub pos: Vec3,
    pub vel: Vec3,
    pub direction: Vec3,
    pub initial_speed: f32,
    pub size: f32,
    pub hue: f32,
    pub color: Color,
    pub lifespan: f32,
    pub fade_out: f32,
    pub age: f32,
    pub opacity: f32,
    pub sparkle: f32,
    slowdown: f32,
    sparkle_decay: f32,
    on_expire: Option<ExpiryCallback>,
}

impl Default for CollisionParticle {
    fn default() -> Self {
        Self {
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            direction: Vec3::X,
            initial_speed: 1.0,
            size: 1.0,
            hue: 300.0,
            color: Color::MAGENTA,
            lifespan: 3000.0,
            fade_out: 2000.0,
            age: 0.0,
            opacity: 0.0,
            sparkle: 0.0,
            slowdown: 0.98,
            sparkle_decay: 0.02,
            on_expire: None,
        }
    }
}

impl CollisionParticle {
    /// Re-seed at `position` heading in a uniformly random direction.
    pub fn init(
        &mut self,
        position: Vec3,
        on_expire: Option<ExpiryCallback>,
        color: Color,
        cfg: &BurstConfig,
        rng: &mut impl Rng,
    ) {
        let theta = rng.gen::<f32>() * std::f32::consts::TAU;
        let phi = (2.0 * rng.gen::<f32>() - 1.0).clamp(-1.0, 1.0).acos();
        self.direction = Vec3::new(phi.sin() * theta.cos(), phi.sin() * theta.sin(), phi.cos());
        self.initial_speed = if cfg.max_speed > cfg.min_speed {
            rng.gen_range(cfg.min_speed..cfg.max_speed)
        } else {
            cfg.min_speed
        };

        self.pos = position;
        self.vel = self.direction * self.initial_speed;
        self.size = vector_math::random_between(rng, cfg.size_min, cfg.size_max);
        self.color = color;
        self.hue = color::rgb_to_hsl(color).0;
        self.lifespan = cfg.lifespan_ms;
        self.fade_out = cfg.fade_out_ms;
        self.age = 0.0;
        self.opacity = 1.0;
        self.sparkle = rng.gen();
        self.slowdown = cfg.slowdown;
        self.sparkle_decay = cfg.sparkle_decay;
        self.on_expire = on_expire;
    }

    pub fn set_lifespan(&mut self, lifespan_ms: f32, fade_out_ms: f32) {
        self.lifespan = lifespan_ms;
        self.fade_out = fade_out_ms;
    }

    pub fn is_expired(&self) -> bool {
        self.opacity <= 0.0
    }

    /// Advance one frame. Returns false once the particle has expired.
    pub fn update(&mut self, step_ms: f32) -> bool {
        if self.is_expired() {
            self.fire_expiry();
            return false;
        }

        self.pos += self.vel;
        self.vel *= self.slowdown;

        self.age += step_ms;
        if self.age > self.lifespan - self.fade_out {
            self.opacity = ((self.lifespan - self.age) / self.fade_out.max(1.0)).max(0.0);
        }
        self.sparkle = (self.sparkle - self.sparkle_decay).max(0.0);

        if self.is_expired() {
            self.fire_expiry();
            return false;
        }
        true
    }

    /// Run the expiry callback if it has not run yet.
    pub fn fire_expiry(&mut self) {
        if let Some(callback) = self.on_expire.take() {
            callback();
        }
    }

    pub fn draw(&self, surface: &mut Surface, viewport: Viewport, rng: &mut impl Rng) {
        if self.opacity <= 0.0 {
            return;
        }
        let p = viewport.project(self.pos);
        let radius = self.size * p.scale;

        surface.glow(p.pos(), radius + 5.0 * self.opacity, self.color, 0.5 * self.opacity);
        surface.fill_circle(p.pos(), radius, self.color.with_alpha(self.opacity));

        if rng.gen::<f32>() < self.sparkle {
            surface.fill_circle(
                p.pos(),
                radius * 1.5,
                Color::WHITE.with_alpha(self.opacity * self.sparkle),
            );
        }
    }
}

impl Drop for CollisionParticle {
    fn drop(&mut self) {
        self.fire_expiry();
    }
}

// ============================================================================
// Burst web
// ============================================================================

/// Short links between nearby burst particles, plus the jitter they induce
/// in nearby shapes.
pub fn draw_burst_web(
    bursts: &[CollisionParticle],
    shapes: &mut [Shape],
    surface: &mut Surface,
    viewport: Viewport,
    cfg: &BurstConfig,
    rng: &mut impl Rng,
) {
    let max_distance = cfg.web_max_distance;
    let mut total = 0usize;

    'outer: for (i, a) in bursts.iter().enumerate() {
        if total >= cfg.web_max_links {
            break;
        }
        let pa = viewport.project(a.pos);
        let mut links = 0usize;

        for b in &bursts[i + 1..] {
            if links >= cfg.web_links_per_particle {
                break;
            }
            let distance = a.pos.distance(b.pos);
            if distance >= max_distance {
                continue;
            }

            let base = (1.0 - distance / max_distance) * a.opacity.min(b.opacity);
            let opacity = base * (1.0 - a.age.max(b.age) / a.lifespan.max(1.0)).max(0.0);
            let hue = (a.hue + b.hue) / 2.0 + rng.gen_range(-15.0..15.0);
            let line = color::hsl_to_rgb(
                hue,
                rng.gen_range(0.8..1.0),
                rng.gen_range(0.5..0.6),
            );
            let pb = viewport.project(b.pos);
            surface.stroke_line(pa.pos(), pb.pos(), line.with_alpha(opacity * cfg.web_alpha), 1.0);

            if rng.gen::<f32>() < 0.3 * opacity {
                let spark = pa.pos().lerp(pb.pos(), rng.gen());
                let spark_color = color::hsl_to_rgb(hue + rng.gen_range(-30.0..30.0), 1.0, 0.75);
                surface.fill_circle(
                    spark,
                    rng.gen_range(0.5..2.0),
                    spark_color.with_alpha(rng.gen::<f32>() * opacity),
                );
            }

            links += 1;
            total += 1;
            if total >= cfg.web_max_links {
                break 'outer;
            }
        }
    }

    for shape in shapes.iter_mut().filter(|s| s.is_active()) {
        for particle in bursts {
            let distance = shape.pos.distance(particle.pos);
            if distance < cfg.distortion_radius {
                let factor = cfg.distortion_factor
                    * (1.0 - distance / cfg.distortion_radius)
                    * particle.opacity;
                shape.temporary_distortion = vector_math::jitter(rng, factor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_expiry_callback_runs_once() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = BurstConfig::default();
        let fired = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&fired);

        let mut p = CollisionParticle::default();
        p.init(
            Vec3::ZERO,
            Some(Box::new(move || counter.set(counter.get() + 1))),
            Color::MAGENTA,
            &cfg,
            &mut rng,
        );

        let mut frames = 0;
        while p.update(16.0) {
            frames += 1;
            assert!(frames < 1000, "burst particle never expired");
        }
        for _ in 0..10 {
            assert!(!p.update(16.0));
        }
        drop(p);
        assert_eq!(fired.get(), 1);
        // 3000ms at 16ms per frame
        assert_eq!(frames, 187);
    }

    #[test]
    fn test_burst_slows_and_fades() {
        let mut rng = StdRng::seed_from_u64(4);
        let cfg = BurstConfig::default();
        let mut p = CollisionParticle::default();
        p.init(Vec3::ZERO, None, Color::MAGENTA, &cfg, &mut rng);
        let speed = p.vel.length();
        assert!((cfg.min_speed..cfg.max_speed).contains(&speed));

        for _ in 0..60 {
            p.update(16.0);
        }
        assert!(p.vel.length() < speed);
        // still before the fade window
        assert_eq!(p.opacity, 1.0);
        for _ in 0..20 {
            p.update(16.0);
        }
        assert!(p.opacity < 1.0 && p.opacity > 0.0);
    }

    #[test]
    fn test_swapped_size_bounds_still_sample() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut cfg = SimulationConfig::default();
        cfg.particles.size_min = 3.5;
        cfg.particles.size_max = 1.5;
        cfg.bursts.size_min = cfg.bursts.size_max + 1.0;
        let p = Particle::new(1, Viewport::new(800.0, 600.0), &cfg, &mut rng);
        assert!((1.5..=3.5).contains(&p.size));

        let mut burst = CollisionParticle::default();
        burst.init(Vec3::ZERO, None, Color::MAGENTA, &cfg.bursts, &mut rng);
        assert!((cfg.bursts.size_max..=cfg.bursts.size_min).contains(&burst.size));
    }

    #[test]
    fn test_delayed_appearance() {
        let mut rng = StdRng::seed_from_u64(5);
        let cfg = SimulationConfig::default();
        let mut p = Particle::new(1, Viewport::new(800.0, 600.0), &cfg, &mut rng);
        p.set_delayed_appearance(100.0, &mut rng);
        assert!(!p.is_ready() && !p.is_visible());
        for _ in 0..7 {
            p.update_delay(16.0);
        }
        assert!(p.is_ready());
    }

    #[test]
    fn test_connection_rate_limit() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut p = Particle::default();
        assert!(p.can_create_new_connection(0.0, 100.0, 500.0, &mut rng));
        assert!(!p.can_create_new_connection(50.0, 100.0, 500.0, &mut rng));
        assert!(p.can_create_new_connection(600.0, 100.0, 500.0, &mut rng));
        assert!(!p.can_create_new_connection(601.0, 100.0, 500.0, &mut rng));
    }

    #[test]
    fn test_zero_velocity_particle_stays_finite() {
        let mut rng = StdRng::seed_from_u64(8);
        let cfg = SimulationConfig::default();
        let vp = Viewport::new(800.0, 600.0);
        let mut p = Particle::new(1, vp, &cfg, &mut rng);
        p.pos = Vec3::ZERO;
        p.vel = Vec3::ZERO;
        p.update(None, vp, &mut [], &cfg, &mut rng);
        assert!(p.pos.is_finite() && p.vel.is_finite());
    }

    #[test]
    fn test_finite_lifespan_fades() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut cfg = SimulationConfig::default();
        cfg.particles.lifespan_ms = Some(160.0);
        let vp = Viewport::new(800.0, 600.0);
        let mut p = Particle::new(1, vp, &cfg, &mut rng);
        for _ in 0..10 {
            p.update(None, vp, &mut [], &cfg, &mut rng);
        }
        assert!(p.is_expired());
    }
}
