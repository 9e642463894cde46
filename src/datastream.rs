//! Special animation started by a pointer click
//!
//! Rings, a noise halo and energy lines around the click point, a burst of
//! collision particles during the first frames, and a pull on every shape.

use glam::{Vec2, Vec3};
use rand::Rng;
use std::cell::Cell;
use std::f32::consts::{PI, TAU};
use std::rc::Rc;

use crate::color;
use crate::config::SimulationConfig;
use crate::particles::CollisionParticle;
use crate::pool::ParticlePools;
use crate::shapes::Shape;
use crate::surface::Surface;
use crate::vector_math::Viewport;

#[derive(Default)]
pub struct DatastreamEffect {
    /// Screen position of the click while the animation runs
    center: Option<Vec2>,
    progress: f32,
}

impl DatastreamEffect {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the animation at a screen position.
    pub fn trigger(&mut self, screen: Vec2) {
        self.center = Some(screen);
        self.progress = 0.0;
    }

    pub fn is_active(&self) -> bool {
        self.center.is_some()
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn cancel(&mut self) {
        self.center = None;
        self.progress = 0.0;
    }

    /// Advance one frame and draw. `live` counts burst particles still in
    /// flight and caps emission. Returns the intensity drawn, or `None` once
    /// the animation has finished.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        surface: &mut Surface,
        viewport: Viewport,
        hue: f32,
        shapes: &mut [Shape],
        pools: &mut ParticlePools,
        bursts: &mut Vec<CollisionParticle>,
        live: &Rc<Cell<usize>>,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> Option<f32> {
        let center = self.center?;
        let dc = &cfg.datastream;

        self.progress += dc.progress_step;
        if self.progress >= 1.0 {
            self.cancel();
            return None;
        }
        let intensity = (self.progress * PI).sin();
        let max_radius = viewport.max_dimension() * dc.max_radius_factor;
        let tint = color::hsl_to_rgb(hue, 1.0, 0.5);

        // rings
        let ring = tint.with_alpha(intensity * 0.5);
        for i in 0..dc.ring_count {
            let radius = intensity * max_radius * (1.0 - i as f32 * 0.2);
            if radius >= 1.0 {
                surface.stroke_circle(center, radius, ring);
                surface.stroke_circle(center, radius + 1.0, ring);
            }
        }

        self.draw_noise(surface, center, viewport, hue, intensity, cfg, rng);

        if self.progress < dc.emission_window {
            let world = viewport.to_world(center).extend(0.0);
            let room = dc.max_particles.saturating_sub(live.get());
            for _ in 0..dc.particles_per_frame.min(room) {
                let counter = Rc::clone(live);
                let mut particle = pools.get_collision_particle(
                    world,
                    Some(Box::new(move || counter.set(counter.get().saturating_sub(1)))),
                    color::hsl_to_rgb(hue, 1.0, 0.5),
                    cfg,
                    rng,
                );
                particle.set_lifespan(dc.particle_lifespan_ms, dc.particle_fade_out_ms);
                bursts.push(particle);
                live.set(live.get() + 1);
            }
        }

        let pull_to = viewport.to_world(center);
        for shape in shapes.iter_mut() {
            shape.rotation_speed = Vec3::splat(intensity * dc.rotation_boost);
            let d = pull_to - shape.pos.truncate();
            let force = intensity * 5.0 / (d.length() + 1.0);
            shape.vel += (d * force * dc.push_factor).extend(0.0);
        }

        let line = color::hsl_to_rgb((hue + 180.0) % 360.0, 1.0, 0.5).with_alpha(intensity * 0.7);
        for _ in 0..dc.energy_lines {
            let dir = Vec2::from_angle(rng.gen::<f32>() * TAU);
            let length = rng.gen::<f32>() * max_radius * 0.8;
            surface.stroke_line(center + dir * length * 0.2, center + dir * length, line, 1.0);
        }

        Some(intensity)
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_noise(
        &self,
        surface: &mut Surface,
        center: Vec2,
        viewport: Viewport,
        hue: f32,
        intensity: f32,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) {
        let size = cfg.datastream.noise_size.max(1);
        let radius = viewport.max_dimension() * cfg.datastream.noise_radius_factor;
        let alpha = intensity * 0.2;
        if alpha <= 0.0 || radius <= 0.0 {
            return;
        }

        let mut y = center.y - radius;
        while y < center.y + radius {
            let mut x = center.x - radius;
            while x < center.x + radius {
                if rng.gen::<f32>() < 0.5 && Vec2::new(x, y).distance(center) <= radius {
                    let cell = color::hsl_to_rgb(hue, 1.0, rng.gen::<f32>() * 0.5 + 0.5);
                    surface.fill_rect(x as i32, y as i32, size, size, cell.with_alpha(alpha));
                }
                x += size as f32;
            }
            y += size as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::ShapeKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_emits_only_early_and_respects_cap() {
        let mut cfg = SimulationConfig::default();
        cfg.datastream.max_particles = 15;
        let vp = Viewport::new(200.0, 100.0);
        let mut rng = StdRng::seed_from_u64(1);
        let mut surface = Surface::new(200, 100);
        let mut pools = ParticlePools::new(0, 32);
        let mut bursts = Vec::new();
        let live = Rc::new(Cell::new(0));
        let mut effect = DatastreamEffect::new();

        effect.trigger(Vec2::new(100.0, 50.0));
        let mut frames = 0;
        while effect
            .step(&mut surface, vp, 200.0, &mut [], &mut pools, &mut bursts, &live, &cfg, &mut rng)
            .is_some()
        {
            frames += 1;
        }
        assert!(!effect.is_active());
        // 0.02 per frame, give or take float accumulation on the last step
        assert!((49..=50).contains(&frames), "{frames}");
        assert_eq!(bursts.len(), 15);
        assert_eq!(live.get(), 15);
        assert!(bursts.iter().all(|p| p.pos == Vec3::ZERO));

        bursts.clear();
        assert_eq!(live.get(), 0);
    }

    #[test]
    fn test_shapes_are_pulled_and_spun() {
        let cfg = SimulationConfig::default();
        let vp = Viewport::new(400.0, 400.0);
        let mut rng = StdRng::seed_from_u64(2);
        let mut surface = Surface::new(400, 400);
        let mut pools = ParticlePools::new(0, 0);
        let mut bursts = Vec::new();
        let live = Rc::new(Cell::new(0));

        let mut shape = Shape::new(ShapeKind::Cube, 0, vp, &cfg, &mut rng);
        shape.pos = Vec3::new(-100.0, 0.0, 0.0);
        shape.vel = Vec3::ZERO;
        let mut shapes = vec![shape];

        let mut effect = DatastreamEffect::new();
        // screen center is world origin
        effect.trigger(Vec2::new(200.0, 200.0));
        let intensity = effect
            .step(&mut surface, vp, 200.0, &mut shapes, &mut pools, &mut bursts, &live, &cfg, &mut rng)
            .unwrap_or(0.0);
        assert!(intensity > 0.0);
        assert!(shapes[0].vel.x > 0.0);
        assert_eq!(shapes[0].vel.y, 0.0);
        assert_eq!(shapes[0].rotation_speed, Vec3::splat(intensity * 0.1));
    }
}
