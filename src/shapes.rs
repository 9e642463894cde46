//! Polyhedral wireframe shapes
//!
//! A closed set of kinds that differ only in vertex and edge data. All
//! kinematics, lifecycle and collision reactions live on [`Shape`].

use glam::{Vec2, Vec3};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

use crate::color::{self, Color};
use crate::config::SimulationConfig;
use crate::error::CyberscapeError;
use crate::particles::Particle;
use crate::scheduler::{Scheduler, TaskAction};
use crate::surface::Surface;
use crate::vector_math::{self, Projected, Viewport};

// ============================================================================
// Geometry
// ============================================================================

const CUBE_VERTICES: [Vec3; 8] = [
    Vec3::new(-15.0, -15.0, -15.0),
    Vec3::new(15.0, -15.0, -15.0),
    Vec3::new(15.0, 15.0, -15.0),
    Vec3::new(-15.0, 15.0, -15.0),
    Vec3::new(-15.0, -15.0, 15.0),
    Vec3::new(15.0, -15.0, 15.0),
    Vec3::new(15.0, 15.0, 15.0),
    Vec3::new(-15.0, 15.0, 15.0),
];

const CUBE_EDGES: [(usize, usize); 12] = [
    (0, 1), (1, 2), (2, 3), (3, 0),
    (4, 5), (5, 6), (6, 7), (7, 4),
    (0, 4), (1, 5), (2, 6), (3, 7),
];

const PYRAMID_VERTICES: [Vec3; 5] = [
    Vec3::new(0.0, -30.0, 0.0),
    Vec3::new(-21.0, 21.0, -21.0),
    Vec3::new(21.0, 21.0, -21.0),
    Vec3::new(21.0, 21.0, 21.0),
    Vec3::new(-21.0, 21.0, 21.0),
];

const PYRAMID_EDGES: [(usize, usize); 8] = [
    (0, 1), (0, 2), (0, 3), (0, 4),
    (1, 2), (2, 3), (3, 4), (4, 1),
];

const TETRAHEDRON_VERTICES: [Vec3; 4] = [
    Vec3::new(21.0, 21.0, 21.0),
    Vec3::new(-21.0, -21.0, 21.0),
    Vec3::new(-21.0, 21.0, -21.0),
    Vec3::new(21.0, -21.0, -21.0),
];

const TETRAHEDRON_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

const OCTAHEDRON_VERTICES: [Vec3; 6] = [
    Vec3::new(0.0, 21.0, 0.0),
    Vec3::new(21.0, 0.0, 0.0),
    Vec3::new(0.0, 0.0, 21.0),
    Vec3::new(-21.0, 0.0, 0.0),
    Vec3::new(0.0, 0.0, -21.0),
    Vec3::new(0.0, -21.0, 0.0),
];

const OCTAHEDRON_EDGES: [(usize, usize); 12] = [
    (0, 1), (0, 2), (0, 3), (0, 4),
    (5, 1), (5, 2), (5, 3), (5, 4),
    (1, 2), (2, 3), (3, 4), (4, 1),
];

const PHI: f32 = 1.618_034;
const DA: f32 = 10.5;
const DB: f32 = DA / PHI;
const DC: f32 = DA * PHI;

const DODECAHEDRON_VERTICES: [Vec3; 20] = [
    Vec3::new(DA, DA, DA),
    Vec3::new(DA, DA, -DA),
    Vec3::new(DA, -DA, DA),
    Vec3::new(DA, -DA, -DA),
    Vec3::new(-DA, DA, DA),
    Vec3::new(-DA, DA, -DA),
    Vec3::new(-DA, -DA, DA),
    Vec3::new(-DA, -DA, -DA),
    Vec3::new(0.0, DB, DC),
    Vec3::new(0.0, DB, -DC),
    Vec3::new(0.0, -DB, DC),
    Vec3::new(0.0, -DB, -DC),
    Vec3::new(DB, DC, 0.0),
    Vec3::new(DB, -DC, 0.0),
    Vec3::new(-DB, DC, 0.0),
    Vec3::new(-DB, -DC, 0.0),
    Vec3::new(DC, 0.0, DB),
    Vec3::new(DC, 0.0, -DB),
    Vec3::new(-DC, 0.0, DB),
    Vec3::new(-DC, 0.0, -DB),
];

const DODECAHEDRON_EDGES: [(usize, usize); 30] = [
    (0, 8), (0, 12), (0, 16),
    (1, 9), (1, 12), (1, 17),
    (2, 10), (2, 13), (2, 16),
    (3, 11), (3, 13), (3, 17),
    (4, 8), (4, 14), (4, 18),
    (5, 9), (5, 14), (5, 19),
    (6, 10), (6, 15), (6, 18),
    (7, 11), (7, 15), (7, 19),
    (8, 10), (9, 11), (12, 14), (13, 15), (16, 17), (18, 19),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    Cube,
    Pyramid,
    Tetrahedron,
    Octahedron,
    Dodecahedron,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 5] = [
        ShapeKind::Cube,
        ShapeKind::Pyramid,
        ShapeKind::Tetrahedron,
        ShapeKind::Octahedron,
        ShapeKind::Dodecahedron,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Cube => "cube",
            ShapeKind::Pyramid => "pyramid",
            ShapeKind::Tetrahedron => "tetrahedron",
            ShapeKind::Octahedron => "octahedron",
            ShapeKind::Dodecahedron => "dodecahedron",
        }
    }

    pub fn vertices(self) -> &'static [Vec3] {
        match self {
            ShapeKind::Cube => &CUBE_VERTICES,
            ShapeKind::Pyramid => &PYRAMID_VERTICES,
            ShapeKind::Tetrahedron => &TETRAHEDRON_VERTICES,
            ShapeKind::Octahedron => &OCTAHEDRON_VERTICES,
            ShapeKind::Dodecahedron => &DODECAHEDRON_VERTICES,
        }
    }

    pub fn edges(self) -> &'static [(usize, usize)] {
        match self {
            ShapeKind::Cube => &CUBE_EDGES,
            ShapeKind::Pyramid => &PYRAMID_EDGES,
            ShapeKind::Tetrahedron => &TETRAHEDRON_EDGES,
            ShapeKind::Octahedron => &OCTAHEDRON_EDGES,
            ShapeKind::Dodecahedron => &DODECAHEDRON_EDGES,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = CyberscapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShapeKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CyberscapeError::UnknownShapeKind(s.to_string()))
    }
}

// ============================================================================
// Shape
// ============================================================================

/// Glow and color saved while a collision flash is showing.
#[derive(Clone, Copy, Debug)]
struct Flash {
    serial: u64,
    glow: f32,
    color: Color,
}

pub struct Shape {
    pub kind: ShapeKind,
    /// Index in the engine's shape list; scheduled tasks address shapes by it
    pub slot: usize,
    pub pos: Vec3,
    pub vel: Vec3,
    pub rotation: Vec3,
    pub rotation_speed: Vec3,
    pub color: Color,
    pub target_color: Color,
    pub scale: f32,
    pub scale_target: f32,
    pub glow: f32,
    pub radius: f32,
    pub age: f32,
    pub lifespan: f32,
    pub opacity: f32,
    /// One-shot displacement applied at the end of the next update
    pub temporary_distortion: Vec3,
    fading_out: bool,
    exploded: bool,
    generation: u64,
    flash: Option<Flash>,
    flash_serial: u64,
    projected: Vec<Projected>,
}

impl Shape {
    pub fn new(
        kind: ShapeKind,
        slot: usize,
        viewport: Viewport,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> Self {
        let mut shape = Self {
            kind,
            slot,
            pos: Vec3::ZERO,
            vel: Vec3::ZERO,
            rotation: Vec3::ZERO,
            rotation_speed: Vec3::ZERO,
            color: Color::MAGENTA,
            target_color: Color::MAGENTA,
            scale: 1.0,
            scale_target: 1.0,
            glow: cfg.shapes.glow_min,
            radius: cfg.shapes.radius,
            age: 0.0,
            lifespan: cfg.shapes.lifespan_min_ms,
            opacity: 0.0,
            temporary_distortion: Vec3::ZERO,
            fading_out: false,
            exploded: false,
            generation: 0,
            flash: None,
            flash_serial: 0,
            projected: Vec::with_capacity(kind.vertices().len()),
        };
        shape.reset(viewport, cfg, rng);
        shape.generation = 0;
        shape
    }

    /// Factory entry point taking a kind name such as `"cube"`.
    pub fn from_name(
        name: &str,
        slot: usize,
        viewport: Viewport,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> crate::error::Result<Self> {
        let kind = name.parse::<ShapeKind>()?;
        Ok(Self::new(kind, slot, viewport, cfg, rng))
    }

    pub fn is_exploded(&self) -> bool {
        self.exploded
    }

    pub fn is_fading_out(&self) -> bool {
        self.fading_out
    }

    /// Bumped on every reset so deferred tasks can detect they are stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Present and able to interact with the rest of the scene.
    pub fn is_active(&self) -> bool {
        !self.exploded
    }

    pub fn is_faded_out(&self) -> bool {
        self.fading_out && self.opacity <= 0.0 && !self.exploded
    }

    /// New position, heading, colors and lifespan. Cancels any pending flash.
    pub fn reset(&mut self, viewport: Viewport, cfg: &SimulationConfig, rng: &mut impl Rng) {
        let sc = &cfg.shapes;
        self.pos = viewport.random_position(cfg.particles.depth_range, rng);
        self.vel = vector_math::random_velocity(rng, sc.min_speed, sc.max_speed);
        self.rotation = Vec3::ZERO;
        self.rotation_speed = vector_math::jitter(rng, sc.rotation_speed * 2.0);
        self.color = color::random_cyberpunk_color(rng);
        self.target_color = color::random_cyberpunk_color(rng);
        self.scale = 1.0;
        self.scale_target = 1.0;
        self.glow = vector_math::random_between(rng, sc.glow_min, sc.glow_max);
        self.radius = sc.radius;
        self.age = 0.0;
        self.lifespan = vector_math::random_between(rng, sc.lifespan_min_ms, sc.lifespan_max_ms);
        self.opacity = 0.0;
        self.temporary_distortion = Vec3::ZERO;
        self.fading_out = false;
        self.exploded = false;
        self.flash = None;
        self.generation += 1;
    }

    pub fn update(
        &mut self,
        cursor: Option<Vec2>,
        viewport: Viewport,
        particles: &[Particle],
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) {
        if self.exploded {
            return;
        }
        let sc = &cfg.shapes;

        if let Some(cursor) = cursor {
            let to_cursor = cursor - self.pos.truncate();
            let distance = to_cursor.length();
            if distance > 0.0 && distance < sc.cursor_radius {
                let force = (sc.cursor_radius - distance) / sc.cursor_radius * sc.cursor_force;
                self.vel += (to_cursor / distance * force).extend(0.0);
            }
        }

        let center = cfg.interaction.center_attraction_force;
        if viewport.width > 0.0 && viewport.height > 0.0 {
            self.vel.x += -self.pos.x / (viewport.width * 10.0) * center;
            self.vel.y += -self.pos.y / (viewport.height * 10.0) * center;
        }
        self.vel.z += (rng.gen::<f32>() - 0.5) * sc.z_drift;

        self.pos += self.vel;
        viewport.wrap(&mut self.pos, cfg.particles.wrap_buffer, cfg.particles.depth_range);

        vector_math::clamp_speed(&mut self.vel, sc.min_speed, sc.max_speed);
        self.vel += vector_math::jitter(rng, sc.jitter);

        self.rotation += self.rotation_speed;

        if self.scale < self.scale_target {
            self.scale = (self.scale + sc.scale_step).min(self.scale_target);
        } else if self.scale > self.scale_target {
            self.scale = (self.scale - sc.scale_step).max(self.scale_target);
        }

        self.update_color(sc.color_transition_speed, rng);

        self.age += cfg.render.age_step_ms;
        if self.age >= self.lifespan && !self.fading_out {
            self.fading_out = true;
            self.scale_target = sc.fade_scale;
        }
        self.opacity = if self.fading_out {
            (1.0 - (self.age - self.lifespan) / sc.fade_out_ms.max(1.0)).max(0.0)
        } else {
            (self.age / sc.fade_in_ms.max(1.0)).min(1.0)
        };

        if self.scale == self.scale_target && self.scale != 1.0 && !self.fading_out {
            self.scale_target = 1.0;
        }

        self.interact_with_particles(particles, cfg);

        self.pos += self.temporary_distortion;
        self.temporary_distortion = Vec3::ZERO;
    }

    fn update_color(&mut self, speed: f32, rng: &mut impl Rng) {
        // The flash tint is held until it is reverted.
        if self.flash.is_some() || self.color == self.target_color {
            return;
        }
        self.color = self.color.ease_toward(self.target_color, speed);
        if self.color == self.target_color {
            self.target_color = color::random_cyberpunk_color(rng);
        }
    }

    fn interact_with_particles(&mut self, particles: &[Particle], cfg: &SimulationConfig) {
        let radius = cfg.shapes.particle_interaction_radius;
        let strength = cfg.shapes.particle_interaction_force;
        for particle in particles.iter().filter(|p| p.is_ready()) {
            let delta = particle.pos - self.pos;
            let distance = delta.length();
            if distance < radius {
                self.vel += delta * (strength * (1.0 - distance / radius));
            }
        }
    }

    pub fn draw(&mut self, surface: &mut Surface, viewport: Viewport, line_width: f32) {
        if self.opacity <= 0.0 || self.exploded {
            return;
        }

        self.projected.clear();
        let mut rotated = Vec3::ZERO;
        for &vertex in self.kind.vertices() {
            vector_math::rotate_vertex_into(vertex, self.rotation, &mut rotated);
            self.projected.push(viewport.project(rotated * self.scale + self.pos));
        }

        let glow_strength = self.opacity * self.glow * 1.5;
        let center = viewport.project(self.pos);
        surface.glow(
            center.pos(),
            (self.radius * center.scale * self.scale + glow_strength).max(1.0),
            self.color,
            (glow_strength / 120.0).min(0.35),
        );

        let stroke = self.color.with_alpha(self.opacity);
        for &(a, b) in self.kind.edges() {
            let (pa, pb) = (self.projected[a], self.projected[b]);
            surface.stroke_line(pa.pos(), pb.pos(), stroke, line_width);
        }
    }

    /// Glow boost, flash tint and pulse. Glow and tint revert after the
    /// configured delay; a retrigger while flashing keeps the first originals.
    pub fn trigger_collision_visuals(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler,
        cfg: &SimulationConfig,
    ) {
        let sc = &cfg.shapes;
        let original = self.flash.map_or((self.glow, self.color), |f| (f.glow, f.color));

        self.flash_serial += 1;
        self.flash = Some(Flash {
            serial: self.flash_serial,
            glow: original.0,
            color: original.1,
        });
        self.glow = original.0 + sc.flash_glow_boost;
        self.color = color::hex_to_rgb(&sc.flash_color).unwrap_or(Color::MAGENTA);
        self.scale_target = sc.pulse_scale;

        scheduler.schedule(
            now_ms + sc.flash_duration_ms,
            TaskAction::EndFlash {
                slot: self.slot,
                generation: self.generation,
                flash: self.flash_serial,
            },
        );
    }

    /// Revert a flash. Returns false when the task no longer applies.
    pub fn end_flash(&mut self, generation: u64, serial: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match self.flash {
            Some(flash) if flash.serial == serial => {
                self.glow = flash.glow;
                self.color = flash.color;
                self.flash = None;
                true
            }
            _ => false,
        }
    }

    /// Hide now, flash, and schedule a full reset after a random delay.
    /// Does nothing if the shape is already exploded.
    pub fn explode_and_respawn(
        &mut self,
        now_ms: f64,
        scheduler: &mut Scheduler,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> bool {
        if self.exploded {
            return false;
        }
        self.exploded = true;
        self.opacity = 0.0;
        self.trigger_collision_visuals(now_ms, scheduler, cfg);

        let delay = rng.gen::<f64>() * cfg.shapes.max_respawn_delay_ms;
        scheduler.schedule(
            now_ms + delay,
            TaskAction::RespawnShape {
                slot: self.slot,
                generation: self.generation,
            },
        );
        true
    }

    /// Apply a scheduled respawn. Stale generations are ignored.
    pub fn respawn(
        &mut self,
        generation: u64,
        viewport: Viewport,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> bool {
        if generation != self.generation || !self.exploded {
            return false;
        }
        self.reset(viewport, cfg, rng);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (SimulationConfig, Viewport, StdRng) {
        (
            SimulationConfig::default(),
            Viewport::new(800.0, 600.0),
            StdRng::seed_from_u64(11),
        )
    }

    #[test]
    fn test_edge_indices_are_in_range() {
        for kind in ShapeKind::ALL {
            let n = kind.vertices().len();
            assert!(kind.edges().iter().all(|&(a, b)| a < n && b < n && a != b), "{kind}");
        }
        assert_eq!(ShapeKind::Dodecahedron.edges().len(), 30);
    }

    #[test]
    fn test_factory_rejects_unknown_kind() {
        let (cfg, vp, mut rng) = setup();
        assert!(Shape::from_name("cube", 0, vp, &cfg, &mut rng).is_ok());
        assert_eq!("Octahedron".parse::<ShapeKind>().unwrap(), ShapeKind::Octahedron);
        match Shape::from_name("torus", 0, vp, &cfg, &mut rng) {
            Err(CyberscapeError::UnknownShapeKind(name)) => assert_eq!(name, "torus"),
            _ => panic!("torus should not be a shape"),
        }
    }

    #[test]
    fn test_reset_accepts_inverted_ranges() {
        let (mut cfg, vp, mut rng) = setup();
        cfg.shapes.glow_min = 25.0;
        cfg.shapes.glow_max = 15.0;
        cfg.shapes.lifespan_min_ms = 25000.0;
        cfg.shapes.lifespan_max_ms = 10000.0;
        let mut shape = Shape::new(ShapeKind::Cube, 0, vp, &cfg, &mut rng);
        for _ in 0..20 {
            shape.reset(vp, &cfg, &mut rng);
            assert!((15.0..=25.0).contains(&shape.glow));
            assert!((10000.0..=25000.0).contains(&shape.lifespan));
        }
    }

    #[test]
    fn test_fade_in_then_out() {
        let (cfg, vp, mut rng) = setup();
        let mut shape = Shape::new(ShapeKind::Cube, 0, vp, &cfg, &mut rng);
        shape.lifespan = 160.0;
        shape.update(None, vp, &[], &cfg, &mut rng);
        assert!(shape.opacity > 0.0 && shape.opacity < 0.1);

        for _ in 0..9 {
            shape.update(None, vp, &[], &cfg, &mut rng);
        }
        assert!(shape.is_fading_out());
        assert_eq!(shape.scale_target, cfg.shapes.fade_scale);

        for _ in 0..400 {
            shape.update(None, vp, &[], &cfg, &mut rng);
        }
        assert!(shape.is_faded_out());
    }

    #[test]
    fn test_distortion_is_one_shot() {
        let (cfg, vp, mut rng) = setup();
        let mut shape = Shape::new(ShapeKind::Pyramid, 0, vp, &cfg, &mut rng);
        shape.temporary_distortion = Vec3::new(1.0, 1.0, 1.0);
        shape.update(None, vp, &[], &cfg, &mut rng);
        assert_eq!(shape.temporary_distortion, Vec3::ZERO);
    }

    #[test]
    fn test_explode_is_guarded_and_respawn_checks_generation() {
        let (cfg, vp, mut rng) = setup();
        let mut scheduler = Scheduler::new();
        let mut shape = Shape::new(ShapeKind::Tetrahedron, 2, vp, &cfg, &mut rng);
        let generation = shape.generation();

        assert!(shape.explode_and_respawn(0.0, &mut scheduler, &cfg, &mut rng));
        assert!(!shape.explode_and_respawn(1.0, &mut scheduler, &cfg, &mut rng));
        assert!(shape.is_exploded());
        assert_eq!(shape.opacity, 0.0);
        // one flash revert + one respawn
        assert_eq!(scheduler.pending(), 2);

        assert!(!shape.respawn(generation + 7, vp, &cfg, &mut rng));
        assert!(shape.respawn(generation, vp, &cfg, &mut rng));
        assert!(!shape.is_exploded());
        // the respawn already happened; a duplicate is stale
        assert!(!shape.respawn(generation, vp, &cfg, &mut rng));
    }

    #[test]
    fn test_flash_reverts_to_first_originals() {
        let (cfg, vp, mut rng) = setup();
        let mut scheduler = Scheduler::new();
        let mut shape = Shape::new(ShapeKind::Cube, 0, vp, &cfg, &mut rng);
        let (glow, color) = (shape.glow, shape.color);

        shape.trigger_collision_visuals(0.0, &mut scheduler, &cfg);
        shape.trigger_collision_visuals(50.0, &mut scheduler, &cfg);
        assert_eq!(shape.glow, glow + cfg.shapes.flash_glow_boost);

        let mut due = Vec::new();
        scheduler.drain_due(1000.0, &mut due);
        for action in due {
            if let TaskAction::EndFlash { generation, flash, .. } = action {
                shape.end_flash(generation, flash);
            }
        }
        assert_eq!(shape.glow, glow);
        assert_eq!(shape.color, color);
    }
}
