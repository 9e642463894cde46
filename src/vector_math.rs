//! Perspective projection and vertex rotation
//!
//! Pure functions. The `_into` variants write into caller-owned storage so the
//! per-frame loops never allocate.

use glam::{Vec2, Vec3};
use rand::Rng;

/// Field of view distance of the virtual camera.
pub const FOV: f32 = 500.0;
pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 1.5;

/// Substituted for a depth that would otherwise make the divisor exactly zero.
const DEPTH_EPSILON: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Projected {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

impl Projected {
    pub fn pos(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// Size of the drawing surface in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn project(&self, position: Vec3) -> Projected {
        project(position, self.width, self.height)
    }

    pub fn contains(&self, p: &Projected) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }

    /// Screen pixel to world XY (origin at the viewport center).
    pub fn to_world(&self, screen: Vec2) -> Vec2 {
        Vec2::new(screen.x - self.width / 2.0, screen.y - self.height / 2.0)
    }

    pub fn max_dimension(&self) -> f32 {
        self.width.max(self.height)
    }

    /// Random world position covering the viewport, depth within +/- `depth`.
    pub fn random_position(&self, depth: f32, rng: &mut impl Rng) -> Vec3 {
        Vec3::new(
            (rng.gen::<f32>() - 0.5) * self.width,
            (rng.gen::<f32>() - 0.5) * self.height,
            (rng.gen::<f32>() * 2.0 - 1.0) * depth,
        )
    }

    /// Toroidal wrap on X/Y with an off-screen margin, modular wrap on Z.
    pub fn wrap(&self, position: &mut Vec3, buffer: f32, depth: f32) {
        let span_x = self.width + buffer * 2.0;
        let span_y = self.height + buffer * 2.0;
        let half_x = self.width / 2.0 + buffer;
        let half_y = self.height / 2.0 + buffer;
        if span_x > 0.0 {
            position.x = (position.x + half_x).rem_euclid(span_x) - half_x;
        }
        if span_y > 0.0 {
            position.y = (position.y + half_y).rem_euclid(span_y) - half_y;
        }
        if depth > 0.0 {
            position.z = (position.z + depth).rem_euclid(depth * 2.0) - depth;
        }
    }
}

/// Clamp speed into `[min, max]`.
///
/// A zero (or non-finite) velocity has no direction to scale along and is left
/// untouched; the caller's jitter gets it moving again.
pub fn clamp_speed(velocity: &mut Vec3, min: f32, max: f32) {
    let speed = velocity.length();
    if !speed.is_finite() || speed <= f32::EPSILON {
        return;
    }
    if speed < min {
        *velocity *= min / speed;
    } else if speed > max {
        *velocity *= max / speed;
    }
}

/// Uniform jitter in `[-amount/2, amount/2)` on every axis.
pub fn jitter(rng: &mut impl Rng, amount: f32) -> Vec3 {
    Vec3::new(
        (rng.gen::<f32>() - 0.5) * amount,
        (rng.gen::<f32>() - 0.5) * amount,
        (rng.gen::<f32>() - 0.5) * amount,
    )
}

/// Uniform sample from `[a, b]` in whichever order the bounds arrive.
pub fn random_between(rng: &mut impl Rng, a: f32, b: f32) -> f32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    if lo < hi {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

/// Random heading in the XY plane plus an independent Z component, with
/// speeds drawn from `[min, max)`.
pub fn random_velocity(rng: &mut impl Rng, min: f32, max: f32) -> Vec3 {
    let angle_xy = rng.gen::<f32>() * std::f32::consts::TAU;
    let angle_z = rng.gen::<f32>() * std::f32::consts::TAU;
    let speed_xy = min + rng.gen::<f32>() * (max - min);
    let speed_z = min + rng.gen::<f32>() * (max - min);
    Vec3::new(
        angle_xy.cos() * speed_xy,
        angle_xy.sin() * speed_xy,
        angle_z.cos() * speed_z,
    )
}

/// Project a world position onto the viewport. World origin maps to the
/// viewport center.
pub fn project(position: Vec3, width: f32, height: f32) -> Projected {
    let mut out = Projected::default();
    project_into(position, width, height, &mut out);
    out
}

pub fn project_into(position: Vec3, width: f32, height: f32, out: &mut Projected) {
    let mut depth = FOV + position.z;
    if depth == 0.0 {
        depth = DEPTH_EPSILON;
    }
    // At or behind the camera plane everything is as close as it gets.
    let scale = if depth > 0.0 {
        (FOV / depth).clamp(MIN_SCALE, MAX_SCALE)
    } else {
        MAX_SCALE
    };

    out.x = position.x * scale + width / 2.0;
    out.y = position.y * scale + height / 2.0;
    out.scale = scale;
}

/// Rotate around X, then Y, then Z. The input is left untouched.
pub fn rotate_vertex(vertex: Vec3, rotation: Vec3) -> Vec3 {
    let mut out = Vec3::ZERO;
    rotate_vertex_into(vertex, rotation, &mut out);
    out
}

pub fn rotate_vertex_into(vertex: Vec3, rotation: Vec3, out: &mut Vec3) {
    let (sin_x, cos_x) = rotation.x.sin_cos();
    let (sin_y, cos_y) = rotation.y.sin_cos();
    let (sin_z, cos_z) = rotation.z.sin_cos();

    // X axis
    let y1 = vertex.y * cos_x - vertex.z * sin_x;
    let z1 = vertex.y * sin_x + vertex.z * cos_x;

    // Y axis
    let x2 = vertex.x * cos_y + z1 * sin_y;
    let z2 = -vertex.x * sin_y + z1 * cos_y;

    // Z axis
    out.x = x2 * cos_z - y1 * sin_z;
    out.y = x2 * sin_z + y1 * cos_z;
    out.z = z2;
}
