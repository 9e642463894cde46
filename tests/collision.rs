use cyberscape::interactions::resolve_collision;
use cyberscape::shapes::{Shape, ShapeKind};
use cyberscape::vector_math::Viewport;
use cyberscape::SimulationConfig;
use glam::Vec3;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn shape(slot: usize, pos: Vec3, vel: Vec3) -> Shape {
    let cfg = SimulationConfig::default();
    let mut rng = StdRng::seed_from_u64(slot as u64);
    let mut shape = Shape::new(ShapeKind::Octahedron, slot, Viewport::new(800.0, 600.0), &cfg, &mut rng);
    shape.radius = 30.0;
    shape.pos = pos;
    shape.vel = vel;
    shape
}

#[test]
fn head_on_collision_flips_normal_velocity_and_separates() {
    let mut a = shape(0, Vec3::ZERO, Vec3::X);
    let mut b = shape(1, Vec3::new(20.0, 0.0, 0.0), -Vec3::X);
    let normal = (b.pos - a.pos).normalize();
    let before = (b.vel - a.vel).dot(normal);

    let delta = b.pos - a.pos;
    resolve_collision(&mut a, &mut b, delta, delta.length(), 2.0);

    let after = (b.vel - a.vel).dot(normal);
    assert!(before < 0.0);
    assert!(after > 0.0);
    assert!((a.pos.distance(b.pos) - 60.0).abs() < 1e-4);
}

#[test]
fn response_velocity_is_clamped_per_axis() {
    let mut a = shape(0, Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0));
    let mut b = shape(1, Vec3::new(10.0, 0.0, 0.0), Vec3::new(-5.0, 0.0, 0.0));
    let delta = b.pos - a.pos;
    resolve_collision(&mut a, &mut b, delta, delta.length(), 2.0);

    for v in [a.vel, b.vel] {
        assert!(v.abs().max_element() <= 2.0 + 1e-6, "{v:?}");
    }
}

#[test]
fn coincident_centers_separate_along_x() {
    let mut a = shape(0, Vec3::ZERO, Vec3::ZERO);
    let mut b = shape(1, Vec3::ZERO, Vec3::ZERO);
    resolve_collision(&mut a, &mut b, Vec3::ZERO, 0.0, 2.0);
    assert!((b.pos.x - a.pos.x - 60.0).abs() < 1e-4);
    assert_eq!(a.pos.y, 0.0);
    assert!(a.vel.is_finite() && b.vel.is_finite());
}
