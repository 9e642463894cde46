use cyberscape::{CyberScape, FrameInput, SimulationConfig, Surface};
use glam::{Vec2, Vec3};

fn run(engine: &mut CyberScape, surface: &mut Surface, input: &FrameInput, frames: usize, start: f64) -> f64 {
    let mut now = start;
    for _ in 0..frames {
        now += 40.0;
        engine.render_frame(now, input, surface);
    }
    now
}

#[test]
fn many_frames_stay_within_limits() {
    let cfg = SimulationConfig::default();
    let mut engine = CyberScape::with_seed(1024.0, 768.0, cfg, 99);
    let mut surface = Surface::new(1024, 768);
    let mut input = FrameInput::new(1024.0, 768.0);
    input.pointer = Some(Vec2::new(300.0, 200.0));
    input.pointer_over = true;

    run(&mut engine, &mut surface, &input, 300, 0.0);

    let stats = engine.stats();
    assert_eq!(stats.frames, 300);
    assert!(stats.particles > 0);
    assert!(stats.connections <= engine.config().connections.max_connections);
    assert!(stats.explosion_particles <= engine.config().bursts.max_explosion_particles);
    assert!(stats.live_explosions <= engine.config().bursts.max_simultaneous_explosions);
    for shape in engine.shapes() {
        assert!(shape.pos.is_finite());
        assert!(shape.vel.is_finite());
    }
}

#[test]
fn special_animation_runs_to_completion() {
    let mut engine = CyberScape::with_seed(640.0, 480.0, SimulationConfig::default(), 5);
    let mut surface = Surface::new(640, 480);
    let input = FrameInput::new(640.0, 480.0);

    engine.trigger_special_animation(320.0, 240.0);
    assert!(engine.is_animating());
    run(&mut engine, &mut surface, &input, 3, 0.0);
    assert!(engine.stats().datastream_particles > 0);

    run(&mut engine, &mut surface, &input, 60, 200.0);
    assert!(!engine.is_animating());
}

/// Six shapes spread across a 1280 px wide viewport, the last two overlapping.
fn spread_with_overlapping_tail(engine: &mut CyberScape) -> usize {
    let last = engine.shapes().len() - 1;
    for (i, shape) in engine.shapes_mut().iter_mut().enumerate() {
        shape.pos = Vec3::new(-600.0 + i as f32 * 220.0, 0.0, 0.0);
        shape.vel = Vec3::ZERO;
    }
    let tail_x = engine.shapes()[last].pos.x;
    engine.shapes_mut()[last - 1].pos.x = tail_x - 5.0;
    last
}

#[test]
fn scheduled_respawn_brings_shapes_back() {
    let mut engine = CyberScape::with_seed(1280.0, 720.0, SimulationConfig::default(), 6);
    let mut surface = Surface::new(1280, 720);
    let input = FrameInput::new(1280.0, 720.0);

    let last = spread_with_overlapping_tail(&mut engine);
    engine.render_frame(0.0, &input, &mut surface);
    assert_eq!(engine.stats().exploded_shapes, 2);
    let generations = [engine.shapes()[last - 1].generation(), engine.shapes()[last].generation()];

    // respawn delay is at most 10 s
    run(&mut engine, &mut surface, &input, 260, 0.0);
    assert!(engine.shapes()[last - 1].generation() > generations[0]);
    assert!(engine.shapes()[last].generation() > generations[1]);
}

#[test]
fn shrinking_the_viewport_drops_shapes_and_their_tasks() {
    let mut engine = CyberScape::with_seed(1280.0, 720.0, SimulationConfig::default(), 8);
    let mut surface = Surface::new(1280, 720);
    assert_eq!(engine.shapes().len(), 6);

    spread_with_overlapping_tail(&mut engine);
    engine.render_frame(0.0, &FrameInput::new(1280.0, 720.0), &mut surface);
    let pending = engine.stats().pending_tasks;
    assert!(pending > 0);

    engine.render_frame(100.0, &FrameInput::new(600.0, 720.0), &mut surface);
    assert_eq!(engine.shapes().len(), 5);
    assert!(engine.stats().pending_tasks < pending);
}

#[test]
fn shutdown_is_clean_after_activity() {
    let mut engine = CyberScape::with_seed(800.0, 600.0, SimulationConfig::default(), 9);
    let mut surface = Surface::new(800, 600);
    let input = FrameInput::new(800.0, 600.0);
    engine.trigger_special_animation(100.0, 100.0);
    run(&mut engine, &mut surface, &input, 20, 0.0);

    engine.shutdown();
    let stats = engine.stats();
    assert_eq!(stats.particles, 0);
    assert_eq!(stats.connections, 0);
    assert_eq!(stats.pending_tasks, 0);
    assert_eq!(stats.datastream_particles, 0);
    assert_eq!(stats.explosion_particles, 0);
    assert!(!engine.is_animating());
}

#[test]
fn throttling_shrinks_the_live_scene() {
    let mut cfg = SimulationConfig::default();
    cfg.particles.spawn_chance = 1.0;
    let mut engine = CyberScape::with_seed(1024.0, 768.0, cfg, 21);
    let mut surface = Surface::new(1024, 768);
    let input = FrameInput::new(1024.0, 768.0);

    // just under 30 fps, inside the threshold
    let mut now = 0.0;
    for _ in 0..500 {
        now += 1000.0 / 30.0 + 0.5;
        engine.render_frame(now, &input, &mut surface);
    }
    let before = engine.stats();
    assert_eq!(before.performance_level, 1.0);
    assert_eq!(before.shapes, 6);
    assert!(before.particles >= engine.particle_target());
    assert!(before.connections > 0);

    // 10 fps walks the level down to zero
    for _ in 0..300 {
        let level = engine.stats().performance_level;
        now += 100.0;
        engine.render_frame(now, &input, &mut surface);
        let stats = engine.stats();
        if stats.performance_level < level {
            assert!(stats.particles <= engine.particle_target() + stats.shapes);
            assert_eq!(stats.shapes, engine.config().shape_count(1024.0));
            assert!(stats.connections <= engine.config().connections.max_connections);
        }
    }

    let after = engine.stats();
    assert_eq!(after.performance_level, 0.0);
    assert_eq!(engine.particle_target(), 0);
    assert!(after.particles <= engine.particle_target());
    assert_eq!(after.shapes, 0);
    assert_eq!(after.connections, 0);
    assert!(after.particles < before.particles);
    assert!(after.shapes < before.shapes);
    assert!(after.connections < before.connections);
}
