//! Closed-loop frame rate controller
//!
//! Keeps a sliding window of instantaneous FPS samples and, once per check
//! interval, nudges a single performance level toward whatever keeps the mean
//! near the target. Every throttled knob is the stock value times the level.

use std::collections::VecDeque;

use crate::config::SimulationConfig;

/// Stock values the level scales from, captured once.
#[derive(Clone, Debug, PartialEq)]
struct Baseline {
    particle_pool_size: usize,
    particle_base_count: usize,
    shape_count: usize,
    shape_mobile_count: usize,
    glitch_max_amount: f32,
    glitch_max_lines: usize,
    glitch_max_slices: usize,
    max_connections: usize,
    mobile_reduction_factor: f32,
    particle_scale_factor: f32,
    effects_scale_factor: f32,
}

impl Baseline {
    fn capture(cfg: &SimulationConfig) -> Self {
        Self {
            particle_pool_size: cfg.particles.pool_size,
            particle_base_count: cfg.particles.base_count,
            shape_count: cfg.shapes.count,
            shape_mobile_count: cfg.shapes.mobile_count,
            glitch_max_amount: cfg.glitch.max_amount,
            glitch_max_lines: cfg.glitch.max_lines,
            glitch_max_slices: cfg.glitch.max_slices,
            max_connections: cfg.connections.max_connections,
            mobile_reduction_factor: cfg.performance.mobile_reduction_factor,
            particle_scale_factor: cfg.performance.particle_scale_factor,
            effects_scale_factor: cfg.performance.effects_scale_factor,
        }
    }
}

fn scaled(value: usize, level: f32) -> usize {
    (value as f32 * level).round() as usize
}

pub struct PerformanceController {
    samples: VecDeque<f32>,
    level: f32,
    last_check_ms: Option<f64>,
    baseline: Baseline,
}

impl PerformanceController {
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(cfg.performance.sample_window.max(1)),
            level: 1.0,
            last_check_ms: None,
            baseline: Baseline::capture(cfg),
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    /// Mean of the current window, if any samples were taken.
    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    /// Re-capture the stock values, e.g. after the config was replaced.
    pub fn rebase(&mut self, cfg: &SimulationConfig) {
        self.baseline = Baseline::capture(cfg);
        self.level = 1.0;
        self.samples.clear();
        self.last_check_ms = None;
    }

    /// Record one frame. Returns true when the level moved and the config
    /// was rewritten.
    pub fn sample(&mut self, delta_ms: f64, now_ms: f64, cfg: &mut SimulationConfig) -> bool {
        let pc = &cfg.performance;
        if !pc.enabled || delta_ms <= 0.0 {
            return false;
        }

        self.samples.push_back((1000.0 / delta_ms) as f32);
        while self.samples.len() > pc.sample_window.max(1) {
            self.samples.pop_front();
        }

        let last = *self.last_check_ms.get_or_insert(now_ms);
        if now_ms - last < pc.check_interval_ms {
            return false;
        }
        self.last_check_ms = Some(now_ms);

        let Some(average) = self.average_fps() else {
            return false;
        };
        // never aim below the floor, even for a low render target
        let target = cfg.render.target_fps.max(pc.min_fps);
        let gap = average - target;
        if gap.abs() <= pc.fps_threshold {
            return false;
        }

        let step = if gap < 0.0 { -pc.level_step } else { pc.level_step };
        let level = (self.level + step).clamp(0.0, 1.0);
        if level == self.level {
            return false;
        }
        self.level = level;
        log::debug!("avg {:.1} fps vs target {:.1}, performance level -> {:.2}", average, target, level);
        self.apply(cfg);
        true
    }

    /// Push the baseline scaled by the current level into `cfg`.
    pub fn apply(&self, cfg: &mut SimulationConfig) {
        let b = &self.baseline;
        let level = self.level;
        cfg.update(|c| {
            c.particles.pool_size = scaled(b.particle_pool_size, level);
            c.particles.base_count = scaled(b.particle_base_count, level);
            c.shapes.count = scaled(b.shape_count, level);
            c.shapes.mobile_count = scaled(b.shape_mobile_count, level);
            c.glitch.max_amount = b.glitch_max_amount * level;
            c.glitch.max_lines = scaled(b.glitch_max_lines, level);
            c.glitch.max_slices = scaled(b.glitch_max_slices, level);
            c.connections.max_connections = scaled(b.max_connections, level);
            c.performance.mobile_reduction_factor = b.mobile_reduction_factor * level;
            c.performance.particle_scale_factor = b.particle_scale_factor * level;
            c.performance.effects_scale_factor = b.effects_scale_factor * level;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(ctl: &mut PerformanceController, cfg: &mut SimulationConfig, delta: f64, frames: usize, start: f64) -> f64 {
        let mut now = start;
        for _ in 0..frames {
            now += delta;
            ctl.sample(delta, now, cfg);
        }
        now
    }

    #[test]
    fn test_slow_frames_lower_the_level() {
        let mut cfg = SimulationConfig::default();
        let mut ctl = PerformanceController::new(&cfg);
        // 10 fps against a 30 fps target
        feed(&mut ctl, &mut cfg, 100.0, 11, 0.0);
        assert!((ctl.level() - 0.9).abs() < 1e-6);
        assert_eq!(cfg.particles.pool_size, 450);
        assert_eq!(cfg.connections.max_connections, 360);
        assert!((cfg.performance.particle_scale_factor - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_level_stays_in_range() {
        let mut cfg = SimulationConfig::default();
        let mut ctl = PerformanceController::new(&cfg);
        // 100 fps is headroom, but the level is already at the top
        let now = feed(&mut ctl, &mut cfg, 10.0, 300, 0.0);
        assert_eq!(ctl.level(), 1.0);
        assert_eq!(cfg.particles.pool_size, 500);

        feed(&mut ctl, &mut cfg, 200.0, 200, now);
        assert_eq!(ctl.level(), 0.0);
        assert_eq!(cfg.shapes.count, 0);
    }

    #[test]
    fn test_on_target_is_left_alone() {
        let mut cfg = SimulationConfig::default();
        let mut ctl = PerformanceController::new(&cfg);
        feed(&mut ctl, &mut cfg, 1000.0 / 31.0, 120, 0.0);
        assert_eq!(ctl.level(), 1.0);
        assert_eq!(cfg, SimulationConfig::default());
    }

    #[test]
    fn test_min_fps_floors_the_target() {
        let mut cfg = SimulationConfig::default();
        cfg.render.target_fps = 10.0;
        let mut ctl = PerformanceController::new(&cfg);
        // 12 fps is close to a 10 fps target but well under the 24 fps floor
        feed(&mut ctl, &mut cfg, 1000.0 / 12.0, 14, 0.0);
        assert!(ctl.level() < 1.0);

        let mut cfg = SimulationConfig::default();
        cfg.render.target_fps = 10.0;
        cfg.performance.min_fps = 0.0;
        let mut ctl = PerformanceController::new(&cfg);
        feed(&mut ctl, &mut cfg, 1000.0 / 12.0, 14, 0.0);
        assert_eq!(ctl.level(), 1.0);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut cfg = SimulationConfig::default();
        let mut ctl = PerformanceController::new(&cfg);
        feed(&mut ctl, &mut cfg, 1.0, 500, 0.0);
        assert_eq!(ctl.samples.len(), cfg.performance.sample_window);
    }
}
