//! Simulation configuration for CyberScape
//! One live parameter table owned by the engine and borrowed by every component

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Viewports at or below this width count as mobile.
pub const MOBILE_WIDTH_THRESHOLD: f32 = 768.0;

// ============================================================================
// Render / Frame pacing
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    pub target_fps: f32,
    /// Derived: 1000 / target_fps. Recomputed on every update.
    pub frame_time_ms: f32,
    /// Fixed simulation step used for ages and countdowns (one frame at 60 FPS)
    pub age_step_ms: f32,
    /// Cleared into the surface at the start of every rendered frame
    pub background: [u8; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            frame_time_ms: 1000.0 / 30.0,
            age_step_ms: 16.0,
            background: [6, 4, 14, 255],
        }
    }
}

// ============================================================================
// Particles
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ParticleConfig {
    /// Pre-allocated capacity of the regular particle pool
    pub pool_size: usize,
    /// Density of the active population (particles per square pixel)
    pub particles_per_pixel: f32,
    /// Lower bound of the active population regardless of viewport size
    pub base_count: usize,
    pub min_speed: f32,
    pub max_speed: f32,
    pub size_min: f32,
    pub size_max: f32,
    /// `None` means particles never age out
    pub lifespan_ms: Option<f32>,
    pub max_appearance_delay_ms: f32,
    /// Per-frame chance of fetching one more particle while below target
    pub spawn_chance: f32,
    /// Full width of the per-axis velocity jitter
    pub jitter: f32,
    pub wrap_buffer: f32,
    /// Half-extent of the depth range particles and shapes wrap through
    pub depth_range: f32,
    pub shape_interaction_radius: f32,
    pub shape_interaction_force: f32,
    /// Full width of the rotation-speed nudge applied to nearby shapes
    pub shape_rotation_nudge: f32,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            pool_size: 500,
            particles_per_pixel: 1.0 / 2000.0,
            base_count: 100,
            min_speed: 0.1,
            max_speed: 0.5,
            size_min: 1.5,
            size_max: 3.5,
            lifespan_ms: None,
            max_appearance_delay_ms: 5000.0,
            spawn_chance: 0.1,
            jitter: 0.01,
            wrap_buffer: 200.0,
            depth_range: 300.0,
            shape_interaction_radius: 100.0,
            shape_interaction_force: 0.01,
            shape_rotation_nudge: 0.001,
        }
    }
}

// ============================================================================
// Collision bursts
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct BurstConfig {
    pub pool_size: usize,
    pub lifespan_ms: f32,
    pub fade_out_ms: f32,
    /// Velocity multiplier applied every frame
    pub slowdown: f32,
    pub sparkle_decay: f32,
    /// Tint of explosion particles, as a hex string
    pub color: String,
    pub min_speed: f32,
    pub max_speed: f32,
    pub size_min: f32,
    pub size_max: f32,
    pub distortion_radius: f32,
    pub distortion_factor: f32,
    pub web_max_distance: f32,
    pub web_links_per_particle: usize,
    pub web_max_links: usize,
    pub web_alpha: f32,
    pub max_explosion_particles: usize,
    pub max_simultaneous_explosions: usize,
    pub explosion_cooldown_ms: f64,
    pub particles_per_explosion: usize,
    pub explosion_lifespan_ms: f32,
    pub explosion_fade_out_ms: f32,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            pool_size: 200,
            lifespan_ms: 3000.0,
            fade_out_ms: 2000.0,
            slowdown: 0.98,
            sparkle_decay: 0.02,
            color: "#ff75d8".to_string(),
            min_speed: 1.0,
            max_speed: 3.0,
            size_min: 1.0,
            size_max: 3.0,
            distortion_radius: 100.0,
            distortion_factor: 0.1,
            web_max_distance: 50.0,
            web_links_per_particle: 3,
            web_max_links: 50,
            web_alpha: 0.5,
            max_explosion_particles: 100,
            max_simultaneous_explosions: 3,
            explosion_cooldown_ms: 2000.0,
            particles_per_explosion: 10,
            explosion_lifespan_ms: 2000.0,
            explosion_fade_out_ms: 2000.0,
        }
    }
}

// ============================================================================
// Shapes
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ShapeConfig {
    pub count: usize,
    pub mobile_count: usize,
    /// Bounding radius used for collisions
    pub radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub lifespan_min_ms: f32,
    pub lifespan_max_ms: f32,
    pub fade_in_ms: f32,
    pub fade_out_ms: f32,
    pub glow_min: f32,
    pub glow_max: f32,
    /// Rotation speeds are drawn from +/- this value per axis
    pub rotation_speed: f32,
    pub color_transition_speed: f32,
    pub scale_step: f32,
    /// Full width of the random per-frame Z drift
    pub z_drift: f32,
    pub jitter: f32,
    pub cursor_radius: f32,
    pub cursor_force: f32,
    pub particle_interaction_radius: f32,
    pub particle_interaction_force: f32,
    /// Per-frame chance that a live shape sheds a particle
    pub emission_chance: f32,
    pub emitted_lifespan_ms: f32,
    pub flash_duration_ms: f64,
    pub flash_glow_boost: f32,
    pub flash_color: String,
    pub pulse_scale: f32,
    pub fade_scale: f32,
    pub max_respawn_delay_ms: f64,
    pub line_width: f32,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            count: 6,
            mobile_count: 5,
            radius: 27.0,
            min_speed: 0.05,
            max_speed: 0.3,
            lifespan_min_ms: 10000.0,
            lifespan_max_ms: 25000.0,
            fade_in_ms: 1000.0,
            fade_out_ms: 3000.0,
            glow_min: 15.0,
            glow_max: 25.0,
            rotation_speed: 0.005,
            color_transition_speed: 0.01,
            scale_step: 0.02,
            z_drift: 0.005,
            jitter: 0.005,
            cursor_radius: 300.0,
            cursor_force: 0.01,
            particle_interaction_radius: 100.0,
            particle_interaction_force: 0.005,
            emission_chance: 0.01,
            emitted_lifespan_ms: 1000.0,
            flash_duration_ms: 200.0,
            flash_glow_boost: 10.0,
            flash_color: "#ff00ff".to_string(),
            pulse_scale: 1.2,
            fade_scale: 0.8,
            max_respawn_delay_ms: 10000.0,
            line_width: 2.0,
        }
    }
}

// ============================================================================
// Pairwise interaction
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct InteractionConfig {
    pub cursor_influence_radius: f32,
    pub cursor_force: f32,
    pub center_attraction_force: f32,
    pub attraction_radius: f32,
    pub repulsion_radius: f32,
    pub attraction_force: f32,
    pub repulsion_force: f32,
    /// Cell edge of the collision hash grid
    pub collision_grid_size: f32,
    /// Per-axis velocity clamp applied after a collision response
    pub max_collision_velocity: f32,
    pub color_influence_radius: f32,
    pub color_blend_rate: f32,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            cursor_influence_radius: 300.0,
            cursor_force: 0.01,
            center_attraction_force: 0.005,
            attraction_radius: 200.0,
            repulsion_radius: 80.0,
            attraction_force: 0.0005,
            repulsion_force: 0.001,
            collision_grid_size: 100.0,
            max_collision_velocity: 2.0,
            color_influence_radius: 150.0,
            color_blend_rate: 0.05,
        }
    }
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub particle_distance: f32,
    pub shape_distance: f32,
    pub animation_duration_ms: f64,
    pub min_delay_ms: f64,
    pub max_delay_ms: f64,
    /// Upper bound on simultaneously tracked connections
    pub max_connections: usize,
    /// Opacity lost per frame by a connection whose pair drifted apart
    pub decay_step: f32,
    pub line_alpha: f32,
    pub shape_line_alpha: f32,
    /// Octree query box half-extent relative to `particle_distance`
    pub query_scale: f32,
    pub octree_max_objects: usize,
    pub octree_max_depth: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            particle_distance: 100.0,
            shape_distance: 120.0,
            animation_duration_ms: 1000.0,
            min_delay_ms: 100.0,
            max_delay_ms: 500.0,
            max_connections: 400,
            decay_step: 0.01,
            line_alpha: 0.7,
            shape_line_alpha: 0.1,
            query_scale: 1.5,
            octree_max_objects: 8,
            octree_max_depth: 8,
        }
    }
}

// ============================================================================
// Glitch / post-processing
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct GlitchConfig {
    pub enabled: bool,
    pub interval_min_ms: f64,
    pub interval_max_ms: f64,
    pub duration_min_ms: f64,
    pub duration_max_ms: f64,
    pub intensity_min: f32,
    pub intensity_max: f32,
    /// Largest RGB channel offset in pixels at full intensity
    pub max_amount: f32,
    pub displacement_threshold_factor: f32,
    /// Largest inversion displacement in pixels
    pub max_displacement: usize,
    pub max_lines: usize,
    pub max_slices: usize,
    pub max_blocks: usize,
    pub noise_factor: f32,
    pub scanline_alpha: f32,
    /// Chromatic offset in pixels per unit of envelope
    pub chromatic_scale: f32,
    /// CRT strength per unit of envelope
    pub crt_scale: f32,
    pub crt_bend: f32,
    pub crt_scanline_darkening: f32,
    pub crt_vignette_alpha: f32,
}

impl Default for GlitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_min_ms: 10000.0,
            interval_max_ms: 20000.0,
            duration_min_ms: 100.0,
            duration_max_ms: 400.0,
            intensity_min: 0.3,
            intensity_max: 1.0,
            max_amount: 15.0,
            displacement_threshold_factor: 0.2,
            max_displacement: 200,
            max_lines: 30,
            max_slices: 8,
            max_blocks: 5,
            noise_factor: 0.2,
            scanline_alpha: 0.05,
            chromatic_scale: 15.0,
            crt_scale: 0.5,
            crt_bend: 0.1,
            crt_scanline_darkening: 0.8,
            crt_vignette_alpha: 0.7,
        }
    }
}

// ============================================================================
// Datastream (special animation)
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct DatastreamConfig {
    pub max_particles: usize,
    pub particle_lifespan_ms: f32,
    pub particle_fade_out_ms: f32,
    pub progress_step: f32,
    /// Particles are only emitted while progress is below this value
    pub emission_window: f32,
    pub particles_per_frame: usize,
    pub ring_count: usize,
    pub max_radius_factor: f32,
    pub noise_size: u32,
    pub noise_radius_factor: f32,
    pub energy_lines: usize,
    pub rotation_boost: f32,
    pub push_factor: f32,
}

impl Default for DatastreamConfig {
    fn default() -> Self {
        Self {
            max_particles: 100,
            particle_lifespan_ms: 2000.0,
            particle_fade_out_ms: 500.0,
            progress_step: 0.02,
            emission_window: 0.1,
            particles_per_frame: 10,
            ring_count: 5,
            max_radius_factor: 0.4,
            noise_size: 4,
            noise_radius_factor: 0.2,
            energy_lines: 20,
            rotation_boost: 0.1,
            push_factor: 0.01,
        }
    }
}

// ============================================================================
// Adaptive performance
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    pub enabled: bool,
    /// Floor for the frame rate the controller aims at
    pub min_fps: f32,
    pub check_interval_ms: f64,
    pub sample_window: usize,
    /// Mean FPS must miss the target by more than this before the level moves
    pub fps_threshold: f32,
    pub level_step: f32,
    pub particle_scale_factor: f32,
    pub effects_scale_factor: f32,
    pub mobile_reduction_factor: f32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_fps: 24.0,
            check_interval_ms: 1000.0,
            sample_window: 60,
            fps_threshold: 5.0,
            level_step: 0.1,
            particle_scale_factor: 1.0,
            effects_scale_factor: 1.0,
            mobile_reduction_factor: 0.8,
        }
    }
}

// ============================================================================
// Main configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub render: RenderConfig,
    pub particles: ParticleConfig,
    pub bursts: BurstConfig,
    pub shapes: ShapeConfig,
    pub interaction: InteractionConfig,
    pub connections: ConnectionConfig,
    pub glitch: GlitchConfig,
    pub datastream: DatastreamConfig,
    pub performance: PerformanceConfig,
}

impl SimulationConfig {
    /// Apply a change and recompute every derived value.
    ///
    /// ```
    /// let mut cfg = cyberscape::config::SimulationConfig::default();
    /// cfg.update(|c| c.render.target_fps = 60.0);
    /// assert!((cfg.render.frame_time_ms - 1000.0 / 60.0).abs() < 1e-4);
    /// ```
    pub fn update(&mut self, change: impl FnOnce(&mut Self)) {
        change(self);
        self.recompute_derived();
    }

    /// Merge a partial JSON document into the live table.
    ///
    /// Objects are merged key by key, every other value replaces the current one.
    pub fn update_from_json(&mut self, patch: &str) -> Result<()> {
        let patch: serde_json::Value = serde_json::from_str(patch)?;
        let mut current = serde_json::to_value(&*self)?;
        merge_json(&mut current, patch);
        *self = serde_json::from_value(current)?;
        self.recompute_derived();
        Ok(())
    }

    pub fn recompute_derived(&mut self) {
        let fps = self.render.target_fps.max(1.0);
        self.render.frame_time_ms = 1000.0 / fps;
    }

    /// Active particle target for a viewport.
    pub fn calculate_particle_count(&self, width: f32, height: f32) -> usize {
        let area = (width.max(0.0) * height.max(0.0)) as f64;
        let by_density = (area * self.particles.particles_per_pixel as f64).floor() as usize;
        let mut count = by_density.max(self.particles.base_count) as f32;

        if width <= MOBILE_WIDTH_THRESHOLD {
            count *= self.performance.mobile_reduction_factor;
        }
        count *= self.performance.particle_scale_factor;

        (count.floor() as usize).min(self.particles.pool_size)
    }

    pub fn shape_count(&self, width: f32) -> usize {
        if width <= MOBILE_WIDTH_THRESHOLD {
            self.shapes.mobile_count
        } else {
            self.shapes.count
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&json)?;
        config.recompute_derived();
        Ok(config)
    }
}

fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CyberscapeError;

    #[test]
    fn test_update_recomputes_frame_time() {
        let mut cfg = SimulationConfig::default();
        cfg.update(|c| c.render.target_fps = 30.0);
        assert!((cfg.render.frame_time_ms - 1000.0 / 30.0).abs() < 1e-4);
        assert_eq!(cfg.particles, ParticleConfig::default());
        assert_eq!(cfg.shapes, ShapeConfig::default());
    }

    #[test]
    fn test_json_patch_keeps_unrelated_fields() {
        let mut cfg = SimulationConfig::default();
        cfg.update_from_json(r#"{"render": {"target_fps": 60}, "shapes": {"count": 3}}"#)
            .unwrap();
        assert!((cfg.render.frame_time_ms - 1000.0 / 60.0).abs() < 1e-4);
        assert_eq!(cfg.shapes.count, 3);
        assert_eq!(cfg.shapes.mobile_count, 5);
        assert_eq!(cfg.glitch, GlitchConfig::default());
    }

    #[test]
    fn test_bad_json_patch_leaves_config_untouched() {
        let mut cfg = SimulationConfig::default();
        assert!(cfg.update_from_json("{not json").is_err());
        assert!(cfg.update_from_json(r#"{"shapes": {"count": "many"}}"#).is_err());
        assert_eq!(cfg, SimulationConfig::default());
    }

    #[test]
    fn test_particle_count_has_floor_and_mobile_reduction() {
        let cfg = SimulationConfig::default();
        // 1920 * 1080 / 2000 = 1036, capped by the pool
        assert_eq!(cfg.calculate_particle_count(1920.0, 1080.0), 500);
        // density below the base count falls back to it
        assert_eq!(cfg.calculate_particle_count(800.0, 200.0), 100);
        assert_eq!(cfg.calculate_particle_count(400.0, 200.0), 80);
    }

    #[test]
    fn test_shape_count_by_width() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.shape_count(1280.0), 6);
        assert_eq!(cfg.shape_count(600.0), 5);
    }

    #[test]
    fn test_persistence_errors_are_typed() {
        let missing = std::env::temp_dir().join("cyberscape-no-such-dir").join("config.json");
        assert!(matches!(SimulationConfig::load(&missing), Err(CyberscapeError::Io(_))));

        let mut cfg = SimulationConfig::default();
        assert!(matches!(cfg.update_from_json("{not json"), Err(CyberscapeError::Json(_))));
    }

    #[test]
    fn test_partial_document_deserializes() {
        let cfg: SimulationConfig =
            serde_json::from_str(r#"{"particles": {"base_count": 7}}"#).unwrap();
        assert_eq!(cfg.particles.base_count, 7);
        assert_eq!(cfg.particles.pool_size, 500);
    }
}
