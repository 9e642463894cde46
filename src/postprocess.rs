//! Post-processing for CyberScape
//! Full-frame pixel passes (glitch, chromatic aberration, CRT) and the timer
//! that decides when they run.

use image::{Rgba, RgbaImage};
use rand::Rng;
use std::f32::consts::PI;

use crate::color;
use crate::config::{GlitchConfig, SimulationConfig};
use crate::surface::Surface;

fn copy_into(scratch: &mut Vec<u8>, image: &RgbaImage) {
    scratch.clear();
    scratch.extend_from_slice(image.as_raw());
}

// ============================================================================
// Glitch
// ============================================================================

/// Channel offset, inversion displacement, vertical lines, shifted inverted
/// slices, color blocks, noise and scanlines.
#[derive(Default)]
pub struct GlitchEffect {
    source: Vec<u8>,
    slice: Vec<u8>,
}

impl GlitchEffect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, surface: &mut Surface, intensity: f32, cfg: &GlitchConfig, rng: &mut impl Rng) {
        if intensity <= 0.0 {
            return;
        }
        let (width, height) = (surface.width(), surface.height());

        self.shift_channels(surface.image_mut(), intensity, cfg);
        self.displace(surface.image_mut(), intensity, cfg, rng);
        Self::vertical_lines(surface, intensity, cfg, rng);
        self.slices(surface.image_mut(), intensity, cfg, rng);

        let blocks = (intensity * cfg.max_blocks as f32) as usize;
        for _ in 0..blocks {
            let bw = rng.gen::<f32>() * 100.0 + 20.0;
            let bh = rng.gen::<f32>() * 100.0 + 20.0;
            let x = rng.gen::<f32>() * (width as f32 - bw);
            let y = rng.gen::<f32>() * (height as f32 - bh);
            let tint = color::hsl_to_rgb(rng.gen::<f32>() * 360.0, 1.0, 0.5);
            let alpha = rng.gen::<f32>() * 0.5 + 0.2;
            surface.fill_rect(x as i32, y as i32, bw as u32, bh as u32, tint.with_alpha(alpha));
        }

        let noise = intensity * cfg.noise_factor;
        for px in surface.image_mut().pixels_mut() {
            if rng.gen::<f32>() < noise {
                let v = rng.gen::<u8>();
                px[0] = v;
                px[1] = v;
                px[2] = v;
            }
        }

        let scan = Rgba([0, 0, 0, (cfg.scanline_alpha * intensity * 255.0).round() as u8]);
        for y in (0..height).step_by(2) {
            surface.fill_rect(0, y as i32, width, 1, scan);
        }
    }

    /// Red sampled `amount` pixels ahead, blue `amount` behind, green kept.
    fn shift_channels(&mut self, image: &mut RgbaImage, intensity: f32, cfg: &GlitchConfig) {
        let amount = (intensity * cfg.max_amount) as usize * 4;
        if amount == 0 {
            return;
        }
        copy_into(&mut self.source, image);
        let src = &self.source;
        let len = src.len();
        for (i, px) in image.as_mut().chunks_exact_mut(4).enumerate() {
            let base = i * 4;
            if base + amount < len {
                px[0] = src[base + amount];
            }
            if base >= amount {
                px[2] = src[base - amount + 2];
            }
        }
    }

    /// Random pixels take the inverted color of a pixel further along.
    fn displace(&mut self, image: &mut RgbaImage, intensity: f32, cfg: &GlitchConfig, rng: &mut impl Rng) {
        let threshold = intensity * cfg.displacement_threshold_factor;
        if threshold <= 0.0 {
            return;
        }
        copy_into(&mut self.source, image);
        let src = &self.source;
        let len = src.len();
        for (i, px) in image.as_mut().chunks_exact_mut(4).enumerate() {
            if rng.gen::<f32>() >= threshold {
                continue;
            }
            let from = (i + rng.gen_range(0..=cfg.max_displacement)) * 4;
            if from + 2 < len {
                px[0] = 255 - src[from];
                px[1] = 255 - src[from + 1];
                px[2] = 255 - src[from + 2];
            }
        }
    }

    /// Full-height lines with a three-stop hue gradient.
    fn vertical_lines(surface: &mut Surface, intensity: f32, cfg: &GlitchConfig, rng: &mut impl Rng) {
        const BANDS: u32 = 16;
        let lines = (intensity * cfg.max_lines as f32) as usize;
        let (width, height) = (surface.width(), surface.height());
        let alpha = intensity * 0.8;
        let band = height.div_ceil(BANDS).max(1);

        for _ in 0..lines {
            let x = (rng.gen::<f32>() * width as f32) as i32;
            let line_width = (rng.gen::<f32>() * 5.0 + 1.0) as u32;
            let stops = [
                color::hsl_to_rgb(rng.gen::<f32>() * 360.0, 1.0, 0.5),
                color::hsl_to_rgb(rng.gen::<f32>() * 360.0, 1.0, 0.5),
                color::hsl_to_rgb(rng.gen::<f32>() * 360.0, 1.0, 0.5),
            ];
            for b in 0..BANDS {
                let t = (b as f32 + 0.5) / BANDS as f32;
                let tint = if t < 0.5 {
                    stops[0].lerp(stops[1], t * 2.0)
                } else {
                    stops[1].lerp(stops[2], (t - 0.5) * 2.0)
                };
                surface.fill_rect(x, (b * band) as i32, line_width, band, tint.with_alpha(alpha));
            }
        }
    }

    /// Horizontal bands inverted and written back shifted sideways.
    fn slices(&mut self, image: &mut RgbaImage, intensity: f32, cfg: &GlitchConfig, rng: &mut impl Rng) {
        let count = (intensity * cfg.max_slices as f32) as usize;
        let (width, height) = (image.width() as i64, image.height() as i64);
        let stride = (width * 4) as usize;

        for _ in 0..count {
            let y0 = (rng.gen::<f32>() * height as f32) as i64;
            let rows = (rng.gen::<f32>() * 20.0 + 2.0) as i64;
            let shift = ((rng.gen::<f32>() - 0.5) * 40.0 * intensity) as i64;
            let y1 = (y0 + rows).min(height);
            if y0 >= y1 {
                continue;
            }

            let raw = image.as_mut();
            self.slice.clear();
            self.slice.extend_from_slice(&raw[y0 as usize * stride..y1 as usize * stride]);

            for (row, y) in (y0..y1).enumerate() {
                for x in 0..width {
                    let dx = x + shift;
                    if dx < 0 || dx >= width {
                        continue;
                    }
                    let s = row * stride + x as usize * 4;
                    let d = y as usize * stride + dx as usize * 4;
                    raw[d] = 255 - self.slice[s];
                    raw[d + 1] = 255 - self.slice[s + 1];
                    raw[d + 2] = 255 - self.slice[s + 2];
                    raw[d + 3] = self.slice[s + 3];
                }
            }
        }
    }
}

// ============================================================================
// Chromatic aberration
// ============================================================================

#[derive(Default)]
pub struct ChromaticAberration {
    source: Vec<u8>,
}

impl ChromaticAberration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Red from the left, blue from the right, each offset wobbling by row.
    /// Green and alpha are left untouched.
    pub fn apply(&mut self, image: &mut RgbaImage, offset: f32) {
        if offset == 0.0 {
            return;
        }
        let width = image.width() as usize;
        let max_x = width as f32 - 1.0;
        copy_into(&mut self.source, image);
        let src = &self.source;

        for (y, row) in image.as_mut().chunks_exact_mut(width * 4).enumerate() {
            let wobble = y as f32 * 0.1;
            let red_shift = offset * (1.0 + wobble.sin() * 0.5);
            let blue_shift = offset * (1.0 + wobble.cos() * 0.5);
            let row_start = y * width * 4;
            for x in 0..width {
                let red_x = (x as f32 - red_shift).clamp(0.0, max_x) as usize;
                let blue_x = (x as f32 + blue_shift).clamp(0.0, max_x) as usize;
                row[x * 4] = src[row_start + red_x * 4];
                row[x * 4 + 2] = src[row_start + blue_x * 4 + 2];
            }
        }
    }
}

// ============================================================================
// CRT
// ============================================================================

/// Barrel warp, scanlines and vignette.
pub struct CrtEffect {
    width: u32,
    height: u32,
    /// Normalized distance from the center, 1 at the vignette radius
    vignette_mask: Vec<f32>,
    source: Vec<u8>,
}

impl CrtEffect {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vignette_mask: Self::create_vignette_mask(width, height),
            source: Vec::new(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width != width || self.height != height {
            self.width = width;
            self.height = height;
            self.vignette_mask = Self::create_vignette_mask(width, height);
        }
    }

    fn create_vignette_mask(width: u32, height: u32) -> Vec<f32> {
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let radius = (width.max(height) as f32 / 2.0).max(1.0);
        let mut mask = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                mask.push((d / radius).min(1.0));
            }
        }
        mask
    }

    pub fn apply(&mut self, image: &mut RgbaImage, intensity: f32, cfg: &GlitchConfig) {
        self.resize(image.width(), image.height());
        let (w, h) = (self.width as usize, self.height as usize);
        let half_w = w as f32 / 2.0;
        let half_h = h as f32 / 2.0;
        let max_distance = (half_w * half_w + half_h * half_h).sqrt().max(1.0);
        let bend = cfg.crt_bend * intensity;

        copy_into(&mut self.source, image);
        let src = &self.source;
        let raw = image.as_mut();

        if bend != 0.0 {
            for y in 0..h {
                let dy = y as f32 - half_h;
                for x in 0..w {
                    let dx = x as f32 - half_w;
                    let nd = (dx * dx + dy * dy).sqrt() / max_distance;
                    let sx = x as f32 + dx * nd * bend;
                    let sy = y as f32 + dy * nd * bend;
                    if sx < 0.0 || sx >= w as f32 || sy < 0.0 || sy >= h as f32 {
                        continue;
                    }
                    let s = (sy as usize * w + sx as usize) * 4;
                    let d = (y * w + x) * 4;
                    raw[d..d + 3].copy_from_slice(&src[s..s + 3]);
                }
            }
        }

        let darken = cfg.crt_scanline_darkening;
        for row in raw.chunks_exact_mut(w * 4).step_by(2) {
            for px in row.chunks_exact_mut(4) {
                px[0] = (px[0] as f32 * darken) as u8;
                px[1] = (px[1] as f32 * darken) as u8;
                px[2] = (px[2] as f32 * darken) as u8;
            }
        }

        let edge_alpha = cfg.crt_vignette_alpha * intensity;
        if edge_alpha > 0.0 {
            for (px, &t) in raw.chunks_exact_mut(4).zip(&self.vignette_mask) {
                let keep = 1.0 - (edge_alpha * t).clamp(0.0, 1.0);
                px[0] = (px[0] as f32 * keep) as u8;
                px[1] = (px[1] as f32 * keep) as u8;
                px[2] = (px[2] as f32 * keep) as u8;
            }
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GlitchState {
    Idle,
    Glitching { intensity: f32, duration_ms: f64 },
}

/// Idle for a random interval, then glitch for a random duration with a
/// sine-shaped envelope.
pub struct GlitchScheduler {
    state: GlitchState,
    last_glitch_ms: f64,
    interval_ms: f64,
    glitch: GlitchEffect,
    chromatic: ChromaticAberration,
    crt: CrtEffect,
}

fn between(rng: &mut impl Rng, min: f64, max: f64) -> f64 {
    min + rng.gen::<f64>() * (max - min)
}

impl GlitchScheduler {
    pub fn new(width: u32, height: u32, cfg: &GlitchConfig) -> Self {
        Self {
            state: GlitchState::Idle,
            last_glitch_ms: 0.0,
            interval_ms: cfg.interval_min_ms,
            glitch: GlitchEffect::new(),
            chromatic: ChromaticAberration::new(),
            crt: CrtEffect::new(width, height),
        }
    }

    pub fn state(&self) -> GlitchState {
        self.state
    }

    /// Advance the timer and post-process `surface` when glitching.
    /// Returns the envelope that was applied, if any.
    pub fn update(
        &mut self,
        surface: &mut Surface,
        now_ms: f64,
        cfg: &SimulationConfig,
        rng: &mut impl Rng,
    ) -> Option<f32> {
        let gc = &cfg.glitch;
        if !gc.enabled {
            self.state = GlitchState::Idle;
            return None;
        }

        if self.state == GlitchState::Idle && now_ms - self.last_glitch_ms > self.interval_ms {
            let intensity = between(rng, gc.intensity_min as f64, gc.intensity_max as f64) as f32;
            let duration_ms = between(rng, gc.duration_min_ms, gc.duration_max_ms);
            self.state = GlitchState::Glitching { intensity, duration_ms };
            self.last_glitch_ms = now_ms;
            self.interval_ms = between(rng, gc.interval_min_ms, gc.interval_max_ms);
            log::trace!("glitch start: intensity {:.2} for {:.0} ms", intensity, duration_ms);
        }

        let GlitchState::Glitching { intensity, duration_ms } = self.state else {
            return None;
        };
        let progress = (now_ms - self.last_glitch_ms) / duration_ms.max(1.0);
        if progress >= 1.0 {
            self.state = GlitchState::Idle;
            return None;
        }

        let envelope = (progress as f32 * PI).sin() * intensity * cfg.performance.effects_scale_factor;
        self.glitch.apply(surface, envelope, gc, rng);
        self.chromatic.apply(surface.image_mut(), envelope * gc.chromatic_scale);
        self.crt.apply(surface.image_mut(), envelope * gc.crt_scale, gc);
        Some(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x * 10) as u8, (y * 10) as u8, (x * 7 + y) as u8, 200])
        })
    }

    #[test]
    fn test_chromatic_keeps_green_and_alpha() {
        let before = gradient(20, 10);
        let mut image = before.clone();
        ChromaticAberration::new().apply(&mut image, 4.0);
        let mut red_moved = false;
        for (a, b) in before.pixels().zip(image.pixels()) {
            assert_eq!(a[1], b[1]);
            assert_eq!(a[3], b[3]);
            red_moved |= a[0] != b[0];
        }
        assert!(red_moved);

        let mut untouched = before.clone();
        ChromaticAberration::new().apply(&mut untouched, 0.0);
        assert_eq!(untouched, before);
    }

    #[test]
    fn test_crt_at_zero_intensity_only_darkens_even_rows() {
        let cfg = GlitchConfig::default();
        let mut image = RgbaImage::from_pixel(6, 4, Rgba([100, 100, 100, 255]));
        CrtEffect::new(6, 4).apply(&mut image, 0.0, &cfg);
        assert_eq!(image.get_pixel(3, 0), &Rgba([80, 80, 80, 255]));
        assert_eq!(image.get_pixel(3, 1), &Rgba([100, 100, 100, 255]));
        assert_eq!(image.get_pixel(3, 2), &Rgba([80, 80, 80, 255]));
    }

    #[test]
    fn test_crt_vignette_darkens_corners_more() {
        let cfg = GlitchConfig::default();
        let mut image = RgbaImage::from_pixel(21, 21, Rgba([200, 200, 200, 255]));
        let mut crt = CrtEffect::new(4, 4);
        crt.apply(&mut image, 1.0, &cfg);
        // odd rows skip the scanline pass
        assert!(image.get_pixel(10, 11)[0] > image.get_pixel(0, 1)[0]);
    }

    #[test]
    fn test_glitch_at_zero_intensity_is_identity() {
        let cfg = GlitchConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut surface = Surface::new(32, 16);
        surface.image_mut().clone_from(&gradient(32, 16));
        let before = surface.image().clone();
        GlitchEffect::new().apply(&mut surface, 0.0, &cfg, &mut rng);
        assert_eq!(surface.image(), &before);
    }

    #[test]
    fn test_glitch_changes_the_frame() {
        let cfg = GlitchConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut surface = Surface::new(64, 64);
        surface.image_mut().clone_from(&gradient(64, 64));
        let before = surface.image().clone();
        GlitchEffect::new().apply(&mut surface, 1.0, &cfg, &mut rng);
        assert_ne!(surface.image(), &before);
    }

    #[test]
    fn test_scheduler_cycles_idle_glitch_idle() {
        let cfg = SimulationConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut surface = Surface::new(16, 16);
        let mut scheduler = GlitchScheduler::new(16, 16, &cfg.glitch);

        assert_eq!(scheduler.update(&mut surface, 1000.0, &cfg, &mut rng), None);
        assert_eq!(scheduler.state(), GlitchState::Idle);

        let start = cfg.glitch.interval_min_ms + 1.0;
        // the envelope is zero at the very start
        assert_eq!(scheduler.update(&mut surface, start, &cfg, &mut rng), Some(0.0));
        let GlitchState::Glitching { intensity, duration_ms } = scheduler.state() else {
            panic!("expected a glitch to start");
        };
        assert!(intensity >= cfg.glitch.intensity_min && intensity <= cfg.glitch.intensity_max);

        let peak = scheduler.update(&mut surface, start + duration_ms / 2.0, &cfg, &mut rng);
        assert!((peak.unwrap_or(0.0) - intensity).abs() < 1e-3);

        assert_eq!(scheduler.update(&mut surface, start + duration_ms + 1.0, &cfg, &mut rng), None);
        assert_eq!(scheduler.state(), GlitchState::Idle);
    }
}
