//! Raster surface the engine paints into
//!
//! Wraps an `RgbaImage` in imageproc's `Blend` canvas so every primitive is
//! alpha-composited like a 2D canvas. Post-processing reads and writes the
//! raw RGBA bytes directly.

use glam::Vec2;
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut,
    Blend,
};
use imageproc::rect::Rect;

use crate::color::Color;

pub struct Surface {
    canvas: Blend<RgbaImage>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Blend(RgbaImage::new(width.max(1), height.max(1))),
        }
    }

    pub fn width(&self) -> u32 {
        self.canvas.0.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.0.height()
    }

    /// Reallocate when the viewport changed. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if self.width() != width || self.height() != height {
            self.canvas = Blend(RgbaImage::new(width, height));
        }
    }

    pub fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.canvas.0.pixels_mut() {
            *pixel = color;
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas.0
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.canvas.0
    }

    pub fn into_image(self) -> RgbaImage {
        self.canvas.0
    }

    pub fn fill_circle(&mut self, center: Vec2, radius: f32, color: Rgba<u8>) {
        if !center.is_finite() || color[3] == 0 {
            return;
        }
        let r = radius.round().max(1.0) as i32;
        draw_filled_circle_mut(
            &mut self.canvas,
            (center.x.round() as i32, center.y.round() as i32),
            r,
            color,
        );
    }

    pub fn stroke_circle(&mut self, center: Vec2, radius: f32, color: Rgba<u8>) {
        if !center.is_finite() || radius < 1.0 || color[3] == 0 {
            return;
        }
        draw_hollow_circle_mut(
            &mut self.canvas,
            (center.x.round() as i32, center.y.round() as i32),
            radius.round() as i32,
            color,
        );
    }

    /// Line of roughly `width` pixels, built from parallel one-pixel strokes.
    pub fn stroke_line(&mut self, from: Vec2, to: Vec2, color: Rgba<u8>, width: f32) {
        if !from.is_finite() || !to.is_finite() || color[3] == 0 {
            return;
        }
        draw_line_segment_mut(&mut self.canvas, (from.x, from.y), (to.x, to.y), color);

        let extra = (width.round() as i32 - 1).max(0);
        if extra == 0 {
            return;
        }
        let normal = (to - from).perp().normalize_or_zero();
        if normal == Vec2::ZERO {
            return;
        }
        for i in 1..=extra {
            // Alternate sides so the stroke stays centered.
            let side = if i % 2 == 1 { 1.0 } else { -1.0 };
            let offset = normal * side * ((i + 1) / 2) as f32;
            let (a, b) = (from + offset, to + offset);
            draw_line_segment_mut(&mut self.canvas, (a.x, a.y), (b.x, b.y), color);
        }
    }

    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Rgba<u8>) {
        if width == 0 || height == 0 || color[3] == 0 {
            return;
        }
        draw_filled_rect_mut(&mut self.canvas, Rect::at(x, y).of_size(width, height), color);
    }

    /// Soft radial halo, the raster stand-in for a canvas shadow blur.
    pub fn glow(&mut self, center: Vec2, radius: f32, color: Color, alpha: f32) {
        if radius <= 0.1 || alpha <= 0.0 || !center.is_finite() {
            return;
        }
        let image = &mut self.canvas.0;
        let (w, h) = (image.width() as f32, image.height() as f32);

        let min_x = (center.x - radius).floor().max(0.0);
        let max_x = (center.x + radius).ceil().min(w - 1.0);
        let min_y = (center.y - radius).floor().max(0.0);
        let max_y = (center.y + radius).ceil().min(h - 1.0);
        if min_x > max_x || min_y > max_y {
            return;
        }

        let radius_sq = radius * radius;
        for py in min_y as u32..=max_y as u32 {
            for px in min_x as u32..=max_x as u32 {
                let dx = px as f32 - center.x;
                let dy = py as f32 - center.y;
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius_sq {
                    continue;
                }
                let t = (dist_sq.sqrt() / radius).clamp(0.0, 1.0);
                let falloff = (1.0 - t).powf(1.8);
                let a = (alpha * falloff).clamp(0.0, 1.0);
                if a < 1.0 / 255.0 {
                    continue;
                }
                image.get_pixel_mut(px, py).blend(&color.with_alpha(a));
            }
        }
    }
}
