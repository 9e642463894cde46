//! Cyberpunk color helpers
//! Hue ranges, palette, hex parsing and channel blending

use image::Rgba;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cyan to neon blue, then neon purple to bright magenta (degrees).
pub const HUE_RANGES: [(f32, f32); 2] = [(180.0, 220.0), (270.0, 330.0)];

pub const CYBERPUNK_PALETTE: [&str; 8] = [
    "#00fff0", "#ff00ff", "#a259ff", "#ff75d8", "#00ffff", "#4b0082", "#8a2be2", "#483d8b",
];

/// Used when a connection endpoint has no usable color.
pub const FALLBACK_LINK_COLOR: Color = Color::new(200, 100, 255);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::new(255, 255, 255);
    pub const MAGENTA: Color = Color::new(255, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        hex_to_rgb(hex)
    }

    pub fn to_hex(self) -> String {
        rgb_to_hex(self)
    }

    /// Straight-alpha pixel for the raster surface.
    pub fn with_alpha(self, alpha: f32) -> Rgba<u8> {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([self.r, self.g, self.b, a])
    }

    /// Per-channel linear interpolation, rounded to nearest.
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let mix = |a: u8, b: u8| (a as f32 * (1.0 - t) + b as f32 * t).round().clamp(0.0, 255.0) as u8;
        Color::new(mix(self.r, other.r), mix(self.g, other.g), mix(self.b, other.b))
    }

    /// Step toward `target` by `rate` of the remaining distance.
    /// Rounding never stalls short of the target.
    pub fn ease_toward(self, target: Color, rate: f32) -> Color {
        let step = |a: u8, b: u8| {
            let next = (a as f32 + (b as f32 - a as f32) * rate).round() as i32;
            if next == a as i32 && a != b {
                (a as i32 + (b as i32 - a as i32).signum()) as u8
            } else {
                next.clamp(0, 255) as u8
            }
        };
        Color::new(step(self.r, target.r), step(self.g, target.g), step(self.b, target.b))
    }

    /// Integer (floor) mean of two colors.
    pub fn midpoint(self, other: Color) -> Color {
        Color::new(
            ((self.r as u16 + other.r as u16) / 2) as u8,
            ((self.g as u16 + other.g as u16) / 2) as u8,
            ((self.b as u16 + other.b as u16) / 2) as u8,
        )
    }
}

pub fn random_cyberpunk_hue(rng: &mut impl Rng) -> f32 {
    let (start, end) = HUE_RANGES[rng.gen_range(0..HUE_RANGES.len())];
    rng.gen_range(start..end)
}

pub fn is_valid_cyberpunk_hue(hue: f32) -> bool {
    HUE_RANGES.iter().any(|&(start, end)| hue >= start && hue <= end)
}

pub fn random_cyberpunk_color(rng: &mut impl Rng) -> Color {
    let hex = CYBERPUNK_PALETTE[rng.gen_range(0..CYBERPUNK_PALETTE.len())];
    hex_to_rgb(hex).unwrap_or(Color::MAGENTA)
}

/// Parse `#rrggbb` or `rrggbb`, case-insensitive. Anything else is `None`.
pub fn hex_to_rgb(hex: &str) -> Option<Color> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color::new(channel(0)?, channel(2)?, channel(4)?))
}

pub fn rgb_to_hex(color: Color) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

/// Blend two hex colors; falls back to `a` when either side does not parse.
pub fn blend_colors(a: &str, b: &str, ratio: f32) -> String {
    match (hex_to_rgb(a), hex_to_rgb(b)) {
        (Some(ca), Some(cb)) => rgb_to_hex(ca.lerp(cb, ratio)),
        _ => a.to_string(),
    }
}

/// Unweighted per-channel mean, rounded. `None` for an empty slice.
pub fn average_colors(colors: &[Color]) -> Option<Color> {
    if colors.is_empty() {
        return None;
    }
    let n = colors.len() as f32;
    let (r, g, b) = colors.iter().fold((0.0f32, 0.0f32, 0.0f32), |acc, c| {
        (acc.0 + c.r as f32, acc.1 + c.g as f32, acc.2 + c.b as f32)
    });
    Some(Color::new(
        (r / n).round() as u8,
        (g / n).round() as u8,
        (b / n).round() as u8,
    ))
}

/// `rgba(r, g, b, a)` for a hex color; unparseable input is returned unchanged.
pub fn adjust_color_opacity(hex: &str, opacity: f32) -> String {
    match hex_to_rgb(hex) {
        Some(c) => format!("rgba({}, {}, {}, {})", c.r, c.g, c.b, opacity),
        None => hex.to_string(),
    }
}

/// Rotate a color's hue by `degrees`, keeping saturation and lightness.
pub fn shift_hue(color: Color, degrees: f32) -> Color {
    let (h, s, l) = rgb_to_hsl(color);
    hsl_to_rgb((h + degrees).rem_euclid(360.0), s, l)
}

/// Returns hue in degrees, saturation and lightness in 0..=1.
pub fn rgb_to_hsl(color: Color) -> (f32, f32, f32) {
    let r = color.r as f32 / 255.0;
    let g = color.g as f32 / 255.0;
    let b = color.b as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return (0.0, 0.0, l);
    }

    let d = max - min;
    let s = if l > 0.5 { d / (2.0 - max - min) } else { d / (max + min) };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };
    (h * 60.0, s, l)
}

/// Hue in degrees, saturation and lightness in 0..=1.
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> Color {
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;
    if saturation == 0.0 {
        let v = to_u8(lightness);
        return Color::new(v, v, v);
    }

    let h = hue.rem_euclid(360.0) / 360.0;
    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;

    let channel = |mut t: f32| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };

    Color::new(
        to_u8(channel(h + 1.0 / 3.0)),
        to_u8(channel(h)),
        to_u8(channel(h - 1.0 / 3.0)),
    )
}
