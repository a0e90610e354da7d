//! Color parsing and color-space utilities
//!
//! Provides:
//! - Hex parsing for palette entries (`#RGB`, `#RGBA`, `#RRGGBB`, `#RRGGBBAA`,
//!   with or without the leading `#`, as served by the canvas API)
//! - sRGB gamma expansion/compression
//! - CIE Lab (D65) conversion and the CIEDE2000 color difference

use image::Rgba;
use thiserror::Error;

/// Error type for color parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string was empty
    #[error("empty color string")]
    Empty,
    /// Invalid length (must be 3, 4, 6, or 8 hex chars)
    #[error("invalid color length {0}, expected 3, 4, 6, or 8")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
}

/// Parse a hex color string into an RGBA color.
///
/// The leading `#` is optional. Short forms double each digit.
///
/// # Examples
///
/// ```
/// use pxtrack::color::parse_hex_color;
///
/// assert_eq!(parse_hex_color("#F00").unwrap(), image::Rgba([255, 0, 0, 255]));
/// assert_eq!(parse_hex_color("FFFFFF").unwrap(), image::Rgba([255, 255, 255, 255]));
/// assert_eq!(parse_hex_color("#00000080").unwrap(), image::Rgba([0, 0, 0, 128]));
/// ```
pub fn parse_hex_color(s: &str) -> Result<Rgba<u8>, ColorError> {
    let hex = s.trim();
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.is_empty() {
        return Err(ColorError::Empty);
    }

    let digits = hex
        .chars()
        .map(|c| c.to_digit(16).map(|d| d as u8).ok_or(ColorError::InvalidHex(c)))
        .collect::<Result<Vec<u8>, _>>()?;

    match digits.as_slice() {
        // #RGB -> #RRGGBB (doubled digits), alpha = 255
        [r, g, b] => Ok(Rgba([r * 17, g * 17, b * 17, 255])),
        [r, g, b, a] => Ok(Rgba([r * 17, g * 17, b * 17, a * 17])),
        [r1, r0, g1, g0, b1, b0] => Ok(Rgba([r1 * 16 + r0, g1 * 16 + g0, b1 * 16 + b0, 255])),
        [r1, r0, g1, g0, b1, b0, a1, a0] => {
            Ok(Rgba([r1 * 16 + r0, g1 * 16 + g0, b1 * 16 + b0, a1 * 16 + a0]))
        }
        _ => Err(ColorError::InvalidLength(digits.len())),
    }
}

/// Format an RGBA color as `#RRGGBB` (or `#RRGGBBAA` when not opaque).
pub fn to_hex(color: Rgba<u8>) -> String {
    let [r, g, b, a] = color.0;
    if a == 255 {
        format!("#{:02X}{:02X}{:02X}", r, g, b)
    } else {
        format!("#{:02X}{:02X}{:02X}{:02X}", r, g, b, a)
    }
}

/// sRGB gamma expansion (inverse companding), input and output in 0-1.
pub fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// sRGB gamma compression, input and output in 0-1.
pub fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.0031308 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert an 8-bit sRGB triple to linear RGB in 0-1.
pub fn rgb8_to_linear(rgb: [u8; 3]) -> [f64; 3] {
    rgb.map(|c| srgb_to_linear(c as f64 / 255.0))
}

/// CIE Lab color (D65 reference white).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lab {
    pub l: f64, // Lightness: 0-100
    pub a: f64, // Green-Red axis
    pub b: f64, // Blue-Yellow axis
}

impl Lab {
    /// Convert linear RGB (0-1) to Lab.
    pub fn from_linear(rgb: [f64; 3]) -> Self {
        let [r, g, b] = rgb;

        // Linear RGB to XYZ (sRGB matrix, D65)
        let x = r * 0.4124564 + g * 0.3575761 + b * 0.1804375;
        let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
        let z = r * 0.0193339 + g * 0.1191920 + b * 0.9503041;

        let fx = lab_f(x / 0.95047);
        let fy = lab_f(y / 1.00000);
        let fz = lab_f(z / 1.08883);

        Self { l: 116.0 * fy - 16.0, a: 500.0 * (fx - fy), b: 200.0 * (fy - fz) }
    }

    /// Convert an 8-bit sRGB triple to Lab.
    pub fn from_rgb8(rgb: [u8; 3]) -> Self {
        Self::from_linear(rgb8_to_linear(rgb))
    }

    /// CIEDE2000 color difference with unit weighting factors.
    pub fn ciede2000(&self, other: &Lab) -> f64 {
        const POW25_7: f64 = 6_103_515_625.0; // 25^7

        let (l1, a1, b1) = (self.l, self.a, self.b);
        let (l2, a2, b2) = (other.l, other.a, other.b);

        let c1 = a1.hypot(b1);
        let c2 = a2.hypot(b2);
        let c_mean = (c1 + c2) / 2.0;

        let g = 0.5 * (1.0 - (c_mean.powi(7) / (c_mean.powi(7) + POW25_7)).sqrt());
        let a1p = (1.0 + g) * a1;
        let a2p = (1.0 + g) * a2;

        let c1p = a1p.hypot(b1);
        let c2p = a2p.hypot(b2);

        let h1p = hue_degrees(b1, a1p);
        let h2p = hue_degrees(b2, a2p);

        // circular hue difference in (-180, 180]
        let dhp = (h2p - h1p + 180.0).rem_euclid(360.0) - 180.0;

        let dlp = l2 - l1;
        let dcp = c2p - c1p;
        let dhp_big = 2.0 * (c1p * c2p).sqrt() * (dhp / 2.0).to_radians().sin();

        let lp_mean = (l1 + l2) / 2.0;
        let cp_mean = (c1p + c2p) / 2.0;
        let hp_mean = (dhp / 2.0 + h1p).rem_euclid(360.0);

        let t = 1.0 - 0.17 * (hp_mean - 30.0).to_radians().cos()
            + 0.24 * (2.0 * hp_mean).to_radians().cos()
            + 0.32 * (3.0 * hp_mean + 6.0).to_radians().cos()
            - 0.20 * (4.0 * hp_mean - 63.0).to_radians().cos();
        let dtheta = 30.0 * (-((hp_mean - 275.0) / 25.0).powi(2)).exp();

        let r_c = 2.0 * (cp_mean.powi(7) / (cp_mean.powi(7) + POW25_7)).sqrt();
        let s_l = 1.0 + 0.015 * (lp_mean - 50.0).powi(2) / (20.0 + (lp_mean - 50.0).powi(2)).sqrt();
        let s_c = 1.0 + 0.045 * cp_mean;
        let s_h = 1.0 + 0.015 * cp_mean * t;
        let r_t = -(2.0 * dtheta).to_radians().sin() * r_c;

        let dl = dlp / s_l;
        let dc = dcp / s_c;
        let dh = dhp_big / s_h;
        (dl * dl + dc * dc + dh * dh + r_t * dc * dh).max(0.0).sqrt()
    }
}

/// Hue angle in degrees, 0-360.
fn hue_degrees(b: f64, a: f64) -> f64 {
    if a == 0.0 && b == 0.0 {
        return 0.0;
    }
    b.atan2(a).to_degrees().rem_euclid(360.0)
}

/// Lab f function for XYZ to Lab conversion.
fn lab_f(t: f64) -> f64 {
    let delta: f64 = 6.0 / 29.0;
    if t > delta.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * delta * delta) + 4.0 / 29.0
    }
}
