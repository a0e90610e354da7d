//! Palette reduction: map an RGBA image onto a fixed palette.
//!
//! Each opaque pixel is replaced by the index of the nearest palette color
//! under the selected [`ColorMetric`]. Pixels whose alpha is below
//! [`ALPHA_THRESHOLD`] become [`TRANSPARENT`] whatever their color.
//!
//! Without dithering every row is independent and rows are processed in
//! parallel. With dithering the image is scanned sequentially (Floyd-Steinberg
//! error diffusion), which keeps the output deterministic.

use std::collections::HashMap;

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::color::{linear_to_srgb, rgb8_to_linear, Lab};
use crate::grid::{GridError, IndexGrid};
use crate::palette::{Palette, TRANSPARENT};

/// Source alpha below this value forces a pixel to [`TRANSPARENT`].
pub const ALPHA_THRESHOLD: u8 = 128;

/// Distance used to pick the nearest palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMetric {
    /// Euclidean distance in sRGB space
    #[default]
    Euclidean,
    /// CIEDE2000 difference in Lab space
    Ciede2000,
}

impl ColorMetric {
    /// Parse a metric name.
    pub fn from_name(s: &str) -> Option<ColorMetric> {
        match s.to_lowercase().as_str() {
            "euclidean" | "rgb" => Some(ColorMetric::Euclidean),
            "ciede2000" | "de2000" | "lab" => Some(ColorMetric::Ciede2000),
            _ => None,
        }
    }
}

/// Error when reducing an image.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum QuantizeError {
    #[error("dither strength must be between 0 and 1, got {0}")]
    InvalidDither(f64),
    #[error("cannot reduce against an empty palette")]
    EmptyPalette,
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A palette prepared for repeated nearest-color queries.
#[derive(Debug, Clone)]
pub struct Quantizer {
    metric: ColorMetric,
    srgb: Vec<[f64; 3]>,
    linear: Vec<[f64; 3]>,
    lab: Vec<Lab>,
}

impl Quantizer {
    pub fn new(palette: &Palette, metric: ColorMetric) -> Result<Self, QuantizeError> {
        if palette.is_empty() {
            return Err(QuantizeError::EmptyPalette);
        }
        let rgb: Vec<[u8; 3]> = palette.colors().iter().map(|c| [c[0], c[1], c[2]]).collect();
        let srgb = rgb.iter().map(|c| c.map(|v| v as f64 / 255.0)).collect();
        let linear: Vec<[f64; 3]> = rgb.iter().map(|&c| rgb8_to_linear(c)).collect();
        let lab = linear.iter().map(|&c| Lab::from_linear(c)).collect();
        Ok(Self { metric, srgb, linear, lab })
    }

    pub fn metric(&self) -> ColorMetric {
        self.metric
    }

    /// Index of the palette color nearest to a linear RGB color.
    ///
    /// Only a strictly smaller distance replaces the current best, so among
    /// equally distant colors the lowest index wins.
    pub fn nearest(&self, linear: [f64; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;
        match self.metric {
            ColorMetric::Euclidean => {
                let c = linear.map(linear_to_srgb);
                for (i, p) in self.srgb.iter().enumerate() {
                    let d = (c[0] - p[0]).powi(2) + (c[1] - p[1]).powi(2) + (c[2] - p[2]).powi(2);
                    if d < best_distance {
                        best_distance = d;
                        best = i;
                    }
                }
            }
            ColorMetric::Ciede2000 => {
                let lab = Lab::from_linear(linear);
                for (i, p) in self.lab.iter().enumerate() {
                    let d = lab.ciede2000(p);
                    if d < best_distance {
                        best_distance = d;
                        best = i;
                    }
                }
            }
        }
        best as u8
    }

    /// Reduce an image to palette indices.
    ///
    /// `dither` is the error diffusion strength in 0..=1 (0 disables it).
    pub fn reduce(&self, image: &RgbaImage, dither: f64) -> Result<IndexGrid, QuantizeError> {
        if !(0.0..=1.0).contains(&dither) {
            return Err(QuantizeError::InvalidDither(dither));
        }
        let width = image.width() as usize;
        let height = image.height() as usize;
        let cells = if dither > 0.0 {
            self.reduce_dithered(image, dither)
        } else {
            self.reduce_parallel(image)
        };
        Ok(IndexGrid::from_vec(width, height, cells)?)
    }

    fn reduce_parallel(&self, image: &RgbaImage) -> Vec<u8> {
        let width = image.width() as usize;
        if width == 0 {
            return Vec::new();
        }
        let raw: &[u8] = image.as_raw();
        let rows: Vec<Vec<u8>> = raw
            .par_chunks(width * 4)
            .map(|row| {
                let mut cache: HashMap<[u8; 3], u8> = HashMap::new();
                row.chunks_exact(4)
                    .map(|px| {
                        if px[3] < ALPHA_THRESHOLD {
                            return TRANSPARENT;
                        }
                        let rgb = [px[0], px[1], px[2]];
                        *cache.entry(rgb).or_insert_with(|| self.nearest(rgb8_to_linear(rgb)))
                    })
                    .collect()
            })
            .collect();
        rows.concat()
    }

    fn reduce_dithered(&self, image: &RgbaImage, strength: f64) -> Vec<u8> {
        let width = image.width() as usize;
        let height = image.height() as usize;

        // working colors in linear RGB, perturbed as errors diffuse
        let mut work: Vec<[f64; 3]> =
            image.pixels().map(|p| rgb8_to_linear([p[0], p[1], p[2]])).collect();
        let opaque: Vec<bool> = image.pixels().map(|p| p[3] >= ALPHA_THRESHOLD).collect();
        let mut out = vec![TRANSPARENT; width * height];

        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                if !opaque[i] {
                    continue;
                }
                let color = work[i];
                let index = self.nearest(color);
                out[i] = index;

                let target = self.linear[index as usize];
                let error = [color[0] - target[0], color[1] - target[1], color[2] - target[2]];
                let mut spread = |nx: usize, ny: usize, weight: f64| {
                    let j = ny * width + nx;
                    if opaque[j] {
                        for c in 0..3 {
                            work[j][c] = (work[j][c] + strength * error[c] * weight).clamp(0.0, 1.0);
                        }
                    }
                };
                if x + 1 < width {
                    spread(x + 1, y, 7.0 / 16.0);
                }
                if y + 1 < height {
                    if x > 0 {
                        spread(x - 1, y + 1, 3.0 / 16.0);
                    }
                    spread(x, y + 1, 5.0 / 16.0);
                    if x + 1 < width {
                        spread(x + 1, y + 1, 1.0 / 16.0);
                    }
                }
            }
        }
        out
    }
}

/// Reduce an image against a palette in one call.
pub fn reduce(
    image: &RgbaImage,
    palette: &Palette,
    metric: ColorMetric,
    dither: f64,
) -> Result<IndexGrid, QuantizeError> {
    Quantizer::new(palette, metric)?.reduce(image, dither)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn bw_palette() -> Palette {
        Palette::from_hex(&["000000", "FFFFFF"]).unwrap()
    }

    #[test]
    fn test_exact_colors_map_to_their_index() {
        let palette = Palette::pxls_classic();
        let mut image = RgbaImage::new(palette.len() as u32, 1);
        for (i, c) in palette.colors().iter().enumerate() {
            image.put_pixel(i as u32, 0, *c);
        }
        for metric in [ColorMetric::Euclidean, ColorMetric::Ciede2000] {
            let grid = reduce(&image, &palette, metric, 0.0).unwrap();
            let expected: Vec<u8> = (0..palette.len() as u8).collect();
            assert_eq!(grid.cells(), expected.as_slice(), "metric {:?}", metric);
        }
    }

    #[test]
    fn test_alpha_threshold() {
        let mut image = RgbaImage::new(3, 1);
        image.put_pixel(0, 0, Rgba([255, 255, 255, 127]));
        image.put_pixel(1, 0, Rgba([255, 255, 255, 128]));
        image.put_pixel(2, 0, Rgba([0, 0, 0, 0]));
        let grid = reduce(&image, &bw_palette(), ColorMetric::Euclidean, 0.0).unwrap();
        assert_eq!(grid.cells(), &[TRANSPARENT, 1, TRANSPARENT]);
    }

    #[test]
    fn test_alpha_rule_holds_with_dithering() {
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([128, 128, 128, 255]));
        image.put_pixel(1, 1, Rgba([128, 128, 128, 10]));
        let grid = reduce(&image, &bw_palette(), ColorMetric::Euclidean, 1.0).unwrap();
        assert_eq!(grid.get(1, 1), TRANSPARENT);
        assert_eq!(grid.count(|v| v == TRANSPARENT), 1);
    }

    #[test]
    fn test_tie_breaks_to_lowest_index() {
        // duplicate entries: both at distance 0
        let palette = Palette::from_hex(&["FF0000", "00FF00", "FF0000"]).unwrap();
        let image = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        for metric in [ColorMetric::Euclidean, ColorMetric::Ciede2000] {
            let grid = reduce(&image, &palette, metric, 0.0).unwrap();
            assert_eq!(grid.get(0, 0), 0);
        }
    }

    #[test]
    fn test_reduce_is_deterministic() {
        let image = RgbaImage::from_fn(17, 9, |x, y| {
            Rgba([(x * 15) as u8, (y * 27) as u8, ((x + y) * 7) as u8, if x == 3 { 0 } else { 255 }])
        });
        let palette = Palette::pxls_classic();
        for dither in [0.0, 0.5, 1.0] {
            let a = reduce(&image, &palette, ColorMetric::Ciede2000, dither).unwrap();
            let b = reduce(&image, &palette, ColorMetric::Ciede2000, dither).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_dithering_mixes_gray() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([128, 128, 128, 255]));
        let flat = reduce(&image, &bw_palette(), ColorMetric::Euclidean, 0.0).unwrap();
        assert_eq!(flat.count(|v| v == 0), 0);
        let dithered = reduce(&image, &bw_palette(), ColorMetric::Euclidean, 1.0).unwrap();
        assert!(dithered.count(|v| v == 0) > 0);
        assert!(dithered.count(|v| v == 1) > 0);
    }

    #[test]
    fn test_invalid_dither() {
        let image = RgbaImage::new(1, 1);
        let err = reduce(&image, &bw_palette(), ColorMetric::Euclidean, 1.5).unwrap_err();
        assert_eq!(err, QuantizeError::InvalidDither(1.5));
        assert!(reduce(&image, &bw_palette(), ColorMetric::Euclidean, -0.1).is_err());
    }

    #[test]
    fn test_metric_from_name() {
        assert_eq!(ColorMetric::from_name("CIEDE2000"), Some(ColorMetric::Ciede2000));
        assert_eq!(ColorMetric::from_name("euclidean"), Some(ColorMetric::Euclidean));
        assert_eq!(ColorMetric::from_name("manhattan"), None);
    }
}
