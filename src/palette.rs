//! Canvas palettes.
//!
//! A palette is an ordered list of opaque colors. Cells of an index grid refer
//! to palette entries by position; [`TRANSPARENT`] (255) is reserved and never
//! names a real color.

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::color::{parse_hex_color, to_hex, ColorError};
use crate::grid::IndexGrid;

/// Palette index meaning "no color".
pub const TRANSPARENT: u8 = 255;

/// Largest number of colors a palette may hold (index 255 is reserved).
pub const MAX_COLORS: usize = 255;

/// Error when building a palette.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PaletteError {
    #[error("palette is empty")]
    Empty,
    #[error("palette has {0} colors, at most 255 are allowed")]
    TooManyColors(usize),
    #[error("invalid palette color '{value}': {source}")]
    InvalidColor {
        value: String,
        #[source]
        source: ColorError,
    },
}

/// An ordered, fixed-size list of opaque colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgba<u8>>,
    names: Vec<String>,
}

impl Palette {
    /// Build a palette from colors. Alpha is forced to opaque.
    pub fn new(colors: Vec<Rgba<u8>>) -> Result<Self, PaletteError> {
        if colors.is_empty() {
            return Err(PaletteError::Empty);
        }
        if colors.len() > MAX_COLORS {
            return Err(PaletteError::TooManyColors(colors.len()));
        }
        let colors = colors.into_iter().map(|Rgba([r, g, b, _])| Rgba([r, g, b, 255])).collect();
        Ok(Self { colors, names: Vec::new() })
    }

    /// Build a palette from hex strings (`"FFFFFF"` or `"#FFFFFF"`).
    pub fn from_hex<S: AsRef<str>>(values: &[S]) -> Result<Self, PaletteError> {
        let colors = values
            .iter()
            .map(|v| {
                parse_hex_color(v.as_ref()).map_err(|source| PaletteError::InvalidColor {
                    value: v.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(colors)
    }

    /// The classic 32-color pxls.space palette.
    pub fn pxls_classic() -> Self {
        let entries = PXLS_CLASSIC;
        let colors = entries
            .iter()
            .filter_map(|(_, hex)| parse_hex_color(hex).ok())
            .collect::<Vec<_>>();
        Self { colors, names: entries.iter().map(|(name, _)| name.to_string()).collect() }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color at `index`, `None` for [`TRANSPARENT`] or out-of-range indices.
    pub fn get(&self, index: u8) -> Option<Rgba<u8>> {
        self.colors.get(index as usize).copied()
    }

    /// Name of the color at `index`, if the palette has names.
    pub fn name(&self, index: u8) -> Option<&str> {
        self.names.get(index as usize).map(String::as_str)
    }

    /// Name and hex code of the color at `index`, e.g. `Black (#000000)`.
    pub fn describe(&self, index: u8) -> Option<String> {
        let hex = to_hex(self.get(index)?);
        Some(match self.name(index) {
            Some(name) => format!("{} ({})", name, hex),
            None => hex,
        })
    }

    pub fn colors(&self) -> &[Rgba<u8>] {
        &self.colors
    }

    /// Render an index grid with this palette.
    ///
    /// [`TRANSPARENT`] and unknown indices become fully transparent pixels.
    pub fn render(&self, grid: &IndexGrid) -> RgbaImage {
        RgbaImage::from_fn(grid.width() as u32, grid.height() as u32, |x, y| {
            self.get(grid.get(x as usize, y as usize)).unwrap_or(Rgba([0, 0, 0, 0]))
        })
    }

    /// Render an index grid with an ad-hoc color list (e.g. a two-color
    /// virginmap view). Indices past the list are transparent.
    pub fn render_with(colors: &[Rgba<u8>], grid: &IndexGrid) -> RgbaImage {
        RgbaImage::from_fn(grid.width() as u32, grid.height() as u32, |x, y| {
            colors.get(grid.get(x as usize, y as usize) as usize).copied().unwrap_or(Rgba([0, 0, 0, 0]))
        })
    }
}

/// Classic pxls.space palette.
const PXLS_CLASSIC: &[(&str, &str)] = &[
    ("Black", "000000"),
    ("Dark Grey", "222222"),
    ("Deep Grey", "555555"),
    ("Medium Grey", "888888"),
    ("Light Grey", "CDCDCD"),
    ("White", "FFFFFF"),
    ("Beige", "FFD5BC"),
    ("Peach", "FFB783"),
    ("Brown", "B66D3D"),
    ("Chocolate", "77431F"),
    ("Rust", "FC7510"),
    ("Orange", "FCA80E"),
    ("Yellow", "FDE817"),
    ("Pastel Yellow", "FFF491"),
    ("Lime", "BEFF40"),
    ("Green", "70DD13"),
    ("Dark Green", "31A117"),
    ("Forest", "0B5F35"),
    ("Dark Teal", "277E6C"),
    ("Light Teal", "32B69F"),
    ("Aqua", "88FFF3"),
    ("Azure", "24B5FE"),
    ("Blue", "125CC7"),
    ("Navy", "262E96"),
    ("Purple", "8B2FA8"),
    ("Mauve", "D24CE9"),
    ("Magenta", "FF59EF"),
    ("Pink", "FFA9D9"),
    ("Watermelon", "FF6474"),
    ("Red", "F02523"),
    ("Rose", "B11206"),
    ("Maroon", "740C00"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex() {
        let palette = Palette::from_hex(&["000000", "#FFFFFF"]).unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.get(1), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(palette.get(2), None);
        assert_eq!(palette.get(TRANSPARENT), None);
    }

    #[test]
    fn test_new_forces_opaque() {
        let palette = Palette::new(vec![Rgba([10, 20, 30, 0])]).unwrap();
        assert_eq!(palette.get(0), Some(Rgba([10, 20, 30, 255])));
    }

    #[test]
    fn test_palette_limits() {
        assert_eq!(Palette::new(Vec::new()), Err(PaletteError::Empty));
        let too_many = vec![Rgba([0, 0, 0, 255]); 256];
        assert_eq!(Palette::new(too_many), Err(PaletteError::TooManyColors(256)));
        assert!(Palette::new(vec![Rgba([0, 0, 0, 255]); 255]).is_ok());
    }

    #[test]
    fn test_from_hex_reports_bad_value() {
        let err = Palette::from_hex(&["000000", "nope"]).unwrap_err();
        assert!(matches!(err, PaletteError::InvalidColor { ref value, .. } if value == "nope"));
    }

    #[test]
    fn test_pxls_classic() {
        let palette = Palette::pxls_classic();
        assert_eq!(palette.len(), 32);
        assert_eq!(palette.name(0), Some("Black"));
        assert_eq!(palette.get(5), Some(Rgba([255, 255, 255, 255])));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Palette::pxls_classic().describe(3).as_deref(), Some("Medium Grey (#888888)"));
        let unnamed = Palette::from_hex(&["FF8000"]).unwrap();
        assert_eq!(unnamed.describe(0).as_deref(), Some("#FF8000"));
        assert_eq!(unnamed.describe(TRANSPARENT), None);
    }

    #[test]
    fn test_render() {
        let palette = Palette::from_hex(&["FF0000", "00FF00"]).unwrap();
        let grid = IndexGrid::from_vec(2, 2, vec![0, 1, TRANSPARENT, 7]).unwrap();
        let image = palette.render(&grid);
        assert_eq!(image.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(1, 0), &Rgba([0, 255, 0, 255]));
        assert_eq!(image.get_pixel(0, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(image.get_pixel(1, 1), &Rgba([0, 0, 0, 0]));
    }
}
