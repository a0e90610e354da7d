//! Template render styles.
//!
//! A style turns every template cell into an `S`x`S` block. Each palette index
//! has a stencil: an alpha mask over the block where the color is drawn.
//!
//! Decoding a stylized image reads, for every block, the first pixel in
//! row-major order whose alpha exceeds [`ANCHOR_ALPHA`]. Each stencil therefore
//! declares its anchor (that first pixel) and the declaration is checked when
//! the stencil is built, so a style that would not decode back to its source
//! can never be registered.

use std::path::Path;

use image::RgbaImage;
use thiserror::Error;

/// A stencil pixel (or decoded pixel) counts as drawn above this alpha.
pub const ANCHOR_ALPHA: u8 = 128;

/// Number of symbols per row in a style sheet (16x16 symbols).
pub const SHEET_SYMBOLS_PER_LINE: u32 = 16;

/// Error when building or applying a style.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StyleError {
    #[error("stencil size must be at least 1")]
    ZeroSize,
    #[error("stencil of size {size} needs {expected} cells, got {actual}")]
    SizeMismatch { size: usize, expected: usize, actual: usize },
    #[error("stencil has no pixel above alpha {ANCHOR_ALPHA}")]
    EmptyStencil,
    #[error("declared anchor ({x}, {y}) is not the first drawn pixel, ({first_x}, {first_y}) is")]
    AnchorMismatch { x: usize, y: usize, first_x: usize, first_y: usize },
    #[error("style '{style}' has no usable stencil for palette index {index}: {reason}")]
    InvalidStencil { style: String, index: usize, reason: String },
    #[error("style sheet width {width} is not a positive multiple of {SHEET_SYMBOLS_PER_LINE}")]
    InvalidSheet { width: u32 },
    #[error("failed to load style sheet: {0}")]
    Load(String),
}

/// Alpha mask for one palette index, with its declared anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stencil {
    size: usize,
    alpha: Vec<u8>,
    anchor: (usize, usize),
}

impl Stencil {
    /// Build a stencil and check that `anchor` is the first drawn pixel.
    pub fn new(size: usize, alpha: Vec<u8>, anchor: (usize, usize)) -> Result<Self, StyleError> {
        let first = Self::first_drawn(size, &alpha)?;
        if first != anchor {
            return Err(StyleError::AnchorMismatch {
                x: anchor.0,
                y: anchor.1,
                first_x: first.0,
                first_y: first.1,
            });
        }
        Ok(Self { size, alpha, anchor })
    }

    /// Build a stencil whose anchor is derived from the mask.
    pub fn derive(size: usize, alpha: Vec<u8>) -> Result<Self, StyleError> {
        let anchor = Self::first_drawn(size, &alpha)?;
        Ok(Self { size, alpha, anchor })
    }

    /// A fully drawn block.
    pub fn solid(size: usize) -> Result<Self, StyleError> {
        Self::new(size, vec![255; size * size], (0, 0))
    }

    fn first_drawn(size: usize, alpha: &[u8]) -> Result<(usize, usize), StyleError> {
        if size == 0 {
            return Err(StyleError::ZeroSize);
        }
        if alpha.len() != size * size {
            return Err(StyleError::SizeMismatch {
                size,
                expected: size * size,
                actual: alpha.len(),
            });
        }
        alpha
            .iter()
            .position(|&a| a > ANCHOR_ALPHA)
            .map(|i| (i % size, i / size))
            .ok_or(StyleError::EmptyStencil)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn anchor(&self) -> (usize, usize) {
        self.anchor
    }

    /// Alpha at (x, y) within the block.
    pub fn alpha(&self, x: usize, y: usize) -> u8 {
        self.alpha[y * self.size + x]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stencils {
    /// One stencil shared by every palette index
    Uniform(Stencil),
    /// One stencil per palette index, `None` where the sheet symbol is empty
    PerColor(Vec<Option<Stencil>>),
}

/// A named render style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Style {
    name: String,
    size: usize,
    stencils: Stencils,
}

impl Style {
    /// A style drawing the same stencil for every color.
    pub fn uniform(name: impl Into<String>, stencil: Stencil) -> Self {
        Self { name: name.into(), size: stencil.size(), stencils: Stencils::Uniform(stencil) }
    }

    /// Parse a style sheet image: 16x16 symbols, symbol at row `r` and
    /// column `c` is the stencil for palette index `16 * r + c`.
    pub fn from_sheet(name: impl Into<String>, sheet: &RgbaImage) -> Result<Self, StyleError> {
        let width = sheet.width();
        if width == 0 || width % SHEET_SYMBOLS_PER_LINE != 0 {
            return Err(StyleError::InvalidSheet { width });
        }
        let size = (width / SHEET_SYMBOLS_PER_LINE) as usize;
        let count = (SHEET_SYMBOLS_PER_LINE * SHEET_SYMBOLS_PER_LINE) as usize;

        let mut stencils = Vec::with_capacity(count);
        for index in 0..count {
            let (col, row) = (index % 16, index / 16);
            let mut alpha = Vec::with_capacity(size * size);
            for y in 0..size {
                for x in 0..size {
                    let px = (col * size + x) as u32;
                    let py = (row * size + y) as u32;
                    let a = if px < sheet.width() && py < sheet.height() {
                        sheet.get_pixel(px, py)[3]
                    } else {
                        0
                    };
                    alpha.push(a);
                }
            }
            stencils.push(Stencil::derive(size, alpha).ok());
        }

        Ok(Self { name: name.into(), size, stencils: Stencils::PerColor(stencils) })
    }

    /// Load a style sheet PNG; the style is named after the file stem.
    pub fn load_sheet(path: &Path) -> Result<Self, StyleError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "custom".to_string());
        let sheet = image::open(path).map_err(|e| StyleError::Load(e.to_string()))?.to_rgba8();
        Self::from_sheet(name, &sheet)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block size in pixels.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stencil for a palette index.
    pub fn stencil(&self, index: usize) -> Option<&Stencil> {
        match &self.stencils {
            Stencils::Uniform(s) => Some(s),
            Stencils::PerColor(list) => list.get(index).and_then(Option::as_ref),
        }
    }

    /// Check that every index of a palette with `palette_len` colors has a
    /// stencil of the style's size.
    pub fn validate(&self, palette_len: usize) -> Result<(), StyleError> {
        for index in 0..palette_len {
            let stencil = self.stencil(index).ok_or_else(|| StyleError::InvalidStencil {
                style: self.name.clone(),
                index,
                reason: "missing or empty symbol".to_string(),
            })?;
            if stencil.size() != self.size {
                return Err(StyleError::InvalidStencil {
                    style: self.name.clone(),
                    index,
                    reason: format!("size {} differs from style size {}", stencil.size(), self.size),
                });
            }
        }
        Ok(())
    }
}

/// The built-in styles.
pub fn builtin_styles() -> Vec<Style> {
    let mut styles = Vec::new();
    let defs: [(&str, usize, &[u8], (usize, usize)); 4] = [
        ("none", 1, &[255], (0, 0)),
        ("dotted", 3, &[0, 0, 0, 0, 255, 0, 0, 0, 0], (1, 1)),
        ("plus", 3, &[0, 255, 0, 255, 255, 255, 0, 255, 0], (1, 0)),
        (
            "bigdotted",
            5,
            &[
                0, 0, 0, 0, 0, //
                0, 255, 255, 255, 0, //
                0, 255, 255, 255, 0, //
                0, 255, 255, 255, 0, //
                0, 0, 0, 0, 0,
            ],
            (1, 1),
        ),
    ];
    for (name, size, alpha, anchor) in defs {
        if let Ok(stencil) = Stencil::new(size, alpha.to_vec(), anchor) {
            styles.push(Style::uniform(name, stencil));
        }
    }
    styles
}
