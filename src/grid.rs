//! Palette-index grids and boolean masks.
//!
//! Every canvas array (board, placemap, virginmap) and every template content
//! array is an [`IndexGrid`]. Comparisons between a template and the canvas
//! always go through [`IndexGrid::crop_region`], which resamples a canvas-sized
//! grid into the template's frame.

use thiserror::Error;

use crate::palette::TRANSPARENT;

/// Error when building a grid from raw cells.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid of {width}x{height} needs {expected} cells, got {actual}")]
    SizeMismatch { width: usize, height: usize, expected: usize, actual: usize },
}

/// A row-major 2D grid of palette indices.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexGrid {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl IndexGrid {
    /// A grid filled with one value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self { width, height, cells: vec![value; width * height] }
    }

    pub fn from_vec(width: usize, height: usize, cells: Vec<u8>) -> Result<Self, GridError> {
        let expected = width * height;
        if cells.len() != expected {
            return Err(GridError::SizeMismatch { width, height, expected, actual: cells.len() });
        }
        Ok(Self { width, height, cells })
    }

    /// Build a grid from rows of equal length (handy in tests).
    pub fn from_rows(rows: &[&[u8]]) -> Result<Self, GridError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        Self::from_vec(width, height, rows.concat())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Value at (x, y). Out-of-range reads return [`TRANSPARENT`].
    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            return TRANSPARENT;
        }
        self.cells[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.cells[y * self.width + x] = value;
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.cells.chunks(self.width.max(1)).take(self.height)
    }

    /// Number of cells satisfying `pred`.
    pub fn count(&self, pred: impl Fn(u8) -> bool) -> usize {
        self.cells.iter().filter(|&&v| pred(v)).count()
    }

    /// Mask of cells satisfying `pred`.
    pub fn mask(&self, pred: impl Fn(u8) -> bool) -> Mask {
        Mask { width: self.width, height: self.height, bits: self.cells.iter().map(|&v| pred(v)).collect() }
    }

    /// Copy of this grid with every cell where `mask` is false set to
    /// [`TRANSPARENT`].
    pub fn masked(&self, mask: &Mask) -> IndexGrid {
        let cells = self
            .cells
            .iter()
            .zip(mask.bits())
            .map(|(&v, &keep)| if keep { v } else { TRANSPARENT })
            .collect();
        IndexGrid { width: self.width, height: self.height, cells }
    }

    /// Resample the `width`x`height` window whose top-left corner sits at
    /// (`ox`, `oy`) in this grid into a new grid of that size.
    ///
    /// The window may hang partially or fully outside this grid; uncovered
    /// cells are [`TRANSPARENT`].
    pub fn crop_region(&self, ox: i64, oy: i64, width: usize, height: usize) -> IndexGrid {
        let mut out = IndexGrid::filled(width, height, TRANSPARENT);

        let src_w = self.width as i64;
        let src_h = self.height as i64;
        let y0 = oy.clamp(0, src_h);
        let y1 = oy.saturating_add(height as i64).clamp(0, src_h);
        let x0 = ox.clamp(0, src_w);
        let x1 = ox.saturating_add(width as i64).clamp(0, src_w);
        if x0 >= x1 || y0 >= y1 {
            return out;
        }

        let span = (x1 - x0) as usize;
        for sy in y0..y1 {
            let dy = (sy - oy) as usize;
            let dx = (x0 - ox) as usize;
            let src = sy as usize * self.width + x0 as usize;
            let dst = dy * width + dx;
            out.cells[dst..dst + span].copy_from_slice(&self.cells[src..src + span]);
        }
        out
    }

    /// Paint the non-transparent cells of `other` onto this grid with its
    /// top-left corner at (`ox`, `oy`), clipping to this grid's bounds.
    pub fn paint(&mut self, other: &IndexGrid, ox: i64, oy: i64) {
        for (y, row) in other.rows().enumerate() {
            let ty = oy.saturating_add(y as i64);
            if ty < 0 || ty >= self.height as i64 {
                continue;
            }
            for (x, &value) in row.iter().enumerate() {
                let tx = ox.saturating_add(x as i64);
                if value == TRANSPARENT || tx < 0 || tx >= self.width as i64 {
                    continue;
                }
                self.cells[ty as usize * self.width + tx as usize] = value;
            }
        }
    }
}

/// A boolean grid, same shape as the grid it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: usize,
    height: usize,
    bits: Vec<bool>,
}

impl Mask {
    pub fn filled(width: usize, height: usize, value: bool) -> Self {
        Self { width, height, bits: vec![value; width * height] }
    }

    /// Build a mask from row-major bits. Missing bits are false, extra bits
    /// are dropped.
    pub fn from_bits(width: usize, height: usize, mut bits: Vec<bool>) -> Self {
        bits.resize(width * height, false);
        Self { width, height, bits }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.height && self.bits[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Cell-wise AND. Both masks must have the same shape.
    pub fn and(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && b)
    }

    /// Cell-wise `self AND NOT other`.
    pub fn and_not(&self, other: &Mask) -> Mask {
        self.zip_with(other, |a, b| a && !b)
    }

    /// Whether every true cell of `self` is also true in `other`.
    pub fn is_subset_of(&self, other: &Mask) -> bool {
        self.bits.iter().zip(&other.bits).all(|(&a, &b)| !a || b)
    }

    fn zip_with(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        let bits = self.bits.iter().zip(&other.bits).map(|(&a, &b)| f(a, b)).collect();
        Mask { width: self.width, height: self.height, bits }
    }

    /// Find the densest `chunk`x`chunk` square of true cells.
    ///
    /// The mask is conceptually padded with false cells up to a multiple of
    /// `chunk` in both directions. Chunks are scanned row-major; only a
    /// strictly higher count replaces the current best, so the first chunk
    /// found wins ties. Returns the center of the winning chunk in mask
    /// coordinates, or `None` when no chunk has any true cell.
    pub fn densest_chunk(&self, chunk: usize) -> Option<(usize, usize)> {
        let chunk = chunk.max(1);
        let chunks_x = self.width.div_ceil(chunk);
        let chunks_y = self.height.div_ceil(chunk);

        let mut counts = vec![0usize; chunks_x * chunks_y];
        for y in 0..self.height {
            let row = &self.bits[y * self.width..(y + 1) * self.width];
            for (x, &set) in row.iter().enumerate() {
                if set {
                    counts[(y / chunk) * chunks_x + x / chunk] += 1;
                }
            }
        }

        let mut best: Option<(usize, usize)> = None;
        for (i, &count) in counts.iter().enumerate() {
            if count > best.map_or(0, |(_, c)| c) {
                best = Some((i, count));
            }
        }

        best.map(|(i, _)| {
            let (cx, cy) = (i % chunks_x, i / chunks_x);
            (cx * chunk + chunk / 2, cy * chunk + chunk / 2)
        })
    }
}
