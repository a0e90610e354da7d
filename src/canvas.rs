//! Canvas snapshots.
//!
//! A [`CanvasSnapshot`] is an immutable view of the board at one moment. The
//! [`CanvasHandle`] holds the current one behind an `Arc` that the updater
//! swaps whole, so a computation that grabbed a snapshot keeps a consistent
//! view however long it runs.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use image::RgbaImage;
use thiserror::Error;

use crate::grid::{GridError, IndexGrid};
use crate::palette::{Palette, TRANSPARENT};
use crate::quantize::{ColorMetric, QuantizeError, Quantizer};

/// Error when building a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CanvasError {
    #[error("{name} is {width}x{height}, board is {board_width}x{board_height}")]
    ShapeMismatch {
        name: &'static str,
        width: usize,
        height: usize,
        board_width: usize,
        board_height: usize,
    },
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// The board, placemap and virginmap of one canvas generation.
#[derive(Debug, Clone)]
pub struct CanvasSnapshot {
    canvas_code: String,
    palette: Palette,
    board: IndexGrid,
    placemap: IndexGrid,
    virginmap: IndexGrid,
    taken_at: DateTime<Utc>,
}

impl CanvasSnapshot {
    /// Build a snapshot; the three grids must share one shape.
    pub fn new(
        canvas_code: impl Into<String>,
        palette: Palette,
        board: IndexGrid,
        placemap: IndexGrid,
        virginmap: IndexGrid,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, CanvasError> {
        for (name, grid) in [("placemap", &placemap), ("virginmap", &virginmap)] {
            if (grid.width(), grid.height()) != (board.width(), board.height()) {
                return Err(CanvasError::ShapeMismatch {
                    name,
                    width: grid.width(),
                    height: grid.height(),
                    board_width: board.width(),
                    board_height: board.height(),
                });
            }
        }
        Ok(Self { canvas_code: canvas_code.into(), palette, board, placemap, virginmap, taken_at })
    }

    /// Build a snapshot from images.
    ///
    /// The board is reduced against the palette. Transparent placemap pixels
    /// mark unplaceable cells. Opaque non-black virginmap pixels mark virgin
    /// cells. Missing maps mean everything is placeable and nothing is virgin.
    pub fn from_images(
        canvas_code: impl Into<String>,
        palette: Palette,
        board: &RgbaImage,
        placemap: Option<&RgbaImage>,
        virginmap: Option<&RgbaImage>,
        taken_at: DateTime<Utc>,
    ) -> Result<Self, CanvasError> {
        let quantizer = Quantizer::new(&palette, ColorMetric::Euclidean)?;
        let board = quantizer.reduce(board, 0.0)?;
        let (w, h) = (board.width(), board.height());

        let placemap = match placemap {
            Some(img) => image_grid(img, |p| if p[3] < 128 { TRANSPARENT } else { 0 })?,
            None => IndexGrid::filled(w, h, 0),
        };
        let virginmap = match virginmap {
            Some(img) => {
                image_grid(img, |p| u8::from(p[3] >= 128 && (p[0] > 0 || p[1] > 0 || p[2] > 0)))?
            }
            None => IndexGrid::filled(w, h, 0),
        };
        Self::new(canvas_code, palette, board, placemap, virginmap, taken_at)
    }

    pub fn canvas_code(&self) -> &str {
        &self.canvas_code
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn board(&self) -> &IndexGrid {
        &self.board
    }

    /// 255 marks a cell that can never be painted.
    pub fn placemap(&self) -> &IndexGrid {
        &self.placemap
    }

    /// Nonzero marks a cell nobody has painted yet, 0 one painted at least once.
    pub fn virginmap(&self) -> &IndexGrid {
        &self.virginmap
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn width(&self) -> usize {
        self.board.width()
    }

    pub fn height(&self) -> usize {
        self.board.height()
    }

    /// The board with unplaceable cells set to [`TRANSPARENT`].
    pub fn placeable_board(&self) -> IndexGrid {
        self.board.masked(&self.placemap.mask(|v| v != TRANSPARENT))
    }
}

fn image_grid(image: &RgbaImage, f: impl Fn(&image::Rgba<u8>) -> u8) -> Result<IndexGrid, GridError> {
    IndexGrid::from_vec(image.width() as usize, image.height() as usize, image.pixels().map(f).collect())
}

/// Shared handle to the current snapshot.
#[derive(Debug)]
pub struct CanvasHandle {
    current: RwLock<Arc<CanvasSnapshot>>,
}

impl CanvasHandle {
    pub fn new(snapshot: CanvasSnapshot) -> Self {
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    /// The snapshot in effect now. Later refreshes do not affect it.
    pub fn current(&self) -> Arc<CanvasSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new snapshot, returning the previous one.
    pub fn replace(&self, snapshot: CanvasSnapshot) -> Arc<CanvasSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        log::debug!(
            "canvas '{}' refreshed ({}x{})",
            snapshot.canvas_code,
            snapshot.width(),
            snapshot.height()
        );
        std::mem::replace(&mut *guard, Arc::new(snapshot))
    }
}
