//! Templates and their progress against a canvas snapshot.
//!
//! A [`Template`] is immutable content (an index grid) placed on the canvas
//! at an offset. Nothing about it changes when the canvas does: progress is
//! computed from an explicit [`CanvasSnapshot`] and returned as a
//! [`Progress`] value, so a result always belongs to the snapshot that
//! produced it.

use std::sync::Arc;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::canvas::CanvasSnapshot;
use crate::codec::{self, CodecError};
use crate::grid::{IndexGrid, Mask};
use crate::link::TemplateLink;
use crate::overlay::alpha_over;
use crate::palette::{Palette, TRANSPARENT};
use crate::quantize::ColorMetric;

/// Default opacity of the progress colors over the board.
pub const DEFAULT_PROGRESS_OPACITY: f64 = 0.65;

/// Default side of the squares searched by [`Template::find_coords`].
pub const DEFAULT_HOTSPOT_CHUNK: usize = 10;

const CORRECT: [u8; 3] = [0, 255, 0];
const INCORRECT: [u8; 3] = [255, 0, 0];
const UNPLACEABLE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const TWO_TONE: [Rgba<u8>; 2] = [Rgba([0, 0, 0, 255]), Rgba([0, 255, 0, 255])];

/// A template placed on a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: Option<String>,
    owner_id: Option<u64>,
    hidden: bool,
    canvas_code: String,
    ox: i64,
    oy: i64,
    grid: Arc<IndexGrid>,
    url: Option<String>,
    stylized_url: Option<String>,
    title: Option<String>,
    total_size: usize,
}

impl Template {
    /// A template with no identity or source link.
    pub fn new(grid: IndexGrid, ox: i64, oy: i64, canvas_code: impl Into<String>) -> Self {
        let total_size = grid.count(|v| v != TRANSPARENT);
        Self {
            name: None,
            owner_id: None,
            hidden: false,
            canvas_code: canvas_code.into(),
            ox,
            oy,
            grid: Arc::new(grid),
            url: None,
            stylized_url: None,
            title: None,
            total_size,
        }
    }

    /// Decode the stylized image a link points to.
    pub fn from_link(
        url: &str,
        link: &TemplateLink,
        image: &RgbaImage,
        palette: &Palette,
        metric: ColorMetric,
        canvas_code: impl Into<String>,
    ) -> Result<Self, CodecError> {
        let grid = codec::decode(image, link.true_width, palette, metric)?;
        log::debug!(
            "decoded template {}x{} at ({}, {}) from {}",
            grid.width(),
            grid.height(),
            link.ox,
            link.oy,
            link.image_url
        );
        let mut template = Self::new(grid, link.ox, link.oy, canvas_code);
        template.url = Some(url.to_string());
        template.stylized_url = Some(link.image_url.clone());
        template.title = link.title.clone();
        Ok(template)
    }

    /// Same content under another name, owner and visibility.
    pub fn with_identity(mut self, name: impl Into<String>, owner_id: u64, hidden: bool) -> Self {
        self.name = Some(name.into());
        self.owner_id = Some(owner_id);
        self.hidden = hidden;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn owner_id(&self) -> Option<u64> {
        self.owner_id
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn canvas_code(&self) -> &str {
        &self.canvas_code
    }

    pub fn ox(&self) -> i64 {
        self.ox
    }

    pub fn oy(&self) -> i64 {
        self.oy
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn grid(&self) -> &IndexGrid {
        &self.grid
    }

    /// The template link this was decoded from.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The stylized image shown to users.
    pub fn stylized_url(&self) -> Option<&str> {
        self.stylized_url.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Number of non-transparent cells, placeable or not.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Whether both templates draw the same cells at the same offset.
    pub fn same_content(&self, other: &Template) -> bool {
        self.ox == other.ox && self.oy == other.oy && self.grid == other.grid
    }

    /// Crop a canvas-sized grid to this template's frame.
    ///
    /// Cells outside the canvas are [`TRANSPARENT`].
    pub fn crop_to_template(&self, canvas: &IndexGrid) -> IndexGrid {
        canvas.crop_region(self.ox, self.oy, self.width(), self.height())
    }

    /// Cells with content that the canvas allows painting.
    pub fn placeable_mask(&self, snapshot: &CanvasSnapshot) -> Mask {
        let placemap = self.crop_to_template(snapshot.placemap());
        let bits = self
            .grid
            .cells()
            .iter()
            .zip(placemap.cells())
            .map(|(&content, &place)| content != TRANSPARENT && place != TRANSPARENT);
        mask_from(self.width(), self.height(), bits)
    }

    /// Compare the template against a snapshot.
    pub fn progress(&self, snapshot: &CanvasSnapshot) -> Progress {
        let placeable = self.placeable_mask(snapshot);
        let board = self.crop_to_template(snapshot.board());
        let bits = self
            .grid
            .cells()
            .iter()
            .zip(board.cells())
            .zip(placeable.bits())
            .map(|((&content, &actual), &ok)| ok && content == actual);
        let placed = mask_from(self.width(), self.height(), bits);
        Progress {
            current: placed.count(),
            total_placeable: placeable.count(),
            total_size: self.total_size,
            placeable,
            placed,
        }
    }

    /// Correct cells that nobody has painted over yet.
    pub fn virgin_abuse_mask(&self, snapshot: &CanvasSnapshot, progress: &Progress) -> Mask {
        let virgin = self.crop_to_template(snapshot.virginmap()).mask(|v| v != 0);
        progress.placed.and(&virgin)
    }

    /// Number of correct cells that are still virgin.
    pub fn virgin_abuse(&self, snapshot: &CanvasSnapshot, progress: &Progress) -> usize {
        self.virgin_abuse_mask(snapshot, progress).count()
    }

    /// Categorical progress render.
    ///
    /// Correct cells are green and incorrect ones red, both at `opacity`.
    /// Unplaceable cells are opaque blue and cells outside the template
    /// transparent. Below full opacity the render is laid over the board.
    pub fn progress_image(&self, snapshot: &CanvasSnapshot, progress: &Progress, opacity: f64) -> RgbaImage {
        let opacity = opacity.clamp(0.0, 1.0);
        let alpha = (255.0 * opacity) as u8;
        let (w, h) = (self.width() as u32, self.height() as u32);
        let colors = RgbaImage::from_fn(w, h, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if self.grid.get(x, y) == TRANSPARENT {
                Rgba([0, 0, 0, 0])
            } else if !progress.placeable.get(x, y) {
                UNPLACEABLE
            } else {
                let [r, g, b] = if progress.placed.get(x, y) { CORRECT } else { INCORRECT };
                Rgba([r, g, b, alpha])
            }
        });
        if opacity >= 1.0 {
            return colors;
        }

        let content = self.grid.mask(|v| v != TRANSPARENT);
        let board = self.crop_to_template(snapshot.board()).masked(&content);
        let mut image = snapshot.palette().render(&board);
        alpha_over(&mut image, &colors);
        image
    }

    /// Center of the densest `chunk`x`chunk` square of cells left to place,
    /// in canvas coordinates.
    pub fn find_coords(&self, progress: &Progress, chunk: usize) -> Option<(i64, i64)> {
        progress
            .to_place()
            .densest_chunk(chunk)
            .map(|(x, y)| (self.ox.saturating_add(x as i64), self.oy.saturating_add(y as i64)))
    }

    /// Whether canvas cell (`x`, `y`) is a placeable cell of this template.
    pub fn covers(&self, snapshot: &CanvasSnapshot, x: i64, y: i64) -> bool {
        let (Some(tx), Some(ty)) = (x.checked_sub(self.ox), y.checked_sub(self.oy)) else {
            return false;
        };
        if tx < 0 || ty < 0 {
            return false;
        }
        let (tx, ty) = (tx as usize, ty as usize);
        if self.grid.get(tx, ty) == TRANSPARENT {
            return false;
        }
        let cx = usize::try_from(x).ok();
        let cy = usize::try_from(y).ok();
        match (cx, cy) {
            (Some(cx), Some(cy)) if cx < snapshot.width() && cy < snapshot.height() => {
                snapshot.placemap().get(cx, cy) != TRANSPARENT
            }
            _ => false,
        }
    }

    /// Template content in palette colors.
    pub fn render(&self, palette: &Palette) -> RgbaImage {
        palette.render(&self.grid)
    }

    /// Template colors where the board is still wrong.
    pub fn wrong_pixels(&self, progress: &Progress) -> IndexGrid {
        self.grid.masked(&progress.to_place())
    }

    /// Template colors where the board is already right.
    pub fn correct_pixels(&self, progress: &Progress) -> IndexGrid {
        self.grid.masked(&progress.placed)
    }

    /// Cells still to place per palette index, most wanted first. Ties keep
    /// palette order.
    pub fn remaining_by_color(&self, progress: &Progress) -> Vec<(u8, usize)> {
        let mut counts = [0usize; 256];
        for &value in self.wrong_pixels(progress).cells() {
            counts[value as usize] += 1;
        }
        let mut left: Vec<(u8, usize)> = (0..TRANSPARENT)
            .map(|index| (index, counts[index as usize]))
            .filter(|&(_, n)| n > 0)
            .collect();
        left.sort_by(|a, b| b.1.cmp(&a.1));
        left
    }

    /// Render one of the check views.
    pub fn display(&self, snapshot: &CanvasSnapshot, progress: &Progress, view: View, opacity: f64) -> RgbaImage {
        let palette = snapshot.palette();
        match view {
            View::Progress => self.progress_image(snapshot, progress, opacity),
            View::Template => self.render(palette),
            View::Wrong => palette.render(&self.wrong_pixels(progress)),
            View::Correct => palette.render(&self.correct_pixels(progress)),
            View::Canvas => {
                let board = self.crop_to_template(&snapshot.placeable_board());
                palette.render(&board.masked(&progress.placeable))
            }
            View::Virginmap => {
                let virgin = self.crop_to_template(snapshot.virginmap());
                let two_tone = binary_grid(&virgin.mask(|v| v != 0), &progress.placeable);
                Palette::render_with(&TWO_TONE, &two_tone)
            }
            View::VirginAbuse => {
                let abuse = self.virgin_abuse_mask(snapshot, progress);
                Palette::render_with(&TWO_TONE, &binary_grid(&abuse, &progress.placeable))
            }
        }
    }

    /// A shareable link centered on the template.
    pub fn link(&self, base: &str, image_url: &str, scale: f64) -> TemplateLink {
        let x = self.ox.saturating_add(self.width() as i64 / 2);
        let y = self.oy.saturating_add(self.height() as i64 / 2);
        let mut link = TemplateLink::new(base, image_url, self.width() as u32, self.ox, self.oy)
            .with_center(x, y)
            .with_scale(scale);
        link.title = self.title.clone();
        link
    }
}

impl AsRef<Template> for Template {
    fn as_ref(&self) -> &Template {
        self
    }
}

/// 1 where `on`, 0 elsewhere inside `within`, transparent outside it.
fn binary_grid(on: &Mask, within: &Mask) -> IndexGrid {
    let mut grid = IndexGrid::filled(on.width(), on.height(), TRANSPARENT);
    for y in 0..on.height() {
        for x in 0..on.width() {
            if within.get(x, y) {
                grid.set(x, y, u8::from(on.get(x, y)));
            }
        }
    }
    grid
}

fn mask_from(width: usize, height: usize, bits: impl Iterator<Item = bool>) -> Mask {
    Mask::from_bits(width, height, bits.collect())
}

/// The check views of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Green/red/blue progress over the board
    #[default]
    Progress,
    Template,
    Wrong,
    Correct,
    Canvas,
    Virginmap,
    #[serde(rename = "virginabuse")]
    VirginAbuse,
}

impl View {
    pub fn from_name(s: &str) -> Option<View> {
        match s.to_lowercase().as_str() {
            "progress" | "default" => Some(View::Progress),
            "template" => Some(View::Template),
            "wrong" => Some(View::Wrong),
            "correct" => Some(View::Correct),
            "canvas" => Some(View::Canvas),
            "virginmap" => Some(View::Virginmap),
            "virginabuse" => Some(View::VirginAbuse),
            _ => None,
        }
    }
}

/// A template compared against one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    placeable: Mask,
    placed: Mask,
    current: usize,
    total_placeable: usize,
    total_size: usize,
}

impl Progress {
    /// Cells matching the board.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total_placeable(&self) -> usize {
        self.total_placeable
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Cells left to place.
    pub fn remaining(&self) -> i64 {
        self.total_placeable as i64 - self.current as i64
    }

    /// Completion in percent, 0 when nothing is placeable.
    pub fn percentage(&self) -> f64 {
        if self.total_placeable == 0 {
            return 0.0;
        }
        self.current as f64 / self.total_placeable as f64 * 100.0
    }

    pub fn placeable(&self) -> &Mask {
        &self.placeable
    }

    pub fn placed(&self) -> &Mask {
        &self.placed
    }

    /// Placeable cells not yet matching the board.
    pub fn to_place(&self) -> Mask {
        self.placeable.and_not(&self.placed)
    }

    /// No cell of the template can be painted.
    pub fn is_outside_canvas(&self) -> bool {
        self.total_placeable == 0
    }

    pub fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}
