//! Template codec: stylized renders of index grids, and the way back.
//!
//! Encoding draws every cell as an `S`x`S` block using the style's stencil for
//! the cell's color. Decoding splits a render into blocks and keeps, for each
//! block, the first pixel in row-major order whose alpha exceeds
//! [`ANCHOR_ALPHA`], made opaque.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use thiserror::Error;

use crate::grid::IndexGrid;
use crate::palette::{Palette, TRANSPARENT};
use crate::quantize::{ColorMetric, QuantizeError, Quantizer};
use crate::style::{Style, StyleError, ANCHOR_ALPHA};

/// Error from encoding or decoding a template image.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("true width {true_width} does not fit an image {image_width} pixels wide")]
    InvalidTrueWidth { true_width: u32, image_width: u32 },
    #[error("glow opacity must be between 0 and 1, got {0}")]
    InvalidGlow(f64),
    #[error("glow opacity {0} is strong enough to be decoded as a color")]
    GlowHidesAnchor(f64),
    #[error("rendered image would be {width}x{height} pixels")]
    TooLarge { width: u64, height: u64 },
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
}

/// One rendered block, row-major RGBA.
type Block = Vec<Rgba<u8>>;

fn glow_alpha(glow: f64) -> Result<u8, CodecError> {
    if !(0.0..=1.0).contains(&glow) {
        return Err(CodecError::InvalidGlow(glow));
    }
    let alpha = (glow * 255.0).round() as u8;
    if alpha > ANCHOR_ALPHA {
        return Err(CodecError::GlowHidesAnchor(glow));
    }
    Ok(alpha)
}

/// Render one block per palette color.
///
/// Stencil pixels take the palette color at the stencil's alpha. The rest of
/// the block is the same color at `glow` opacity (0 leaves it transparent).
pub fn stylize(style: &Style, palette: &Palette, glow: f64) -> Result<Vec<Block>, CodecError> {
    style.validate(palette.len())?;
    let glow = glow_alpha(glow)?;
    let size = style.size();

    let mut blocks = Vec::with_capacity(palette.len());
    for (index, &color) in palette.colors().iter().enumerate() {
        let stencil = style.stencil(index).ok_or_else(|| StyleError::InvalidStencil {
            style: style.name().to_string(),
            index,
            reason: "missing stencil".to_string(),
        })?;
        let [r, g, b, _] = color.0;
        let mut block = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                block.push(Rgba([r, g, b, stencil.alpha(x, y).max(glow)]));
            }
        }
        blocks.push(block);
    }
    Ok(blocks)
}

/// Encode an index grid as a stylized image `S` times larger.
///
/// [`TRANSPARENT`] cells render as fully transparent blocks.
pub fn templatize(
    style: &Style,
    grid: &IndexGrid,
    palette: &Palette,
    glow: f64,
) -> Result<RgbaImage, CodecError> {
    let blocks = stylize(style, palette, glow)?;
    let size = style.size();
    let width = grid.width() as u64 * size as u64;
    let height = grid.height() as u64 * size as u64;
    if width > u32::MAX as u64 || height > u32::MAX as u64 {
        return Err(CodecError::TooLarge { width, height });
    }

    let mut image = RgbaImage::new(width as u32, height as u32);
    if width == 0 || height == 0 {
        return Ok(image);
    }

    let stride = width as usize * 4;
    let band = stride * size;
    image.par_chunks_mut(band).zip(grid.rows().collect::<Vec<_>>()).for_each(|(out, row)| {
        for (cx, &index) in row.iter().enumerate() {
            if index == TRANSPARENT {
                continue;
            }
            let Some(block) = blocks.get(index as usize) else {
                continue;
            };
            for by in 0..size {
                for bx in 0..size {
                    let offset = by * stride + (cx * size + bx) * 4;
                    out[offset..offset + 4].copy_from_slice(&block[by * size + bx].0);
                }
            }
        }
    });

    log::debug!(
        "templatized {}x{} grid with style '{}' into {}x{}",
        grid.width(),
        grid.height(),
        style.name(),
        width,
        height
    );
    Ok(image)
}

/// Block size of a stylized image whose source grid is `true_width` cells wide.
pub fn block_size(image_width: u32, true_width: u32) -> Result<u32, CodecError> {
    if true_width == 0 || true_width > image_width {
        return Err(CodecError::InvalidTrueWidth { true_width, image_width });
    }
    Ok(image_width / true_width)
}

/// Shrink a stylized image back to one pixel per cell.
///
/// The block size is `image.width() / true_width`. Every output pixel is the
/// first pixel of its block with alpha above [`ANCHOR_ALPHA`], made opaque,
/// or fully transparent when the block has none.
pub fn detemplatize(image: &RgbaImage, true_width: u32) -> Result<RgbaImage, CodecError> {
    let block = block_size(image.width(), true_width)?;
    let out_w = true_width;
    let out_h = image.height() / block;
    log::debug!(
        "detemplatizing {}x{} image with block size {} into {}x{}",
        image.width(),
        image.height(),
        block,
        out_w,
        out_h
    );

    let mut out = RgbaImage::new(out_w, out_h);
    if out_h == 0 {
        return Ok(out);
    }
    out.par_chunks_mut(out_w as usize * 4).enumerate().for_each(|(cy, row)| {
        for cx in 0..out_w {
            let pixel = anchor_pixel(image, cx * block, cy as u32 * block, block);
            let offset = cx as usize * 4;
            row[offset..offset + 4].copy_from_slice(&pixel.0);
        }
    });
    Ok(out)
}

fn anchor_pixel(image: &RgbaImage, x0: u32, y0: u32, block: u32) -> Rgba<u8> {
    for y in y0..y0 + block {
        for x in x0..x0 + block {
            let p = image.get_pixel(x, y);
            if p[3] > ANCHOR_ALPHA {
                return Rgba([p[0], p[1], p[2], 255]);
            }
        }
    }
    Rgba([0, 0, 0, 0])
}

/// Decode a stylized image into palette indices.
pub fn decode(
    image: &RgbaImage,
    true_width: u32,
    palette: &Palette,
    metric: ColorMetric,
) -> Result<IndexGrid, CodecError> {
    let small = detemplatize(image, true_width)?;
    let quantizer = Quantizer::new(palette, metric)?;
    Ok(quantizer.reduce(&small, 0.0)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::builtin_styles;

    fn sample_grid() -> IndexGrid {
        IndexGrid::from_rows(&[
            &[0, 1, 2, TRANSPARENT],
            &[31, TRANSPARENT, 5, 17],
            &[TRANSPARENT, 12, 12, 29],
        ])
        .unwrap()
    }

    #[test]
    fn test_round_trip_every_builtin_style() {
        let palette = Palette::pxls_classic();
        let grid = sample_grid();
        for style in builtin_styles() {
            for glow in [0.0, 0.2] {
                let image = templatize(&style, &grid, &palette, glow).unwrap();
                assert_eq!(image.width() as usize, grid.width() * style.size());
                let back = decode(&image, grid.width() as u32, &palette, ColorMetric::Euclidean).unwrap();
                assert_eq!(back, grid, "style {} glow {}", style.name(), glow);
            }
        }
    }

    /// Cycles through every palette index and [`TRANSPARENT`].
    fn cycling_grid(width: usize, height: usize, palette_len: usize) -> IndexGrid {
        let cells = (0..width * height)
            .map(|i| match (i * 7) % (palette_len + 1) {
                n if n == palette_len => TRANSPARENT,
                n => n as u8,
            })
            .collect();
        IndexGrid::from_vec(width, height, cells).unwrap()
    }

    #[test]
    fn test_round_trip_all_indices_and_sizes() {
        let palette = Palette::pxls_classic();
        let full = cycling_grid(16, 16, palette.len());
        for index in (0..palette.len() as u8).chain([TRANSPARENT]) {
            assert!(full.count(|v| v == index) > 0, "index {} not covered", index);
        }

        for (width, height) in [(1, 1), (5, 7), (33, 2), (16, 16)] {
            let grid = cycling_grid(width, height, palette.len());
            for style in builtin_styles() {
                for glow in [0.0, 0.3] {
                    let image = templatize(&style, &grid, &palette, glow).unwrap();
                    for metric in [ColorMetric::Euclidean, ColorMetric::Ciede2000] {
                        let back = decode(&image, width as u32, &palette, metric).unwrap();
                        assert_eq!(back, grid, "{}x{} style {} glow {} {:?}", width, height, style.name(), glow, metric);
                    }
                }
            }
        }
    }

    #[test]
    fn test_transparent_cells_render_empty() {
        let palette = Palette::pxls_classic();
        let style = builtin_styles().remove(1);
        let grid = IndexGrid::from_rows(&[&[TRANSPARENT]]).unwrap();
        let image = templatize(&style, &grid, &palette, 0.2).unwrap();
        assert!(image.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn test_stylize_glow_background() {
        let palette = Palette::from_hex(&["FF0000"]).unwrap();
        let style = builtin_styles().remove(1); // dotted
        let blocks = stylize(&style, &palette, 0.2).unwrap();
        assert_eq!(blocks[0][4], Rgba([255, 0, 0, 255]));
        assert_eq!(blocks[0][0], Rgba([255, 0, 0, 51]));
    }

    #[test]
    fn test_glow_validation() {
        let palette = Palette::from_hex(&["FF0000"]).unwrap();
        let style = builtin_styles().remove(0);
        assert_eq!(stylize(&style, &palette, 1.5).unwrap_err(), CodecError::InvalidGlow(1.5));
        assert_eq!(stylize(&style, &palette, 0.9).unwrap_err(), CodecError::GlowHidesAnchor(0.9));
    }

    #[test]
    fn test_detemplatize_takes_first_anchor() {
        let mut image = RgbaImage::new(2, 2);
        image.put_pixel(0, 0, Rgba([1, 2, 3, 128])); // not above the threshold
        image.put_pixel(1, 0, Rgba([10, 20, 30, 129]));
        image.put_pixel(0, 1, Rgba([99, 99, 99, 255]));
        let out = detemplatize(&image, 1).unwrap();
        assert_eq!(out.dimensions(), (1, 1));
        assert_eq!(out.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_detemplatize_empty_block_is_transparent() {
        let image = RgbaImage::from_pixel(6, 3, Rgba([50, 50, 50, 100]));
        let out = detemplatize(&image, 2).unwrap();
        assert_eq!(out.dimensions(), (2, 1));
        assert!(out.pixels().all(|p| p == &Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_invalid_true_width() {
        let image = RgbaImage::new(4, 4);
        assert_eq!(
            detemplatize(&image, 0).unwrap_err(),
            CodecError::InvalidTrueWidth { true_width: 0, image_width: 4 }
        );
        assert!(detemplatize(&image, 5).is_err());
        assert_eq!(block_size(9, 3), Ok(3));
        // widths that are not a multiple of the true width round down
        assert_eq!(block_size(10, 3), Ok(3));
    }

    #[test]
    fn test_style_must_cover_palette() {
        let mut sheet = RgbaImage::new(16, 16);
        sheet.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let style = Style::from_sheet("partial", &sheet).unwrap();
        let palette = Palette::from_hex(&["000000", "FFFFFF"]).unwrap();
        assert!(matches!(stylize(&style, &palette, 0.0), Err(CodecError::Style(_))));
    }
}
