//! PNG input and output for the command-line tool

use image::imageops::FilterType;
use image::RgbaImage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error reading or writing an image file
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Open an image file as RGBA.
pub fn load_png(path: &Path) -> Result<RgbaImage, OutputError> {
    Ok(image::open(path)?.to_rgba8())
}

/// Save an RGBA image to a PNG file, creating parent directories.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    image.save(path)?;
    Ok(())
}

/// Scale image by an integer factor using nearest-neighbor interpolation.
///
/// Keeps cell edges crisp, a factor of 0 or 1 returns the image unchanged.
pub fn scale_image(image: RgbaImage, factor: u32) -> RgbaImage {
    if factor <= 1 {
        return image;
    }
    let (w, h) = image.dimensions();
    image::imageops::resize(&image, w * factor, h * factor, FilterType::Nearest)
}

/// Where to write the result of a command.
///
/// | Scenario | Output |
/// |----------|--------|
/// | no `-o`, input `art.png`, suffix `template` | `art_template.png` |
/// | `-o out.png` | `out.png` |
/// | `-o dir/` | `dir/art_template.png` |
pub fn output_path(input: &Path, suffix: &str, output_arg: Option<&Path>) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "output".to_string());
    let file_name = format!("{}_{}.png", stem, suffix);

    match output_arg {
        None => input.with_file_name(file_name),
        Some(out) if out.is_dir() || out.to_string_lossy().ends_with('/') => out.join(file_name),
        Some(out) => out.to_path_buf(),
    }
}
