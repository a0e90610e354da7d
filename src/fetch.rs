//! Retrieving template images.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::{ImageEncoder, RgbaImage};
use thiserror::Error;

/// Error fetching an image.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    #[error("no fetcher for '{0}'")]
    Unsupported(String),
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data URL: {0}")]
    InvalidDataUrl(String),
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Source of template images.
pub trait ImageFetcher: Send + Sync {
    /// Fetch and decode the image at `url`.
    fn fetch(&self, url: &str) -> Result<RgbaImage, FetchError>;
}

/// Fetches `data:` URLs, `file://` URLs and plain paths.
///
/// Relative paths resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct LocalFetcher {
    root: Option<PathBuf>,
}

impl LocalFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: Some(root.into()) }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageFetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> Result<RgbaImage, FetchError> {
        let url = url.trim();
        if let Some(data) = url.strip_prefix("data:") {
            return decode_data_url(data);
        }
        let path = match url.strip_prefix("file://") {
            Some(path) => self.resolve(path),
            None if url.contains("://") => return Err(FetchError::Unsupported(url.to_string())),
            None => self.resolve(url),
        };
        let bytes = std::fs::read(&path).map_err(|source| FetchError::Io { path, source })?;
        Ok(image::load_from_memory(&bytes)?.to_rgba8())
    }
}

/// Decode the part of a data URL after `data:`.
fn decode_data_url(data: &str) -> Result<RgbaImage, FetchError> {
    let (meta, payload) =
        data.split_once(',').ok_or_else(|| FetchError::InvalidDataUrl("missing ','".to_string()))?;
    if !meta.ends_with(";base64") {
        return Err(FetchError::InvalidDataUrl("only base64 payloads are supported".to_string()));
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| FetchError::InvalidDataUrl(e.to_string()))?;
    Ok(image::load_from_memory(&bytes)?.to_rgba8())
}

/// Encode an image as a `data:image/png;base64,` URL.
pub fn to_data_url(image: &RgbaImage) -> Result<String, FetchError> {
    let mut png = Vec::new();
    image::codecs::png::PngEncoder::new(Cursor::new(&mut png)).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(&png)))
}
