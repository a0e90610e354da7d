//! Building templates from template links.

use std::sync::Arc;

use crate::canvas::CanvasSnapshot;
use crate::error::TrackerError;
use crate::fetch::ImageFetcher;
use crate::link::TemplateLink;
use crate::quantize::ColorMetric;
use crate::template::Template;

/// Parses a link, fetches its image and decodes it against the canvas palette.
#[derive(Clone)]
pub struct TemplateLoader {
    fetcher: Arc<dyn ImageFetcher>,
    metric: ColorMetric,
}

impl TemplateLoader {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, metric: ColorMetric) -> Self {
        Self { fetcher, metric }
    }

    pub fn metric(&self) -> ColorMetric {
        self.metric
    }

    /// Load the template a link describes, for the snapshot's canvas.
    pub fn load(&self, url: &str, snapshot: &CanvasSnapshot) -> Result<Template, TrackerError> {
        let link = TemplateLink::parse(url)?;
        let image = self.fetcher.fetch(&link.image_url)?;
        let template =
            Template::from_link(url, &link, &image, snapshot.palette(), self.metric, snapshot.canvas_code())?;
        Ok(template)
    }
}

impl std::fmt::Debug for TemplateLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLoader").field("metric", &self.metric).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::templatize;
    use crate::fetch::{to_data_url, LocalFetcher};
    use crate::grid::IndexGrid;
    use crate::palette::Palette;
    use crate::style::builtin_styles;
    use chrono::Utc;

    fn snapshot() -> CanvasSnapshot {
        CanvasSnapshot::new(
            "c1",
            Palette::pxls_classic(),
            IndexGrid::filled(8, 8, 0),
            IndexGrid::filled(8, 8, 0),
            IndexGrid::filled(8, 8, 0),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_load_data_url() {
        let grid = IndexGrid::from_rows(&[&[1, 2], &[3, 255]]).unwrap();
        let style = builtin_styles().remove(2);
        let image = templatize(&style, &grid, &Palette::pxls_classic(), 0.0).unwrap();
        let data_url = to_data_url(&image).unwrap();
        let url = crate::link::TemplateLink::new("https://pxls.space/", data_url, 2, 3, 4).with_title("t").to_url();

        let loader = TemplateLoader::new(Arc::new(LocalFetcher::new()), ColorMetric::Euclidean);
        let template = loader.load(&url, &snapshot()).unwrap();
        assert_eq!(template.grid(), &grid);
        assert_eq!((template.ox(), template.oy()), (3, 4));
        assert_eq!(template.title(), Some("t"));
        assert_eq!(template.url(), Some(url.as_str()));
        assert_eq!(template.canvas_code(), "c1");
    }

    #[test]
    fn test_load_errors() {
        let loader = TemplateLoader::new(Arc::new(LocalFetcher::new()), ColorMetric::Euclidean);
        assert!(matches!(loader.load("not a link", &snapshot()), Err(TrackerError::InvalidTemplateUrl(_))));
        let remote = "https://pxls.space/#template=https%3A%2F%2Fi.imgur.com%2Fa.png&tw=2&ox=0&oy=0";
        assert!(matches!(loader.load(remote, &snapshot()), Err(TrackerError::FetchFailed(_))));
    }

    #[test]
    fn test_load_corrupt_image() {
        let loader = TemplateLoader::new(Arc::new(LocalFetcher::new()), ColorMetric::Euclidean);
        // "junk" encoded as a PNG data URL
        let corrupt = "https://pxls.space/#template=data%3Aimage%2Fpng%3Bbase64%2CanVuaw%3D%3D&tw=2&ox=0&oy=0";
        let err = loader.load(corrupt, &snapshot()).unwrap_err();
        assert!(matches!(err, TrackerError::CorruptImage(_)));
        assert!(!err.is_transient());
    }
}
