//! Errors surfaced by tracker operations.

use thiserror::Error;

use crate::canvas::CanvasError;
use crate::codec::CodecError;
use crate::fetch::FetchError;
use crate::grid::GridError;
use crate::link::LinkError;
use crate::quantize::QuantizeError;
use crate::store::StoreError;
use crate::style::StyleError;

/// Error from a registry or template operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("invalid template URL: {0}")]
    InvalidTemplateUrl(#[from] LinkError),
    #[error("couldn't download the template image: {0}")]
    FetchFailed(#[source] FetchError),
    #[error("the template image is corrupt: {0}")]
    CorruptImage(#[source] image::ImageError),
    #[error("there is already a template named '{0}'")]
    DuplicateName(String),
    #[error("this template is already tracked as '{0}'")]
    DuplicateContent(String),
    #[error("the name '{0}' is reserved")]
    ReservedName(String),
    #[error("you do not own template '{0}'")]
    Unauthorized(String),
    #[error("template '{0}' seems to be outside the canvas")]
    OutsideCanvas(String),
    #[error("no template named '{0}'")]
    NotFound(String),
    #[error("template is for canvas '{template}', current canvas is '{current}'")]
    WrongCanvas { template: String, current: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
    #[error(transparent)]
    Style(#[from] StyleError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error("persistence failed: {0}")]
    Store(#[from] StoreError),
}

impl From<FetchError> for TrackerError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Decode(source) => TrackerError::CorruptImage(source),
            other => TrackerError::FetchFailed(other),
        }
    }
}

impl TrackerError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, TrackerError::FetchFailed(FetchError::Io { .. }) | TrackerError::Store(_))
    }
}
