//! pxtrack - Template progress tracking for pxls.space style canvases
//!
//! This library provides functionality to:
//! - Reduce images to a canvas palette, with optional dithering
//! - Encode templates as stylized images and decode them back
//! - Measure template progress against a canvas snapshot
//! - Keep a registry of tracked templates and their merged combo
//! - Record progress history and estimate completion times

pub mod canvas;
pub mod cli;
pub mod codec;
pub mod color;
pub mod combo;
pub mod config;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod history;
pub mod link;
pub mod loader;
pub mod output;
pub mod overlay;
pub mod palette;
pub mod quantize;
pub mod registry;
pub mod store;
pub mod style;
pub mod template;

pub use error::TrackerError;
