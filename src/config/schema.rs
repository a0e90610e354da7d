//! Configuration schema types for `pxtrack.toml`
//!
//! Defines the structure and validation rules of the tracker configuration.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::quantize::ColorMetric;
use crate::registry::RegistryOptions;
use crate::template::{DEFAULT_HOTSPOT_CHUNK, DEFAULT_PROGRESS_OPACITY};

/// Identity and permission settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerSection {
    /// Account that owns the combo
    #[serde(default)]
    pub bot_id: u64,
    /// Accounts allowed to edit any template
    #[serde(default)]
    pub super_users: Vec<u64>,
    /// Base URL used when generating template links
    #[serde(default = "default_canvas_url")]
    pub canvas_url: String,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self { bot_id: 0, super_users: Vec::new(), canvas_url: default_canvas_url() }
    }
}

fn default_canvas_url() -> String {
    "https://pxls.space/".to_string()
}

/// Color reduction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizeConfig {
    /// Color distance, `euclidean` or `ciede2000`
    #[serde(default = "default_metric")]
    pub metric: String,
    /// Floyd-Steinberg error diffusion strength in 0..=1
    #[serde(default)]
    pub dither: f64,
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self { metric: default_metric(), dither: 0.0 }
    }
}

fn default_metric() -> String {
    "euclidean".to_string()
}

/// Progress reporting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// History window for ETA speed, in days
    #[serde(default = "default_eta_window_days")]
    pub eta_window_days: u32,
    /// Side of the chunks searched for the densest to-do area
    #[serde(default = "default_hotspot_chunk")]
    pub hotspot_chunk: usize,
    /// Opacity of the green/red progress overlay
    #[serde(default = "default_progress_opacity")]
    pub progress_opacity: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            eta_window_days: default_eta_window_days(),
            hotspot_chunk: default_hotspot_chunk(),
            progress_opacity: default_progress_opacity(),
        }
    }
}

fn default_eta_window_days() -> u32 {
    7
}

fn default_hotspot_chunk() -> usize {
    DEFAULT_HOTSPOT_CHUNK
}

fn default_progress_opacity() -> f64 {
    DEFAULT_PROGRESS_OPACITY
}

/// Template rendering settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Default style name
    #[serde(default = "default_style")]
    pub style: String,
    /// Glow opacity around each anchor
    #[serde(default)]
    pub glow_opacity: f64,
    /// Directory of extra style sheets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles_dir: Option<PathBuf>,
    /// Nearest-neighbor upscale factor for image output
    #[serde(default = "default_scale")]
    pub scale: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { style: default_style(), glow_opacity: 0.0, styles_dir: None, scale: default_scale() }
    }
}

fn default_style() -> String {
    "dotted".to_string()
}

fn default_scale() -> u32 {
    1
}

/// Complete `pxtrack.toml` configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(default)]
    pub tracker: TrackerSection,
    #[serde(default)]
    pub quantize: QuantizeConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "quantize.dither")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pxtrack.toml: '{}' {}", self.field, self.message)
    }
}

impl TrackerConfig {
    /// Validate the configuration and return every error found
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: &str| {
            errors.push(ConfigValidationError { field: field.to_string(), message: message.to_string() })
        };

        if ColorMetric::from_name(&self.quantize.metric).is_none() {
            push("quantize.metric", "must be 'euclidean' or 'ciede2000'");
        }
        if !(0.0..=1.0).contains(&self.quantize.dither) {
            push("quantize.dither", "must be between 0 and 1");
        }
        if self.progress.eta_window_days == 0 {
            push("progress.eta_window_days", "must be a positive integer");
        }
        if self.progress.hotspot_chunk == 0 {
            push("progress.hotspot_chunk", "must be a positive integer");
        }
        if !(0.0..=1.0).contains(&self.progress.progress_opacity) {
            push("progress.progress_opacity", "must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.render.glow_opacity) {
            push("render.glow_opacity", "must be between 0 and 1");
        }
        if self.render.scale == 0 {
            push("render.scale", "must be a positive integer");
        }
        if self.render.style.is_empty() {
            push("render.style", "must be a non-empty string");
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Color metric, euclidean if the name is unknown.
    pub fn metric(&self) -> ColorMetric {
        ColorMetric::from_name(&self.quantize.metric).unwrap_or(ColorMetric::Euclidean)
    }

    /// Registry settings derived from `[tracker]` and `[progress]`.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            bot_id: self.tracker.bot_id,
            super_users: self.tracker.super_users.clone(),
            eta_window: Duration::days(i64::from(self.progress.eta_window_days)),
        }
    }
}
