//! Configuration loading and discovery for `pxtrack.toml`
//!
//! Provides functions to find, load, and override configuration.

use super::schema::TrackerConfig;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the configuration file
pub const CONFIG_FILE: &str = "pxtrack.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse pxtrack.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Override color metric
    pub metric: Option<String>,
    /// Override dithering strength
    pub dither: Option<f64>,
    /// Override render style
    pub style: Option<String>,
    /// Override glow opacity
    pub glow_opacity: Option<f64>,
    /// Override output scale factor
    pub scale: Option<u32>,
    /// Override style sheet directory
    pub styles_dir: Option<PathBuf>,
}

/// Find pxtrack.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for pxtrack.toml
/// 2. Check XDG_CONFIG_HOME/pxtrack/pxtrack.toml (or ~/.config/pxtrack/pxtrack.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find pxtrack.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("pxtrack").join(CONFIG_FILE);
    config_path.exists().then_some(config_path)
}

/// Find pxtrack.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a pxtrack.toml file.
///
/// With a path, loads that file. Otherwise uses [`find_config`] and falls
/// back to the defaults when nothing is found.
///
/// # Example
/// ```ignore
/// let config = load_config(Some(Path::new("bot/pxtrack.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<TrackerConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(TrackerConfig::default()),
    }
}

fn load_config_file(path: &Path) -> Result<TrackerConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: TrackerConfig = toml::from_str(&contents)?;
    check(&config)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

fn check(config: &TrackerConfig) -> Result<(), ConfigError> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }
    Ok(())
}

/// Merge CLI overrides into a configuration and re-validate it.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut TrackerConfig, overrides: &CliOverrides) -> Result<(), ConfigError> {
    if let Some(ref metric) = overrides.metric {
        config.quantize.metric = metric.clone();
    }
    if let Some(dither) = overrides.dither {
        config.quantize.dither = dither;
    }
    if let Some(ref style) = overrides.style {
        config.render.style = style.clone();
    }
    if let Some(glow) = overrides.glow_opacity {
        config.render.glow_opacity = glow;
    }
    if let Some(scale) = overrides.scale {
        config.render.scale = scale;
    }
    if let Some(ref dir) = overrides.styles_dir {
        config.render.styles_dir = Some(dir.clone());
    }
    check(config)
}
