//! Styles command implementation

use std::process::ExitCode;

use crate::config::TrackerConfig;
use crate::palette::Palette;
use crate::registry::StyleRegistry;
use crate::style::StyleError;

use super::{EXIT_ERROR, EXIT_SUCCESS};

/// Built-in styles plus the sheets of the configured styles directory.
pub(crate) fn style_registry(config: &TrackerConfig, palette_len: usize) -> Result<StyleRegistry, StyleError> {
    let mut registry = StyleRegistry::with_builtins(palette_len)?;
    if let Some(dir) = &config.render.styles_dir {
        match registry.load_dir(dir) {
            Ok(n) => log::info!("loaded {} style sheets from {}", n, dir.display()),
            Err(e) => log::warn!("couldn't read styles directory {}: {}", dir.display(), e),
        }
    }
    Ok(registry)
}

/// Execute the styles command
pub fn run_styles(config: &TrackerConfig) -> ExitCode {
    let registry = match style_registry(config, Palette::pxls_classic().len()) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    println!("Available styles ({}):", registry.len());
    for style in registry.iter() {
        let marker = if style.name() == config.render.style { " (default)" } else { "" };
        println!("  {:<12} {}x{}{}", style.name(), style.size(), style.size(), marker);
    }
    if !registry.contains(&config.render.style) {
        eprintln!("Warning: configured style '{}' is not available", config.render.style);
    }
    ExitCode::from(EXIT_SUCCESS)
}
