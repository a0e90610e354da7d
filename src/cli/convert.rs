//! Reduce, templatize and detemplatize command implementations

use std::path::Path;
use std::process::ExitCode;

use crate::codec::{decode, templatize};
use crate::config::TrackerConfig;
use crate::grid::IndexGrid;
use crate::link::DEFAULT_SCALE;
use crate::output::{load_png, output_path, save_png, scale_image};
use crate::palette::{Palette, TRANSPARENT};
use crate::quantize::reduce;
use crate::template::Template;

use super::styles::style_registry;
use super::{PaletteArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// Where the stylized image will be hosted, for printing its link.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    pub image_url: String,
    pub ox: i64,
    pub oy: i64,
    pub title: Option<String>,
}

fn palette_or_exit(args: &PaletteArgs) -> Result<Palette, ExitCode> {
    args.palette().map_err(|e| {
        eprintln!("Error: invalid palette: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })
}

fn reduce_input(input: &Path, palette: &Palette, config: &TrackerConfig) -> Result<IndexGrid, ExitCode> {
    let image = load_png(input).map_err(|e| {
        eprintln!("Error: cannot read '{}': {}", input.display(), e);
        ExitCode::from(EXIT_ERROR)
    })?;
    reduce(&image, palette, config.metric(), config.quantize.dither).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_ERROR)
    })
}

fn write(image: image::RgbaImage, path: &Path) -> ExitCode {
    match save_png(&image, path) {
        Ok(()) => {
            println!("Saved: {}", path.display());
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: failed to save '{}': {}", path.display(), e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}

fn describe(grid: &IndexGrid) -> String {
    format!("{}x{}, {} colored cells", grid.width(), grid.height(), grid.count(|v| v != TRANSPARENT))
}

/// Execute the reduce command
pub fn run_reduce(input: &Path, output: Option<&Path>, args: &PaletteArgs, config: &TrackerConfig) -> ExitCode {
    let palette = match palette_or_exit(args) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let grid = match reduce_input(input, &palette, config) {
        Ok(g) => g,
        Err(code) => return code,
    };
    println!("Reduced '{}' ({})", input.display(), describe(&grid));
    let image = scale_image(palette.render(&grid), config.render.scale);
    write(image, &output_path(input, "reduced", output))
}

/// Execute the templatize command
pub fn run_templatize(
    input: &Path,
    output: Option<&Path>,
    args: &PaletteArgs,
    config: &TrackerConfig,
    link: Option<LinkRequest>,
) -> ExitCode {
    let palette = match palette_or_exit(args) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let styles = match style_registry(config, palette.len()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let Some(style) = styles.get(&config.render.style) else {
        eprintln!("Error: unknown style '{}'", config.render.style);
        let names: Vec<&str> = styles.names().map(String::as_str).collect();
        eprintln!("Available styles: {}", names.join(", "));
        return ExitCode::from(EXIT_INVALID_ARGS);
    };
    let grid = match reduce_input(input, &palette, config) {
        Ok(g) => g,
        Err(code) => return code,
    };

    let image = match templatize(style, &grid, &palette, config.render.glow_opacity) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    println!("Templatized '{}' with style '{}' ({})", input.display(), style.name(), describe(&grid));

    let code = write(image, &output_path(input, "template", output));
    if let Some(request) = link {
        let template = Template::new(grid, request.ox, request.oy, "").with_title(request.title);
        let link = template.link(&config.tracker.canvas_url, &request.image_url, DEFAULT_SCALE);
        println!("Link: {}", link);
    }
    code
}

/// Execute the detemplatize command
pub fn run_detemplatize(
    input: &Path,
    true_width: u32,
    output: Option<&Path>,
    args: &PaletteArgs,
    config: &TrackerConfig,
) -> ExitCode {
    let palette = match palette_or_exit(args) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let image = match load_png(input) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", input.display(), e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let grid = match decode(&image, true_width, &palette, config.metric()) {
        Ok(grid) => grid,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    };
    println!("Decoded '{}' ({})", input.display(), describe(&grid));
    let image = scale_image(palette.render(&grid), config.render.scale);
    write(image, &output_path(input, "decoded", output))
}
