//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod convert;
mod link;
pub mod logger;
mod progress;
mod styles;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::config::{load_config, merge_cli_overrides, CliOverrides, TrackerConfig};
use crate::palette::{Palette, PaletteError};

pub use link::LinkAction;
pub use progress::{CanvasArgs, ProgressAction};

/// Exit codes of the tool
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// pxtrack - Convert, decode and track pxls.space templates
#[derive(Parser)]
#[command(name = "pxtrack")]
#[command(about = "pxtrack - Convert, decode and track pxls.space templates")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to pxtrack.toml (default: discovered from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by commands that map colors to the palette.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PaletteArgs {
    /// Comma-separated hex colors (default: the classic pxls.space palette)
    #[arg(long)]
    pub palette: Option<String>,

    /// Color distance: euclidean or ciede2000
    #[arg(long)]
    pub metric: Option<String>,
}

impl PaletteArgs {
    pub(crate) fn palette(&self) -> Result<Palette, PaletteError> {
        match &self.palette {
            Some(list) => {
                let colors: Vec<&str> = list.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
                Palette::from_hex(&colors)
            }
            None => Ok(Palette::pxls_classic()),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reduce an image to the palette
    Reduce {
        /// Input image
        input: PathBuf,

        /// Output file or directory (default: {input}_reduced.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        palette: PaletteArgs,

        /// Error diffusion strength between 0 and 1
        #[arg(long)]
        dither: Option<f64>,

        /// Scale output by integer factor
        #[arg(long)]
        scale: Option<u32>,
    },

    /// Render an image as a stylized template
    Templatize {
        /// Input image, reduced to the palette first
        input: PathBuf,

        /// Output file or directory (default: {input}_template.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        palette: PaletteArgs,

        /// Error diffusion strength between 0 and 1
        #[arg(long)]
        dither: Option<f64>,

        /// Style name (see `pxtrack styles`)
        #[arg(long)]
        style: Option<String>,

        /// Glow opacity around each anchor
        #[arg(long)]
        glow: Option<f64>,

        /// Directory of extra style sheets
        #[arg(long)]
        styles_dir: Option<PathBuf>,

        /// Print a template link pointing at this image URL
        #[arg(long)]
        image_url: Option<String>,

        /// Template x offset for the printed link
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        ox: i64,

        /// Template y offset for the printed link
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        oy: i64,

        /// Title for the printed link
        #[arg(long)]
        title: Option<String>,
    },

    /// Decode a stylized template back to one pixel per cell
    Detemplatize {
        /// Stylized template image
        input: PathBuf,

        /// Width of the template in canvas pixels
        #[arg(long)]
        tw: u32,

        /// Output file or directory (default: {input}_decoded.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        palette: PaletteArgs,

        /// Scale output by integer factor
        #[arg(long)]
        scale: Option<u32>,
    },

    /// Parse or build template links
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Track template progress against a canvas snapshot
    Progress {
        #[command(flatten)]
        canvas: CanvasArgs,

        #[command(subcommand)]
        action: ProgressAction,
    },

    /// List available template styles
    Styles {
        /// Directory of extra style sheets
        #[arg(long)]
        styles_dir: Option<PathBuf>,
    },
}

fn load(path: Option<&std::path::Path>, overrides: &CliOverrides) -> Result<TrackerConfig, ExitCode> {
    let mut config = load_config(path).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_ERROR)
    })?;
    merge_cli_overrides(&mut config, overrides).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(EXIT_INVALID_ARGS)
    })?;
    Ok(config)
}

/// Run the CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let overrides = match &cli.command {
        Commands::Reduce { palette, dither, scale, .. } => CliOverrides {
            metric: palette.metric.clone(),
            dither: *dither,
            scale: *scale,
            ..Default::default()
        },
        Commands::Templatize { palette, dither, style, glow, styles_dir, .. } => CliOverrides {
            metric: palette.metric.clone(),
            dither: *dither,
            style: style.clone(),
            glow_opacity: *glow,
            styles_dir: styles_dir.clone(),
            ..Default::default()
        },
        Commands::Detemplatize { palette, scale, .. } => {
            CliOverrides { metric: palette.metric.clone(), scale: *scale, ..Default::default() }
        }
        Commands::Progress { canvas, .. } => CliOverrides { metric: canvas.palette.metric.clone(), ..Default::default() },
        Commands::Styles { styles_dir } => CliOverrides { styles_dir: styles_dir.clone(), ..Default::default() },
        Commands::Link { .. } => CliOverrides::default(),
    };
    let config = match load(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(code) => return code,
    };

    match cli.command {
        Commands::Reduce { input, output, palette, .. } => {
            convert::run_reduce(&input, output.as_deref(), &palette, &config)
        }
        Commands::Templatize { input, output, palette, image_url, ox, oy, title, .. } => {
            let link = image_url.map(|url| convert::LinkRequest { image_url: url, ox, oy, title });
            convert::run_templatize(&input, output.as_deref(), &palette, &config, link)
        }
        Commands::Detemplatize { input, tw, output, palette, .. } => {
            convert::run_detemplatize(&input, tw, output.as_deref(), &palette, &config)
        }
        Commands::Link { action } => link::run_link(action, &config),
        Commands::Progress { canvas, action } => progress::run_progress(&canvas, action, &config),
        Commands::Styles { .. } => styles::run_styles(&config),
    }
}
