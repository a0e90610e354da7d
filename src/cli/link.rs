//! Link command implementations

use clap::Subcommand;
use std::process::ExitCode;

use crate::config::TrackerConfig;
use crate::link::{parse_coords, TemplateLink, DEFAULT_SCALE};

use super::{EXIT_INVALID_ARGS, EXIT_SUCCESS};

#[derive(Subcommand)]
pub enum LinkAction {
    /// Show the parameters of a template link
    Parse {
        /// Template link
        url: String,
    },
    /// Build a template link
    Make {
        /// URL of the stylized template image
        image_url: String,

        /// Width of the template in canvas pixels
        #[arg(long)]
        tw: u32,

        /// Template x offset
        #[arg(long, allow_negative_numbers = true)]
        ox: i64,

        /// Template y offset
        #[arg(long, allow_negative_numbers = true)]
        oy: i64,

        /// Template title
        #[arg(long)]
        title: Option<String>,

        /// View center as "x y" or a pxls link (default: the offset)
        #[arg(long)]
        center: Option<String>,

        /// View zoom
        #[arg(long, default_value_t = DEFAULT_SCALE)]
        scale: f64,

        /// Template overlay opacity
        #[arg(long)]
        opacity: Option<f64>,

        /// Canvas URL (default: tracker.canvas_url)
        #[arg(long)]
        base: Option<String>,
    },
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Execute a link subcommand
pub fn run_link(action: LinkAction, config: &TrackerConfig) -> ExitCode {
    match action {
        LinkAction::Parse { url } => {
            let link = match TemplateLink::parse(&url) {
                Ok(link) => link,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    return ExitCode::from(EXIT_INVALID_ARGS);
                }
            };
            println!("Canvas:      {}", link.base);
            println!("Image:       {}", link.image_url);
            println!("True width:  {}", link.true_width);
            println!("Offset:      ({}, {})", link.ox, link.oy);
            println!("Title:       {}", link.title.as_deref().unwrap_or("-"));
            println!("Center:      ({}, {})", optional(link.x), optional(link.y));
            println!("Scale:       {}", optional(link.scale));
            println!("Opacity:     {}", optional(link.opacity));
            ExitCode::from(EXIT_SUCCESS)
        }
        LinkAction::Make { image_url, tw, ox, oy, title, center, scale, opacity, base } => {
            let base = base.unwrap_or_else(|| config.tracker.canvas_url.clone());
            let mut link = TemplateLink::new(base, image_url, tw, ox, oy).with_scale(scale);
            if let Some(text) = center {
                let Some((x, y)) = parse_coords(&text) else {
                    eprintln!("Error: cannot read coordinates from '{}'", text);
                    return ExitCode::from(EXIT_INVALID_ARGS);
                };
                link = link.with_center(x, y);
            }
            if let Some(title) = title {
                link = link.with_title(title);
            }
            link.opacity = opacity;
            println!("{}", link);
            ExitCode::from(EXIT_SUCCESS)
        }
    }
}
