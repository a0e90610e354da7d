//! Progress command implementations
//!
//! Every invocation rebuilds the canvas snapshot from PNG files and the
//! registry from a JSON store file, runs one action, and writes the store
//! back if the action changed it.

use chrono::Utc;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::canvas::{CanvasHandle, CanvasSnapshot};
use crate::config::TrackerConfig;
use crate::fetch::LocalFetcher;
use crate::link::parse_coords;
use crate::loader::TemplateLoader;
use crate::output::{load_png, save_png, scale_image};
use crate::registry::{TemplateRegistry, TemplateUpdate};
use crate::store::MemoryStore;
use crate::template::{Progress, Template, View};

use super::{PaletteArgs, EXIT_ERROR, EXIT_INVALID_ARGS, EXIT_SUCCESS};

/// The canvas snapshot and the store a progress command works on.
#[derive(Args, Debug, Clone)]
pub struct CanvasArgs {
    /// Board image
    #[arg(long)]
    pub board: PathBuf,

    /// Placemap image, transparent cells cannot be painted
    #[arg(long)]
    pub placemap: Option<PathBuf>,

    /// Virginmap image, non-black cells were never painted
    #[arg(long)]
    pub virginmap: Option<PathBuf>,

    /// Canvas code of the snapshot
    #[arg(long, default_value = "1")]
    pub canvas_code: String,

    #[command(flatten)]
    pub palette: PaletteArgs,

    /// JSON file holding tracked templates and their history
    #[arg(long, default_value = "pxtrack.json")]
    pub store: PathBuf,

    /// Directory relative template image paths are resolved against
    #[arg(long)]
    pub images_root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Check a template link without tracking it
    Check {
        /// Template link
        url: String,

        /// Image to write: progress, template, wrong, correct, canvas, virginmap, virginabuse
        #[arg(long, default_value = "progress")]
        view: String,

        /// Write the view to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Start tracking a template
    Add {
        /// Template name
        name: String,
        /// Template link
        url: String,
        /// Account adding the template
        #[arg(long)]
        owner: u64,
        /// Only visible to the owner
        #[arg(long)]
        hidden: bool,
    },
    /// Change a tracked template
    Update {
        /// Template name
        name: String,
        /// Account making the change
        #[arg(long)]
        user: u64,
        /// New template link
        #[arg(long)]
        url: Option<String>,
        /// New name
        #[arg(long)]
        rename: Option<String>,
        /// New owner
        #[arg(long)]
        owner: Option<u64>,
    },
    /// Stop tracking a template
    Delete {
        /// Template name
        name: String,
        /// Account making the change
        #[arg(long)]
        user: u64,
    },
    /// List tracked templates
    List {
        /// Also list hidden templates of this account
        #[arg(long)]
        owner: Option<u64>,
        /// Only templates covering this coordinate ("x y" or a pxls link)
        #[arg(long)]
        at: Option<String>,
    },
    /// Show progress, ETA and recent activity of a tracked template
    Info {
        /// Template name, or @combo
        name: String,
        /// Account asking, to see its hidden templates
        #[arg(long)]
        owner: Option<u64>,
        /// Image to write, as for `check`
        #[arg(long, default_value = "progress")]
        view: String,
        /// Write the view to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Record the current progress of every tracked template
    Record,
}

type Failure = Box<dyn std::error::Error>;

struct Session {
    store: Arc<MemoryStore>,
    store_path: PathBuf,
    registry: TemplateRegistry,
}

impl Session {
    fn open(args: &CanvasArgs, config: &TrackerConfig) -> Result<Self, Failure> {
        let palette = args.palette.palette()?;
        let board = load_png(&args.board)?;
        let placemap = args.placemap.as_deref().map(load_png).transpose()?;
        let virginmap = args.virginmap.as_deref().map(load_png).transpose()?;
        let snapshot = CanvasSnapshot::from_images(
            args.canvas_code.clone(),
            palette,
            &board,
            placemap.as_ref(),
            virginmap.as_ref(),
            Utc::now(),
        )?;
        log::info!("canvas '{}' is {}x{}", snapshot.canvas_code(), snapshot.width(), snapshot.height());

        let store = Arc::new(MemoryStore::load(&args.store)?);
        let fetcher = match &args.images_root {
            Some(root) => LocalFetcher::with_root(root.clone()),
            None => LocalFetcher::new(),
        };
        let loader = TemplateLoader::new(Arc::new(fetcher), config.metric());
        let registry = TemplateRegistry::new(
            store.clone(),
            loader,
            Arc::new(CanvasHandle::new(snapshot)),
            config.registry_options(),
        );
        registry.load()?;
        Ok(Self { store, store_path: args.store.clone(), registry })
    }

    fn save(&self) -> Result<(), Failure> {
        self.store.save(&self.store_path)?;
        Ok(())
    }
}

/// Colors listed under "Colors left"
const COLORS_SHOWN: usize = 5;

fn print_progress(template: &Template, progress: &Progress, snapshot: &CanvasSnapshot, chunk: usize) {
    println!(
        "Progress:    {}/{} ({:.2}%), {} left",
        progress.current(),
        progress.total_placeable(),
        progress.percentage(),
        progress.remaining()
    );
    println!(
        "Size:        {}x{} at ({}, {}), {} pixels",
        template.width(),
        template.height(),
        template.ox(),
        template.oy(),
        progress.total_size()
    );
    let unplaceable = progress.total_size() - progress.total_placeable();
    if unplaceable > 0 {
        println!("Unplaceable: {} pixels", unplaceable);
    }
    let abuse = template.virgin_abuse(snapshot, progress);
    if abuse > 0 {
        println!("Virgin abuse: {} pixels", abuse);
    }
    let left = template.remaining_by_color(progress);
    if !left.is_empty() {
        println!("Colors left:");
        for (index, count) in left.iter().take(COLORS_SHOWN) {
            let label = snapshot.palette().describe(*index).unwrap_or_else(|| format!("#{}", index));
            println!("  {:<24} {}", label, count);
        }
    }
    match template.find_coords(progress, chunk) {
        Some((x, y)) => println!("Work needed around ({}, {})", x, y),
        None if progress.is_done() => println!("Template is done"),
        None => {}
    }
}

fn write_view(
    template: &Template,
    progress: &Progress,
    snapshot: &CanvasSnapshot,
    view: View,
    output: &Path,
    config: &TrackerConfig,
) -> Result<(), Failure> {
    let image = template.display(snapshot, progress, view, config.progress.progress_opacity);
    save_png(&scale_image(image, config.render.scale), output)?;
    println!("Saved: {}", output.display());
    Ok(())
}

fn run_action(session: &Session, action: ProgressAction, view: View, config: &TrackerConfig) -> Result<(), Failure> {
    let registry = &session.registry;
    let snapshot = registry.canvas();
    match action {
        ProgressAction::Check { url, output, .. } => {
            let template = registry.loader().load(&url, &snapshot)?;
            let progress = template.progress(&snapshot);
            if progress.is_outside_canvas() {
                println!("Template is outside the canvas");
            } else {
                print_progress(&template, &progress, &snapshot, config.progress.hotspot_chunk);
            }
            if let Some(tracked) = registry.find_duplicate(&template, false, 0) {
                println!("Tracked as:  {}", tracked.name().unwrap_or_default());
            }
            if let Some(path) = output {
                write_view(&template, &progress, &snapshot, view, &path, config)?;
            }
        }
        ProgressAction::Add { name, url, owner, hidden } => {
            let template = registry.loader().load(&url, &snapshot)?;
            let template = registry.save(template, &name, owner, hidden)?;
            session.save()?;
            let progress = template.progress(&snapshot);
            println!("Template '{}' added: {}/{} pixels", name, progress.current(), progress.total_placeable());
        }
        ProgressAction::Update { name, user, url, rename, owner } => {
            let change = TemplateUpdate { url, name: rename, owner_id: owner };
            let template = registry.update(&name, user, change)?;
            session.save()?;
            println!("Template '{}' updated", template.name().unwrap_or_default());
        }
        ProgressAction::Delete { name, user } => {
            registry.delete(&name, user)?;
            session.save()?;
            println!("Template '{}' deleted", name);
        }
        ProgressAction::List { owner, at } => {
            let coords = match &at {
                Some(text) => {
                    Some(parse_coords(text).ok_or_else(|| format!("cannot read coordinates from '{}'", text))?)
                }
                None => None,
            };
            let mut templates = match coords {
                Some((x, y)) => registry.templates_at(x, y),
                None => registry.public_templates(),
            };
            if let Some(owner) = owner {
                let covering = |t: &Arc<Template>| coords.map_or(true, |(x, y)| t.covers(&snapshot, x, y));
                templates.extend(registry.hidden_templates(owner).into_iter().filter(covering));
            }
            if templates.is_empty() {
                println!("No templates");
            }
            for template in templates {
                let progress = template.progress(&snapshot);
                let hidden = if template.hidden() { " (hidden)" } else { "" };
                println!(
                    "{:<20} {:>8}/{:<8} {:>6.2}%{}",
                    template.name().unwrap_or_default(),
                    progress.current(),
                    progress.total_placeable(),
                    progress.percentage(),
                    hidden
                );
            }
        }
        ProgressAction::Info { name, owner, output, .. } => {
            let template = registry.get(&name, owner).ok_or_else(|| format!("no template named '{}'", name))?;
            let progress = template.progress(&snapshot);
            println!("Template:    {}", name);
            if let Some(title) = template.title() {
                println!("Title:       {}", title);
            }
            print_progress(&template, &progress, &snapshot, config.progress.hotspot_chunk);

            let now = Utc::now();
            println!("ETA:         {}", registry.eta(&name, owner, now)?);
            let activity = registry.activity(&name, owner, now)?;
            for window in &activity.windows {
                let delta = window.delta.map_or_else(|| "-".to_string(), |d| format!("{:+}", d));
                println!("Last {:<10} {}", window.name, delta);
            }
            if let Some(average) = activity.average {
                println!("Average:     {:.1} px/day, {:.1} px/h", average.per_day, average.per_hour);
            }
            if let Some(first) = registry.oldest_record(&name, owner)? {
                println!("Tracked since {}", first.datetime.format("%Y-%m-%d %H:%M UTC"));
            }
            if let Some(path) = output {
                write_view(&template, &progress, &snapshot, view, &path, config)?;
            }
        }
        ProgressAction::Record => {
            let count = registry.record_progress(Utc::now())?;
            session.save()?;
            println!("Recorded progress of {} templates", count);
        }
    }
    Ok(())
}

/// Execute a progress subcommand
pub fn run_progress(args: &CanvasArgs, action: ProgressAction, config: &TrackerConfig) -> ExitCode {
    let view_name = match &action {
        ProgressAction::Check { view, .. } | ProgressAction::Info { view, .. } => view.as_str(),
        _ => "progress",
    };
    let Some(view) = View::from_name(view_name) else {
        eprintln!("Error: unknown view '{}'", view_name);
        return ExitCode::from(EXIT_INVALID_ARGS);
    };

    let session = match Session::open(args, config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    match run_action(&session, action, view, config) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
