//! The combo: every public template merged into one canvas-sized template.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::canvas::CanvasSnapshot;
use crate::grid::IndexGrid;
use crate::palette::TRANSPARENT;
use crate::template::Template;

/// Reserved name of the combo template.
pub const COMBO_NAME: &str = "@combo";

/// Whether `name` refers to the combo.
pub fn is_combo_name(name: &str) -> bool {
    name == COMBO_NAME
}

/// Merge templates, given in registration order, into the combo.
///
/// Hidden templates are skipped. Templates are painted newest first, so on a
/// contested cell the earliest registered template wins. Cells the placemap
/// excludes end up [`TRANSPARENT`].
pub fn compose(templates: &[impl AsRef<Template>], snapshot: &CanvasSnapshot, bot_id: u64) -> Template {
    let never = AtomicBool::new(false);
    compose_cancellable(templates, snapshot, bot_id, &never).unwrap_or_else(|| {
        Template::new(IndexGrid::filled(0, 0, TRANSPARENT), 0, 0, snapshot.canvas_code())
    })
}

/// Like [`compose`], giving up with `None` once `cancel` is set.
pub fn compose_cancellable(
    templates: &[impl AsRef<Template>],
    snapshot: &CanvasSnapshot,
    bot_id: u64,
    cancel: &AtomicBool,
) -> Option<Template> {
    let mut grid = IndexGrid::filled(snapshot.width(), snapshot.height(), TRANSPARENT);
    let mut painted = 0;
    for template in templates.iter().rev().map(AsRef::as_ref) {
        if cancel.load(Ordering::Relaxed) {
            log::debug!("combo recomposition cancelled");
            return None;
        }
        if template.hidden() || template.name().is_some_and(is_combo_name) {
            continue;
        }
        grid.paint(template.grid(), template.ox(), template.oy());
        painted += 1;
    }

    let placeable = snapshot.placemap().mask(|v| v != TRANSPARENT);
    let grid = grid.masked(&placeable);
    log::debug!("combo recomposed from {} templates on '{}'", painted, snapshot.canvas_code());
    Some(Template::new(grid, 0, 0, snapshot.canvas_code()).with_identity(COMBO_NAME, bot_id, false))
}
