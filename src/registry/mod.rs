//! Named collections: render styles and tracked templates.
//!
//! - [`StyleRegistry`] holds the styles a template can be rendered with
//! - [`TemplateRegistry`] holds tracked templates and keeps the combo in sync

mod styles;
mod templates;

pub use styles::StyleRegistry;
pub use templates::{RegistryOptions, RegistryState, TemplateRegistry, TemplateUpdate};
