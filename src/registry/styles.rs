//! Registry of template render styles.

use std::collections::BTreeMap;
use std::path::Path;

use crate::style::{builtin_styles, Style, StyleError};

/// Styles usable with a palette of a given size.
///
/// A style is only accepted if it has a stencil of the right size for every
/// palette index, so every registered style encodes and decodes losslessly.
///
/// # Example
///
/// ```
/// use pxtrack::registry::StyleRegistry;
///
/// let registry = StyleRegistry::with_builtins(32).unwrap();
/// assert!(registry.contains("dotted"));
/// assert_eq!(registry.get("plus").map(|s| s.size()), Some(3));
/// ```
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    palette_len: usize,
    styles: BTreeMap<String, Style>,
}

impl StyleRegistry {
    /// An empty registry for palettes of `palette_len` colors.
    pub fn new(palette_len: usize) -> Self {
        Self { palette_len, styles: BTreeMap::new() }
    }

    /// A registry holding the built-in styles.
    pub fn with_builtins(palette_len: usize) -> Result<Self, StyleError> {
        let mut registry = Self::new(palette_len);
        for style in builtin_styles() {
            registry.register(style)?;
        }
        Ok(registry)
    }

    /// Validate and add a style, replacing one with the same name.
    pub fn register(&mut self, style: Style) -> Result<(), StyleError> {
        style.validate(self.palette_len)?;
        self.styles.insert(style.name().to_string(), style);
        Ok(())
    }

    /// Load every `*.png` style sheet in a directory.
    ///
    /// Sheets that fail to load or validate are skipped with a warning.
    /// Returns the number of styles added.
    pub fn load_dir(&mut self, dir: &Path) -> std::io::Result<usize> {
        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")))
            .collect();
        paths.sort();

        let mut added = 0;
        for path in paths {
            match Style::load_sheet(&path).and_then(|style| self.register(style)) {
                Ok(()) => added += 1,
                Err(e) => log::warn!("skipping style sheet {}: {}", path.display(), e),
            }
        }
        Ok(added)
    }

    /// Styles sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Style> {
        self.styles.values()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// The style registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Style> {
        self.styles.get(name)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.styles.keys()
    }
}
