//! Persistence of templates and their progress history.
//!
//! [`TemplateStore`] is the seam to whatever database backs the tracker.
//! [`MemoryStore`] keeps everything in memory and can be saved as JSON.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::ProgressRecord;

/// Error from a template store.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("no stored template {0}")]
    NotFound(String),
    #[error("a stored template already matches {0}")]
    Conflict(String),
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The key a template is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateIdentity {
    pub name: String,
    pub canvas_code: String,
    pub owner_id: u64,
    pub hidden: bool,
}

impl std::fmt::Display for TemplateIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' (canvas {}, owner {}{})",
            self.name,
            self.canvas_code,
            self.owner_id,
            if self.hidden { ", hidden" } else { "" }
        )
    }
}

/// A stored template. The combo is stored without a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: u64,
    #[serde(flatten)]
    pub identity: TemplateIdentity,
    pub url: Option<String>,
}

/// Persistence used by the registry.
pub trait TemplateStore: Send + Sync {
    /// Store a new template, returning its id.
    fn create_template(&self, identity: &TemplateIdentity, url: Option<&str>) -> Result<u64, StoreError>;

    /// Replace the identity and URL of a stored template.
    fn update_template(
        &self,
        current: &TemplateIdentity,
        identity: &TemplateIdentity,
        url: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Remove a template and its history.
    fn delete_template(&self, identity: &TemplateIdentity) -> Result<(), StoreError>;

    fn template_id(&self, identity: &TemplateIdentity) -> Result<Option<u64>, StoreError>;

    /// Templates with a URL on a canvas, in creation order.
    fn all_templates(&self, canvas_code: &str) -> Result<Vec<TemplateRecord>, StoreError>;

    /// The record closest in time to `at`.
    fn progress_at(&self, id: u64, at: DateTime<Utc>) -> Result<Option<ProgressRecord>, StoreError>;

    fn oldest_progress(&self, id: u64) -> Result<Option<ProgressRecord>, StoreError>;

    fn record_progress(&self, id: u64, record: ProgressRecord) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryState {
    next_id: u64,
    templates: Vec<TemplateRecord>,
    stats: Vec<StatRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatRow {
    template_id: u64,
    #[serde(flatten)]
    record: ProgressRecord,
}

/// In-memory store, serializable to JSON.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let state: MemoryState = serde_json::from_str(json)?;
        Ok(Self { state: Mutex::new(state) })
    }

    /// Load a store file; a missing file gives an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(source) => Err(StoreError::Io { path: path.to_path_buf(), source }),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        std::fs::write(path, json).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })
    }
}

impl MemoryState {
    fn find(&self, identity: &TemplateIdentity) -> Option<usize> {
        self.templates.iter().position(|t| &t.identity == identity)
    }

    fn records(&self, id: u64) -> impl Iterator<Item = &ProgressRecord> {
        self.stats.iter().filter(move |s| s.template_id == id).map(|s| &s.record)
    }
}

impl TemplateStore for MemoryStore {
    fn create_template(&self, identity: &TemplateIdentity, url: Option<&str>) -> Result<u64, StoreError> {
        let mut state = self.lock();
        if state.find(identity).is_some() {
            return Err(StoreError::Conflict(identity.to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.templates.push(TemplateRecord { id, identity: identity.clone(), url: url.map(str::to_string) });
        Ok(id)
    }

    fn update_template(
        &self,
        current: &TemplateIdentity,
        identity: &TemplateIdentity,
        url: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let index = state.find(current).ok_or_else(|| StoreError::NotFound(current.to_string()))?;
        if current != identity && state.find(identity).is_some() {
            return Err(StoreError::Conflict(identity.to_string()));
        }
        let record = &mut state.templates[index];
        record.identity = identity.clone();
        record.url = url.map(str::to_string);
        Ok(())
    }

    fn delete_template(&self, identity: &TemplateIdentity) -> Result<(), StoreError> {
        let mut state = self.lock();
        let index = state.find(identity).ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        let id = state.templates.remove(index).id;
        state.stats.retain(|s| s.template_id != id);
        Ok(())
    }

    fn template_id(&self, identity: &TemplateIdentity) -> Result<Option<u64>, StoreError> {
        let state = self.lock();
        Ok(state.find(identity).map(|i| state.templates[i].id))
    }

    fn all_templates(&self, canvas_code: &str) -> Result<Vec<TemplateRecord>, StoreError> {
        Ok(self
            .lock()
            .templates
            .iter()
            .filter(|t| t.identity.canvas_code == canvas_code && t.url.is_some())
            .cloned()
            .collect())
    }

    fn progress_at(&self, id: u64, at: DateTime<Utc>) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.lock().records(id).min_by_key(|r| (r.datetime - at).num_milliseconds().abs()).copied())
    }

    fn oldest_progress(&self, id: u64) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.lock().records(id).min_by_key(|r| r.datetime).copied())
    }

    fn record_progress(&self, id: u64, record: ProgressRecord) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.templates.iter().any(|t| t.id == id) {
            return Err(StoreError::NotFound(format!("#{}", id)));
        }
        state.stats.push(StatRow { template_id: id, record });
        Ok(())
    }
}
