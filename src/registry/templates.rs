//! The authoritative list of tracked templates and their combo.
//!
//! Readers take an `Arc` of the current [`RegistryState`] and never block
//! writers for longer than a pointer copy. Every mutation runs under one
//! writer lock and goes through the same steps: validate against the
//! current state, persist, then publish a new state (list and combo
//! together). If persisting fails nothing is published.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;

use crate::canvas::{CanvasHandle, CanvasSnapshot};
use crate::combo::{self, is_combo_name, COMBO_NAME};
use crate::error::TrackerError;
use crate::history::{Activity, Eta, ProgressRecord};
use crate::loader::TemplateLoader;
use crate::store::{StoreError, TemplateIdentity, TemplateStore};
use crate::template::Template;

/// Identity and permissions settings of a registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOptions {
    /// Account owning the combo
    pub bot_id: u64,
    /// Accounts allowed to edit any template
    pub super_users: Vec<u64>,
    /// History window used for ETA speed
    pub eta_window: Duration,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self { bot_id: 0, super_users: Vec::new(), eta_window: Duration::days(7) }
    }
}

/// One consistent view of the registry.
#[derive(Debug, Clone)]
pub struct RegistryState {
    templates: Vec<Arc<Template>>,
    combo: Arc<Template>,
}

impl RegistryState {
    /// Tracked templates in registration order.
    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    pub fn combo(&self) -> &Arc<Template> {
        &self.combo
    }

    fn public(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.iter().filter(|t| !t.hidden())
    }

    fn hidden_of(&self, owner: u64) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.iter().filter(move |t| t.hidden() && t.owner_id() == Some(owner))
    }

    /// Templates sharing a visibility scope with a template of that owner.
    fn scope(&self, hidden: bool, owner: u64) -> Box<dyn Iterator<Item = &Arc<Template>> + '_> {
        if hidden {
            Box::new(self.hidden_of(owner))
        } else {
            Box::new(self.public())
        }
    }
}

/// A change requested by [`TemplateRegistry::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateUpdate {
    pub url: Option<String>,
    pub name: Option<String>,
    pub owner_id: Option<u64>,
}

/// Registry of tracked templates.
pub struct TemplateRegistry {
    store: Arc<dyn TemplateStore>,
    loader: TemplateLoader,
    canvas: Arc<CanvasHandle>,
    options: RegistryOptions,
    state: RwLock<Arc<RegistryState>>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRegistry")
            .field("templates", &self.snapshot().templates.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn identity_of(template: &Template) -> Option<TemplateIdentity> {
    Some(TemplateIdentity {
        name: template.name()?.to_string(),
        canvas_code: template.canvas_code().to_string(),
        owner_id: template.owner_id()?,
        hidden: template.hidden(),
    })
}

impl TemplateRegistry {
    /// An empty registry.
    pub fn new(
        store: Arc<dyn TemplateStore>,
        loader: TemplateLoader,
        canvas: Arc<CanvasHandle>,
        options: RegistryOptions,
    ) -> Self {
        let snapshot = canvas.current();
        let none: [Arc<Template>; 0] = [];
        let combo = Arc::new(combo::compose(&none, &snapshot, options.bot_id));
        Self {
            store,
            loader,
            canvas,
            options,
            state: RwLock::new(Arc::new(RegistryState { templates: Vec::new(), combo })),
            writer: Mutex::new(()),
        }
    }

    /// Rebuild the list from the store for the current canvas.
    ///
    /// Entries that fail to load are logged and skipped. Returns the number
    /// of templates loaded.
    pub fn load(&self) -> Result<usize, TrackerError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.canvas.current();
        let records = self.store.all_templates(snapshot.canvas_code())?;

        let loaded: Vec<Option<Arc<Template>>> = records
            .par_iter()
            .map(|record| {
                let url = record.url.as_deref()?;
                match self.loader.load(url, &snapshot) {
                    Ok(t) => Some(Arc::new(t.with_identity(
                        record.identity.name.clone(),
                        record.identity.owner_id,
                        record.identity.hidden,
                    ))),
                    Err(e) => {
                        log::warn!("couldn't load template {}: {}", record.identity, e);
                        None
                    }
                }
            })
            .collect();
        let templates: Vec<Arc<Template>> = loaded.into_iter().flatten().collect();
        let count = templates.len();
        self.publish(templates, &snapshot);
        log::info!("loaded {} of {} templates for canvas '{}'", count, records.len(), snapshot.canvas_code());
        Ok(count)
    }

    /// The current state.
    pub fn snapshot(&self) -> Arc<RegistryState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    pub fn canvas(&self) -> Arc<CanvasSnapshot> {
        self.canvas.current()
    }

    pub fn combo(&self) -> Arc<Template> {
        Arc::clone(&self.snapshot().combo)
    }

    pub fn public_templates(&self) -> Vec<Arc<Template>> {
        self.snapshot().public().cloned().collect()
    }

    pub fn hidden_templates(&self, owner: u64) -> Vec<Arc<Template>> {
        self.snapshot().hidden_of(owner).cloned().collect()
    }

    /// Look a template up by name.
    ///
    /// With an `owner`, that owner's hidden template of this name is
    /// preferred over a public one.
    pub fn get(&self, name: &str, owner: Option<u64>) -> Option<Arc<Template>> {
        let state = self.snapshot();
        if is_combo_name(name) {
            return Some(Arc::clone(&state.combo));
        }
        let hidden = owner.and_then(|o| state.hidden_of(o).find(|t| t.name() == Some(name)).cloned());
        hidden.or_else(|| state.public().find(|t| t.name() == Some(name)).cloned())
    }

    /// A tracked template with the same content and offset, searched in
    /// the scope a template with this visibility and owner would live in.
    pub fn find_duplicate(&self, template: &Template, hidden: bool, owner: u64) -> Option<Arc<Template>> {
        let state = self.snapshot();
        let found = state.scope(hidden, owner).find(|t| t.same_content(template)).cloned();
        found
    }

    /// Public templates with a placeable cell at a canvas coordinate.
    pub fn templates_at(&self, x: i64, y: i64) -> Vec<Arc<Template>> {
        let snapshot = self.canvas.current();
        self.snapshot().public().filter(|t| t.covers(&snapshot, x, y)).cloned().collect()
    }

    fn can_edit(&self, template: &Template, user: u64) -> bool {
        template.owner_id() == Some(user) || self.options.super_users.contains(&user)
    }

    fn validate(
        &self,
        state: &RegistryState,
        candidate: &Template,
        replacing: Option<&Arc<Template>>,
    ) -> Result<(), TrackerError> {
        let name = candidate.name().unwrap_or_default();
        if is_combo_name(name) {
            return Err(TrackerError::ReservedName(name.to_string()));
        }
        let owner = candidate.owner_id().unwrap_or_default();
        let others = || {
            state
                .scope(candidate.hidden(), owner)
                .filter(move |t| replacing.map_or(true, |r| !Arc::ptr_eq(t, r)))
        };
        if others().any(|t| t.name() == Some(name)) {
            return Err(TrackerError::DuplicateName(name.to_string()));
        }
        if let Some(dup) = others().find(|t| t.same_content(candidate)) {
            return Err(TrackerError::DuplicateContent(dup.name().unwrap_or_default().to_string()));
        }
        Ok(())
    }

    fn check_on_canvas(&self, template: &Template, snapshot: &CanvasSnapshot) -> Result<(), TrackerError> {
        if template.canvas_code() != snapshot.canvas_code() {
            return Err(TrackerError::WrongCanvas {
                template: template.canvas_code().to_string(),
                current: snapshot.canvas_code().to_string(),
            });
        }
        if template.progress(snapshot).is_outside_canvas() {
            return Err(TrackerError::OutsideCanvas(template.name().unwrap_or_default().to_string()));
        }
        Ok(())
    }

    /// Start tracking a template.
    pub fn save(&self, template: Template, name: &str, owner: u64, hidden: bool) -> Result<Arc<Template>, TrackerError> {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.snapshot();
        let snapshot = self.canvas.current();

        let template = template.with_identity(name, owner, hidden);
        self.validate(&state, &template, None)?;
        self.check_on_canvas(&template, &snapshot)?;

        if let Some(identity) = identity_of(&template) {
            self.store.create_template(&identity, template.url())?;
        }

        let template = Arc::new(template);
        let mut templates = state.templates.clone();
        templates.push(Arc::clone(&template));
        self.publish(templates, &snapshot);
        log::info!("template '{}' added by {}", name, owner);
        Ok(template)
    }

    /// Change the URL, name or owner of a template.
    ///
    /// A new URL re-decodes the template; otherwise the content is kept.
    pub fn update(&self, name: &str, user: u64, change: TemplateUpdate) -> Result<Arc<Template>, TrackerError> {
        if is_combo_name(name) {
            return Err(TrackerError::ReservedName(name.to_string()));
        }
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.snapshot();
        let snapshot = self.canvas.current();

        let current = self.get(name, Some(user)).ok_or_else(|| TrackerError::NotFound(name.to_string()))?;
        if !self.can_edit(&current, user) {
            return Err(TrackerError::Unauthorized(name.to_string()));
        }
        let old_identity = identity_of(&current).ok_or_else(|| TrackerError::NotFound(name.to_string()))?;

        let base = match &change.url {
            Some(url) => {
                let t = self.loader.load(url, &snapshot)?;
                self.check_on_canvas(&t, &snapshot)?;
                t
            }
            None => (*current).clone(),
        };
        let new_name = change.name.as_deref().unwrap_or(&old_identity.name);
        let new_owner = change.owner_id.unwrap_or(old_identity.owner_id);
        let updated = base.with_identity(new_name, new_owner, old_identity.hidden);
        self.validate(&state, &updated, Some(&current))?;

        if let Some(identity) = identity_of(&updated) {
            self.store.update_template(&old_identity, &identity, updated.url())?;
        }

        let updated = Arc::new(updated);
        let templates = state
            .templates
            .iter()
            .map(|t| if Arc::ptr_eq(t, &current) { Arc::clone(&updated) } else { Arc::clone(t) })
            .collect();
        self.publish(templates, &snapshot);
        log::info!("template '{}' updated by {}", name, user);
        Ok(updated)
    }

    /// Stop tracking a template.
    pub fn delete(&self, name: &str, user: u64) -> Result<Arc<Template>, TrackerError> {
        if is_combo_name(name) {
            return Err(TrackerError::ReservedName(name.to_string()));
        }
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let state = self.snapshot();
        let snapshot = self.canvas.current();

        let current = self.get(name, Some(user)).ok_or_else(|| TrackerError::NotFound(name.to_string()))?;
        if !self.can_edit(&current, user) {
            return Err(TrackerError::Unauthorized(name.to_string()));
        }
        if let Some(identity) = identity_of(&current) {
            self.store.delete_template(&identity)?;
        }

        let templates = state.templates.iter().filter(|t| !Arc::ptr_eq(t, &current)).cloned().collect();
        self.publish(templates, &snapshot);
        log::info!("template '{}' deleted by {}", name, user);
        Ok(current)
    }

    /// Recompute the combo after a canvas refresh.
    pub fn recompose(&self) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.canvas.current();
        self.publish(self.snapshot().templates.clone(), &snapshot);
    }

    fn publish(&self, templates: Vec<Arc<Template>>, snapshot: &CanvasSnapshot) {
        let combo = Arc::new(combo::compose(&templates, snapshot, self.options.bot_id));
        let state = Arc::new(RegistryState { templates, combo });
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Store id of a template, creating the combo's entry on first use.
    fn store_id(&self, template: &Template) -> Result<Option<u64>, TrackerError> {
        let Some(identity) = identity_of(template) else {
            return Ok(None);
        };
        if let Some(id) = self.store.template_id(&identity)? {
            return Ok(Some(id));
        }
        if identity.name != COMBO_NAME {
            return Ok(None);
        }

        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = self.store.template_id(&identity)? {
            return Ok(Some(id));
        }
        match self.store.create_template(&identity, None) {
            Ok(id) => Ok(Some(id)),
            // another registry sharing the store created it first
            Err(StoreError::Conflict(_)) => Ok(self.store.template_id(&identity)?),
            Err(e) => Err(e.into()),
        }
    }

    /// Compute progress of every template and the combo against the current
    /// snapshot and store one record each. Returns the number of records.
    ///
    /// Every store id is resolved before the first record is written.
    pub fn record_progress(&self, now: DateTime<Utc>) -> Result<usize, TrackerError> {
        let state = self.snapshot();
        let snapshot = self.canvas.current();

        let mut all: Vec<&Arc<Template>> = state.templates.iter().collect();
        all.push(&state.combo);
        let progress: Vec<(&Arc<Template>, usize)> =
            all.par_iter().map(|t| (*t, t.progress(&snapshot).current())).collect();

        let mut pending = Vec::with_capacity(progress.len());
        for (template, current) in progress {
            if let Some(id) = self.store_id(template)? {
                pending.push((id, current));
            }
        }
        for &(id, current) in &pending {
            self.store.record_progress(id, ProgressRecord::new(now, current as i64))?;
        }
        log::info!("recorded progress of {} templates", pending.len());
        Ok(pending.len())
    }

    fn tracked(&self, name: &str, owner: Option<u64>) -> Result<(Arc<Template>, Option<u64>), TrackerError> {
        let template = self.get(name, owner).ok_or_else(|| TrackerError::NotFound(name.to_string()))?;
        let id = self.store_id(&template)?;
        Ok((template, id))
    }

    /// ETA of a template from its stored history.
    pub fn eta(&self, name: &str, owner: Option<u64>, now: DateTime<Utc>) -> Result<Eta, TrackerError> {
        let (template, id) = self.tracked(name, owner)?;
        let progress = template.progress(&self.canvas.current());
        let Some(id) = id else {
            return Ok(Eta::estimate(progress.remaining(), None, None));
        };
        let latest = self.store.progress_at(id, now)?;
        let past = self.store.progress_at(id, now - self.options.eta_window)?;
        let current = latest.map_or(progress.current() as i64, |r| r.progress);
        let remaining = progress.total_placeable() as i64 - current;
        Ok(Eta::estimate(remaining, latest.as_ref(), past.as_ref()))
    }

    /// Recent activity of a template from its stored history.
    pub fn activity(&self, name: &str, owner: Option<u64>, now: DateTime<Utc>) -> Result<Activity, TrackerError> {
        let (_, id) = self.tracked(name, owner)?;
        let Some(id) = id else {
            return Ok(Activity::compute(now, |_| Ok::<_, TrackerError>(None))?);
        };
        Activity::compute(now, |at| Ok(self.store.progress_at(id, at)?))
    }

    /// First stored record of a template, when tracking started.
    pub fn oldest_record(&self, name: &str, owner: Option<u64>) -> Result<Option<ProgressRecord>, TrackerError> {
        match self.tracked(name, owner)? {
            (_, Some(id)) => Ok(self.store.oldest_progress(id)?),
            (_, None) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::LocalFetcher;
    use crate::grid::IndexGrid;
    use crate::palette::{Palette, TRANSPARENT};
    use crate::quantize::ColorMetric;
    use crate::store::{MemoryStore, TemplateRecord};

    const BOT: u64 = 1000;
    const ADMIN: u64 = 1;

    fn canvas() -> Arc<CanvasHandle> {
        let mut board = IndexGrid::filled(10, 10, 5);
        board.set(0, 0, 3);
        let snapshot = CanvasSnapshot::new(
            "c1",
            Palette::pxls_classic(),
            board,
            IndexGrid::filled(10, 10, 0),
            IndexGrid::filled(10, 10, 0),
            Utc::now(),
        )
        .unwrap();
        Arc::new(CanvasHandle::new(snapshot))
    }

    fn registry_with(store: Arc<dyn TemplateStore>) -> TemplateRegistry {
        let loader = TemplateLoader::new(Arc::new(LocalFetcher::new()), ColorMetric::Euclidean);
        let options = RegistryOptions { bot_id: BOT, super_users: vec![ADMIN], ..Default::default() };
        TemplateRegistry::new(store, loader, canvas(), options)
    }

    fn registry() -> (TemplateRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (registry_with(store.clone()), store)
    }

    fn block(value: u8, ox: i64, oy: i64) -> Template {
        Template::new(IndexGrid::filled(2, 2, value), ox, oy, "c1")
    }

    #[test]
    fn test_save_and_get() {
        let (registry, store) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        let t = registry.get("flag", None).unwrap();
        assert_eq!(t.owner_id(), Some(7));
        assert_eq!(registry.public_templates().len(), 1);
        assert_eq!(registry.combo().grid().get(0, 0), 3);
        let identity = identity_of(&t).unwrap();
        assert!(store.template_id(&identity).unwrap().is_some());
    }

    #[test]
    fn test_duplicate_public_name_rejected() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        let before = registry.snapshot();
        let err = registry.save(block(4, 5, 5), "flag", 8, false).unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateName(ref n) if n == "flag"));
        assert_eq!(registry.snapshot().templates().len(), before.templates().len());
    }

    #[test]
    fn test_hidden_names_scoped_to_owner() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        registry.save(block(4, 5, 5), "flag", 7, true).unwrap();
        registry.save(block(6, 2, 5), "flag", 8, true).unwrap();
        assert!(matches!(registry.save(block(9, 7, 7), "flag", 8, true), Err(TrackerError::DuplicateName(_))));
        assert_eq!(registry.get("flag", Some(8)).unwrap().grid().get(0, 0), 6);
        assert_eq!(registry.get("flag", Some(9)).unwrap().grid().get(0, 0), 3);
        assert_eq!(registry.hidden_templates(7).len(), 1);
    }

    #[test]
    fn test_duplicate_content_rejected() {
        let (registry, _) = registry();
        registry.save(block(3, 1, 1), "a", 7, false).unwrap();
        let err = registry.save(block(3, 1, 1), "b", 8, false).unwrap_err();
        assert!(matches!(err, TrackerError::DuplicateContent(ref n) if n == "a"));
        // hidden scope is separate
        assert!(registry.save(block(3, 1, 1), "mine", 8, true).is_ok());
        assert_eq!(registry.find_duplicate(&block(3, 1, 1), false, 9).and_then(|t| t.name().map(String::from)), Some("a".into()));
        assert!(registry.find_duplicate(&block(3, 2, 1), false, 9).is_none());
    }

    #[test]
    fn test_reserved_name() {
        let (registry, _) = registry();
        assert!(matches!(registry.save(block(3, 0, 0), COMBO_NAME, 7, false), Err(TrackerError::ReservedName(_))));
        assert!(matches!(registry.delete(COMBO_NAME, ADMIN), Err(TrackerError::ReservedName(_))));
        assert!(matches!(
            registry.update(COMBO_NAME, ADMIN, TemplateUpdate::default()),
            Err(TrackerError::ReservedName(_))
        ));
        assert_eq!(registry.get(COMBO_NAME, None).and_then(|c| c.owner_id()), Some(BOT));
    }

    #[test]
    fn test_outside_canvas_rejected() {
        let (registry, _) = registry();
        let err = registry.save(block(3, 50, 50), "far", 7, false).unwrap_err();
        assert!(matches!(err, TrackerError::OutsideCanvas(_)));
        let err = registry.save(block(3, i64::MAX, i64::MIN), "edge", 7, false).unwrap_err();
        assert!(matches!(err, TrackerError::OutsideCanvas(_)));
        assert!(registry.templates_at(i64::MIN, i64::MAX).is_empty());
    }

    #[test]
    fn test_update_and_delete_permissions() {
        let (registry, store) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        let rename = TemplateUpdate { name: Some("banner".into()), ..Default::default() };
        assert!(matches!(registry.update("flag", 8, rename.clone()), Err(TrackerError::Unauthorized(_))));
        let updated = registry.update("flag", 7, rename).unwrap();
        assert_eq!(updated.name(), Some("banner"));
        assert!(registry.get("flag", None).is_none());
        assert!(store.template_id(&identity_of(&updated).unwrap()).unwrap().is_some());

        let give = TemplateUpdate { owner_id: Some(9), ..Default::default() };
        assert_eq!(registry.update("banner", ADMIN, give).unwrap().owner_id(), Some(9));
        assert!(matches!(registry.delete("banner", 7), Err(TrackerError::Unauthorized(_))));
        registry.delete("banner", 9).unwrap();
        assert!(registry.public_templates().is_empty());
        assert_eq!(registry.combo().total_size(), 0);
        assert!(matches!(registry.delete("banner", 9), Err(TrackerError::NotFound(_))));
    }

    #[test]
    fn test_update_excludes_itself_from_checks() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "a", 7, false).unwrap();
        registry.save(block(4, 4, 4), "b", 7, false).unwrap();
        // same name and content as itself is fine
        let same = TemplateUpdate { name: Some("a".into()), ..Default::default() };
        assert!(registry.update("a", 7, same).is_ok());
        let clash = TemplateUpdate { name: Some("b".into()), ..Default::default() };
        assert!(matches!(registry.update("a", 7, clash), Err(TrackerError::DuplicateName(_))));
        // order is kept
        let names: Vec<_> = registry.public_templates().iter().filter_map(|t| t.name().map(String::from)).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_combo_precedence_follows_registration() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "first", 7, false).unwrap();
        registry.save(block(4, 1, 1), "second", 7, false).unwrap();
        let combo = registry.combo();
        assert_eq!(combo.grid().get(1, 1), 3);
        assert_eq!(combo.grid().get(2, 2), 4);
        assert_eq!(combo.grid().get(5, 5), TRANSPARENT);
    }

    #[test]
    fn test_templates_at() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "a", 7, false).unwrap();
        registry.save(block(4, 1, 1), "b", 7, false).unwrap();
        registry.save(block(5, 1, 0), "c", 7, true).unwrap();
        let names: Vec<_> = registry.templates_at(1, 1).iter().filter_map(|t| t.name().map(String::from)).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(registry.templates_at(9, 9).is_empty());
    }

    /// A store whose writes always fail.
    struct BrokenStore(MemoryStore);

    impl TemplateStore for BrokenStore {
        fn create_template(&self, _: &TemplateIdentity, _: Option<&str>) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        fn update_template(&self, _: &TemplateIdentity, _: &TemplateIdentity, _: Option<&str>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        fn delete_template(&self, _: &TemplateIdentity) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk on fire".into()))
        }
        fn template_id(&self, identity: &TemplateIdentity) -> Result<Option<u64>, StoreError> {
            self.0.template_id(identity)
        }
        fn all_templates(&self, canvas_code: &str) -> Result<Vec<TemplateRecord>, StoreError> {
            self.0.all_templates(canvas_code)
        }
        fn progress_at(&self, id: u64, at: DateTime<Utc>) -> Result<Option<ProgressRecord>, StoreError> {
            self.0.progress_at(id, at)
        }
        fn oldest_progress(&self, id: u64) -> Result<Option<ProgressRecord>, StoreError> {
            self.0.oldest_progress(id)
        }
        fn record_progress(&self, id: u64, record: ProgressRecord) -> Result<(), StoreError> {
            self.0.record_progress(id, record)
        }
    }

    #[test]
    fn test_store_failure_leaves_state_untouched() {
        let registry = registry_with(Arc::new(BrokenStore(MemoryStore::new())));
        let combo_before = registry.combo();
        let err = registry.save(block(3, 0, 0), "flag", 7, false).unwrap_err();
        assert!(matches!(err, TrackerError::Store(_)));
        assert!(err.is_transient());
        assert!(registry.public_templates().is_empty());
        assert!(Arc::ptr_eq(&combo_before, &registry.combo()));
    }

    #[test]
    fn test_record_progress_and_eta() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        let t0 = Utc::now() - Duration::hours(10);
        // progress was 0 ten hours ago, now it is 1 of 4
        let (_, id) = registry.tracked("flag", None).unwrap();
        registry.store.record_progress(id.unwrap(), ProgressRecord::new(t0, 0)).unwrap();
        let now = Utc::now();
        assert_eq!(registry.record_progress(now).unwrap(), 2);

        match registry.eta("flag", None, now).unwrap() {
            Eta::Remaining { duration, speed } => {
                assert!((speed - 0.1).abs() < 1e-3);
                assert!((duration.num_minutes() - 30 * 60).abs() <= 1);
            }
            other => panic!("unexpected eta {:?}", other),
        }
        // the combo got its own store entry
        assert_eq!(registry.oldest_record(COMBO_NAME, None).unwrap().map(|r| r.progress), Some(1));
        let activity = registry.activity("flag", None, now).unwrap();
        assert!(activity.last_updated.is_some());
    }

    #[test]
    fn test_concurrent_record_progress_creates_one_combo_entry() {
        let store = Arc::new(MemoryStore::new());
        let first = registry_with(store.clone());
        let second = registry_with(store.clone());
        first.save(block(3, 0, 0), "flag", 7, false).unwrap();

        let barrier = std::sync::Barrier::new(4);
        let now = Utc::now();
        let counts: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = [&first, &first, &second, &second]
                .into_iter()
                .map(|registry| {
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        registry.record_progress(now).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counts, vec![2, 2, 1, 1]);
        assert_eq!(store.to_json().unwrap().matches("\"@combo\"").count(), 1);
        assert_eq!(second.oldest_record(COMBO_NAME, None).unwrap().map(|r| r.progress), Some(1));
    }

    /// Reports the combo as missing twice while another process creates
    /// it in between.
    struct RacingStore {
        inner: MemoryStore,
        combo_lookups: std::sync::atomic::AtomicUsize,
    }

    impl TemplateStore for RacingStore {
        fn create_template(&self, identity: &TemplateIdentity, url: Option<&str>) -> Result<u64, StoreError> {
            self.inner.create_template(identity, url)
        }
        fn update_template(&self, a: &TemplateIdentity, b: &TemplateIdentity, url: Option<&str>) -> Result<(), StoreError> {
            self.inner.update_template(a, b, url)
        }
        fn delete_template(&self, identity: &TemplateIdentity) -> Result<(), StoreError> {
            self.inner.delete_template(identity)
        }
        fn template_id(&self, identity: &TemplateIdentity) -> Result<Option<u64>, StoreError> {
            if identity.name == COMBO_NAME {
                let n = self.combo_lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n == 0 {
                    self.inner.create_template(identity, None)?;
                }
                if n < 2 {
                    return Ok(None);
                }
            }
            self.inner.template_id(identity)
        }
        fn all_templates(&self, canvas_code: &str) -> Result<Vec<TemplateRecord>, StoreError> {
            self.inner.all_templates(canvas_code)
        }
        fn progress_at(&self, id: u64, at: DateTime<Utc>) -> Result<Option<ProgressRecord>, StoreError> {
            self.inner.progress_at(id, at)
        }
        fn oldest_progress(&self, id: u64) -> Result<Option<ProgressRecord>, StoreError> {
            self.inner.oldest_progress(id)
        }
        fn record_progress(&self, id: u64, record: ProgressRecord) -> Result<(), StoreError> {
            self.inner.record_progress(id, record)
        }
    }

    #[test]
    fn test_record_progress_survives_lost_combo_race() {
        let store = Arc::new(RacingStore { inner: MemoryStore::new(), combo_lookups: Default::default() });
        let registry = registry_with(store.clone());
        assert_eq!(registry.record_progress(Utc::now()).unwrap(), 1);
        assert!(registry.oldest_record(COMBO_NAME, None).unwrap().is_some());
    }

    #[test]
    fn test_eta_without_history() {
        let (registry, _) = registry();
        registry.save(block(3, 0, 0), "flag", 7, false).unwrap();
        assert_eq!(registry.eta("flag", None, Utc::now()).unwrap(), Eta::Unknown);
        assert!(matches!(registry.eta("nope", None, Utc::now()), Err(TrackerError::NotFound(_))));
    }
}
