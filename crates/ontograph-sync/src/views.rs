//! Named views.
//!
//! ```text
//!            activate(a)                 activate(b)
//!  Inactive ────────────► Active(a) ────────────────► Active(b)
//!     ▲                     │  activate(a) / deactivate  │
//!     └─────────────────────┴────────────────────────────┘
//!                    restore the original checkpoint
//! ```
//!
//! The original checkpoint is captured lazily on the first activation out of
//! `Inactive` and consumed when the manager returns to `Inactive`. Switching
//! between views never replaces it.

use crate::error::SyncError;
use chrono::{DateTime, Utc};
use ontograph_model::{EditorSession, NamedView, Position, Viewport, VisibilityState};
use ontograph_storage::{CacheKey, LocalCache, Resource};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Everything a view captures or a restore puts back.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Checkpoint {
    pub positions: BTreeMap<String, Position>,
    pub viewport: Viewport,
    pub visibility: VisibilityState,
    pub visible_imports: BTreeSet<String>,
    pub collapsed_imports: BTreeSet<String>,
}

impl From<&NamedView> for Checkpoint {
    fn from(view: &NamedView) -> Self {
        Self {
            positions: view.node_positions.clone(),
            viewport: Viewport {
                zoom: view.zoom,
                pan: view.pan,
            },
            visibility: VisibilityState {
                categories: view.visibility_state,
                overrides: view.element_visibility.clone(),
            },
            visible_imports: view.visible_imports.clone(),
            collapsed_imports: view.collapsed_imports.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    Inactive,
    Active(String),
}

/// What the engine has to apply after a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Apply(Checkpoint),
    Restore(Checkpoint),
}

pub struct NamedViewManager {
    session: EditorSession,
    cache: Arc<LocalCache>,
    views: Vec<NamedView>,
    state: ViewState,
    original: Option<Checkpoint>,
}

impl NamedViewManager {
    /// Views of the session's ontology, as last cached.
    pub fn load(session: &EditorSession, cache: Arc<LocalCache>) -> Self {
        let key = CacheKey::new(session, Resource::NamedViews);
        let views = match cache.get::<Vec<NamedView>>(&key) {
            Ok(views) => views.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring unreadable named views");
                Vec::new()
            }
        };
        Self {
            session: session.clone(),
            cache,
            views,
            state: ViewState::Inactive,
            original: None,
        }
    }

    pub fn list(&self) -> &[NamedView] {
        &self.views
    }

    pub fn get(&self, id: &str) -> Option<&NamedView> {
        self.views.iter().find(|v| v.id == id)
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn active_id(&self) -> Option<&str> {
        match &self.state {
            ViewState::Active(id) => Some(id),
            ViewState::Inactive => None,
        }
    }

    pub fn has_original(&self) -> bool {
        self.original.is_some()
    }

    /// Replace the list with views fetched from the remote store.
    pub fn replace(&mut self, views: Vec<NamedView>) {
        self.views = views;
        self.persist();
    }

    pub fn capture(
        &mut self,
        name: &str,
        checkpoint: &Checkpoint,
        creator: &str,
        now: DateTime<Utc>,
    ) -> NamedView {
        let view = NamedView {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            creator: creator.to_string(),
            created_at: now,
            zoom: checkpoint.viewport.zoom,
            pan: checkpoint.viewport.pan,
            node_positions: checkpoint.positions.clone(),
            visibility_state: checkpoint.visibility.categories,
            element_visibility: checkpoint.visibility.overrides.clone(),
            collapsed_imports: checkpoint.collapsed_imports.clone(),
            visible_imports: checkpoint.visible_imports.clone(),
        };
        self.views.push(view.clone());
        self.persist();
        tracing::info!(view = %view.id, name = %view.name, "captured named view");
        view
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<(), SyncError> {
        let view = self
            .views
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or_else(|| SyncError::UnknownView(id.to_string()))?;
        view.name = name.to_string();
        self.persist();
        Ok(())
    }

    /// Deleting the active view drops to `Inactive` without restoring; the
    /// original checkpoint is discarded.
    pub fn delete(&mut self, id: &str) -> Result<NamedView, SyncError> {
        let index = self
            .views
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| SyncError::UnknownView(id.to_string()))?;
        let view = self.views.remove(index);
        if self.active_id() == Some(id) {
            self.state = ViewState::Inactive;
            self.original = None;
        }
        self.persist();
        Ok(view)
    }

    /// Activate `id`, or toggle it off if it is already active.
    ///
    /// `current` is only called when the original checkpoint must be taken.
    pub fn activate(
        &mut self,
        id: &str,
        current: impl FnOnce() -> Checkpoint,
    ) -> Result<Transition, SyncError> {
        let target = self
            .get(id)
            .map(Checkpoint::from)
            .ok_or_else(|| SyncError::UnknownView(id.to_string()))?;

        match &self.state {
            ViewState::Active(active) if active == id => {
                self.state = ViewState::Inactive;
                let original = self.original.take().unwrap_or_else(current);
                Ok(Transition::Restore(original))
            }
            ViewState::Active(_) => {
                self.state = ViewState::Active(id.to_string());
                Ok(Transition::Apply(target))
            }
            ViewState::Inactive => {
                if self.original.is_none() {
                    self.original = Some(current());
                }
                self.state = ViewState::Active(id.to_string());
                Ok(Transition::Apply(target))
            }
        }
    }

    /// Return to `Inactive`. Yields the checkpoint to restore, if any.
    pub fn deactivate(&mut self) -> Option<Checkpoint> {
        match self.state {
            ViewState::Inactive => None,
            ViewState::Active(_) => {
                self.state = ViewState::Inactive;
                self.original.take()
            }
        }
    }

    fn persist(&self) {
        let key = CacheKey::new(&self.session, Resource::NamedViews);
        if let Err(e) = self.cache.put(&key, &self.views) {
            tracing::warn!(key = %key, error = %e, "failed to persist named views");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> NamedViewManager {
        NamedViewManager::load(
            &EditorSession::new("p1", "sensors", "ana"),
            Arc::new(LocalCache::in_memory()),
        )
    }

    fn at(x: f64) -> Checkpoint {
        Checkpoint {
            positions: [("Sensor".to_string(), Position::new(x, 0.0))].into(),
            ..Default::default()
        }
    }

    #[test]
    fn switching_views_keeps_the_first_original() {
        let mut m = manager();
        let a = m.capture("a", &at(10.0), "ana", Utc::now()).id;
        let b = m.capture("b", &at(20.0), "ana", Utc::now()).id;

        assert_eq!(m.activate(&a, || at(0.0)).unwrap(), Transition::Apply(at(10.0)));
        assert_eq!(m.activate(&b, || at(99.0)).unwrap(), Transition::Apply(at(20.0)));
        assert_eq!(m.state(), &ViewState::Active(b.clone()));
        assert_eq!(m.deactivate(), Some(at(0.0)));
        assert_eq!(m.state(), &ViewState::Inactive);
        assert!(!m.has_original());
    }

    #[test]
    fn activating_the_active_view_toggles_back() {
        let mut m = manager();
        let a = m.capture("a", &at(10.0), "ana", Utc::now()).id;
        m.activate(&a, || at(1.0)).unwrap();
        assert_eq!(m.activate(&a, || at(2.0)).unwrap(), Transition::Restore(at(1.0)));
        assert_eq!(m.deactivate(), None);
    }

    #[test]
    fn unknown_view_is_an_error_and_leaves_state_alone() {
        let mut m = manager();
        assert!(matches!(
            m.activate("missing", Checkpoint::default),
            Err(SyncError::UnknownView(_))
        ));
        assert_eq!(m.state(), &ViewState::Inactive);
        assert!(matches!(m.rename("missing", "x"), Err(SyncError::UnknownView(_))));
    }

    #[test]
    fn deleting_the_active_view_drops_to_inactive() {
        let mut m = manager();
        let a = m.capture("a", &at(10.0), "ana", Utc::now()).id;
        m.activate(&a, || at(0.0)).unwrap();
        m.delete(&a).unwrap();
        assert_eq!(m.state(), &ViewState::Inactive);
        assert!(m.list().is_empty());
    }

    #[test]
    fn views_are_cached_per_ontology() {
        let cache = Arc::new(LocalCache::in_memory());
        let session = EditorSession::new("p1", "sensors", "ana");
        let mut m = NamedViewManager::load(&session, cache.clone());
        let id = m.capture("overview", &at(5.0), "ana", Utc::now()).id;
        m.rename(&id, "Overview").unwrap();

        let reloaded = NamedViewManager::load(&session, cache.clone());
        assert_eq!(reloaded.get(&id).map(|v| v.name.as_str()), Some("Overview"));
        let other = NamedViewManager::load(&session.with_ontology("other"), cache);
        assert!(other.list().is_empty());
    }
}
