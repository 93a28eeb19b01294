//! Visibility controller and import registry.
//!
//! Both are per ontology and persisted to the local cache on every change:
//!
//! - `visibility`: category flags + per-element overrides
//! - `imports`: registered imports, in registration order
//! - `visible-imports` / `collapsed-imports`: subsets of the registered ones

use ontograph_model::{Category, EditorSession, GraphElement, VisibilityState};
use ontograph_storage::{CacheKey, LocalCache, Resource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

// ============================================================================
// Import registry
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportRegistry {
    registered: Vec<String>,
    visible: BTreeSet<String>,
    collapsed: BTreeSet<String>,
}

impl ImportRegistry {
    /// Returns `false` if already registered.
    pub fn register(&mut self, import_id: &str) -> bool {
        if self.is_registered(import_id) {
            return false;
        }
        self.registered.push(import_id.to_string());
        true
    }

    pub fn unregister(&mut self, import_id: &str) -> bool {
        let before = self.registered.len();
        self.registered.retain(|i| i != import_id);
        self.visible.remove(import_id);
        self.collapsed.remove(import_id);
        before != self.registered.len()
    }

    pub fn is_registered(&self, import_id: &str) -> bool {
        self.registered.iter().any(|i| i == import_id)
    }

    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    /// Showing an unregistered import registers it first.
    pub fn set_visible(&mut self, import_id: &str, visible: bool) {
        if visible {
            self.register(import_id);
            self.visible.insert(import_id.to_string());
        } else {
            self.visible.remove(import_id);
        }
    }

    pub fn is_visible(&self, import_id: &str) -> bool {
        self.visible.contains(import_id)
    }

    pub fn set_collapsed(&mut self, import_id: &str, collapsed: bool) {
        if collapsed {
            self.collapsed.insert(import_id.to_string());
        } else {
            self.collapsed.remove(import_id);
        }
    }

    pub fn is_collapsed(&self, import_id: &str) -> bool {
        self.collapsed.contains(import_id)
    }

    pub fn visible(&self) -> &BTreeSet<String> {
        &self.visible
    }

    pub fn collapsed(&self) -> &BTreeSet<String> {
        &self.collapsed
    }

    /// Visible imports in registration order. Cluster slots follow this order.
    pub fn visible_in_order(&self) -> Vec<String> {
        self.registered
            .iter()
            .filter(|i| self.visible.contains(*i))
            .cloned()
            .collect()
    }

    /// Replace both subsets (view activation). Ids not yet registered are
    /// registered so the sets stay subsets of the registry.
    pub fn replace(&mut self, visible: BTreeSet<String>, collapsed: BTreeSet<String>) {
        for id in visible.iter().chain(collapsed.iter()) {
            self.register(id);
        }
        self.visible = visible;
        self.collapsed = collapsed;
    }
}

// ============================================================================
// Controller
// ============================================================================

pub struct VisibilityController {
    session: EditorSession,
    cache: Arc<LocalCache>,
    state: VisibilityState,
    imports: ImportRegistry,
}

fn read_or_default<T: DeserializeOwned + Default>(cache: &LocalCache, key: &CacheKey) -> T {
    match cache.get(key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "ignoring unreadable cache entry");
            T::default()
        }
    }
}

impl VisibilityController {
    /// Restore persisted state for the session's ontology.
    pub fn load(session: &EditorSession, cache: Arc<LocalCache>) -> Self {
        let key = |resource| CacheKey::new(session, resource);
        let state: VisibilityState = read_or_default(&cache, &key(Resource::Visibility));
        let registered: Vec<String> = read_or_default(&cache, &key(Resource::Imports));
        let visible: Vec<String> = read_or_default(&cache, &key(Resource::VisibleImports));
        let collapsed: Vec<String> = read_or_default(&cache, &key(Resource::CollapsedImports));

        let mut imports = ImportRegistry::default();
        for id in &registered {
            imports.register(id);
        }
        imports.replace(visible.into_iter().collect(), collapsed.into_iter().collect());

        Self {
            session: session.clone(),
            cache,
            state,
            imports,
        }
    }

    pub fn state(&self) -> &VisibilityState {
        &self.state
    }

    pub fn imports(&self) -> &ImportRegistry {
        &self.imports
    }

    pub fn is_visible(&self, element: &GraphElement) -> bool {
        self.state.effective(element)
    }

    pub fn set_category(&mut self, category: Category, visible: bool) {
        self.state.categories.set(category, visible);
        self.persist_state();
    }

    pub fn set_element(&mut self, element_id: &str, visible: bool) {
        self.state.overrides.insert(element_id.to_string(), visible);
        self.persist_state();
    }

    /// Drop an override so the element follows its category again.
    pub fn clear_element(&mut self, element_id: &str) -> bool {
        let removed = self.state.overrides.remove(element_id).is_some();
        if removed {
            self.persist_state();
        }
        removed
    }

    pub fn register_import(&mut self, import_id: &str) -> bool {
        let added = self.imports.register(import_id);
        if added {
            self.persist_imports();
        }
        added
    }

    pub fn unregister_import(&mut self, import_id: &str) -> bool {
        let removed = self.imports.unregister(import_id);
        if removed {
            self.persist_imports();
        }
        removed
    }

    pub fn set_import_visible(&mut self, import_id: &str, visible: bool) {
        self.imports.set_visible(import_id, visible);
        self.persist_imports();
    }

    pub fn set_import_collapsed(&mut self, import_id: &str, collapsed: bool) {
        self.imports.set_collapsed(import_id, collapsed);
        self.persist_imports();
    }

    /// Replace everything at once (view activation and restore).
    pub fn apply(
        &mut self,
        state: VisibilityState,
        visible_imports: BTreeSet<String>,
        collapsed_imports: BTreeSet<String>,
    ) {
        self.state = state;
        self.imports.replace(visible_imports, collapsed_imports);
        self.persist_state();
        self.persist_imports();
    }

    fn write<T: Serialize>(&self, resource: Resource, value: &T) {
        let key = CacheKey::new(&self.session, resource);
        if let Err(e) = self.cache.put(&key, value) {
            tracing::warn!(key = %key, error = %e, "failed to persist visibility state");
        }
    }

    fn persist_state(&self) {
        self.write(Resource::Visibility, &self.state);
    }

    fn persist_imports(&self) {
        self.write(Resource::Imports, &self.imports.registered);
        let visible: Vec<&String> = self.imports.visible.iter().collect();
        self.write(Resource::VisibleImports, &visible);
        let collapsed: Vec<&String> = self.imports.collapsed.iter().collect();
        self.write(Resource::CollapsedImports, &collapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> EditorSession {
        EditorSession::new("p1", "sensors", "ana")
    }

    #[test]
    fn visible_imports_follow_registration_order() {
        let mut registry = ImportRegistry::default();
        registry.register("zeta");
        registry.register("alpha");
        registry.set_visible("alpha", true);
        registry.set_visible("zeta", true);
        assert_eq!(registry.visible_in_order(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn unregister_clears_subsets() {
        let mut registry = ImportRegistry::default();
        registry.set_visible("foaf", true);
        registry.set_collapsed("foaf", true);
        assert!(registry.unregister("foaf"));
        assert!(!registry.is_visible("foaf"));
        assert!(!registry.is_collapsed("foaf"));
    }

    #[test]
    fn state_survives_reload_from_cache() {
        let cache = Arc::new(LocalCache::in_memory());
        let mut controller = VisibilityController::load(&session(), cache.clone());
        controller.set_category(Category::Notes, false);
        controller.set_element("Sensor", false);
        controller.set_import_visible("foaf", true);
        controller.set_import_collapsed("foaf", true);

        let reloaded = VisibilityController::load(&session(), cache.clone());
        assert!(!reloaded.state().categories.notes);
        assert_eq!(reloaded.state().overrides.get("Sensor"), Some(&false));
        assert_eq!(reloaded.imports().visible_in_order(), vec!["foaf"]);
        assert!(reloaded.imports().is_collapsed("foaf"));

        let other = VisibilityController::load(&session().with_ontology("other"), cache);
        assert!(other.state().categories.notes);
        assert!(other.imports().registered().is_empty());
    }
}
