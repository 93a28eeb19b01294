//! Overlay composition.
//!
//! Imported ontologies are shown as read-only overlay elements next to the
//! local graph. Each visible import is placed in its own cluster slot, to the
//! right of the local bounding box, in registration order:
//!
//! ```text
//!   ┌─────────────┐   gap   ┌──────────┐        ┌──────────┐
//!   │ local graph │ ──────► │ import 0 │ ─────► │ import 1 │ ...
//!   └─────────────┘         └──────────┘  width └──────────┘
//! ```
//!
//! An import is either expanded (its classes, properties and edges as overlay
//! elements) or collapsed into one pseudo-import node. Either way, local
//! classes whose normalized label matches an imported class get an
//! equivalence edge. Ids are derived from the import and the source ids, so
//! composing twice is a no-op.

use crate::config::OverlayGeometry;
use crate::error::SyncError;
use chrono::Utc;
use ontograph_model::digest::parts_digest;
use ontograph_model::{
    centroid, EditorSession, ElementAttrs, ElementKind, EquivalenceAttrs, GraphElement,
    GraphModel, GraphSnapshot, Origin, Position, Provenance, PseudoImportAttrs,
};
use ontograph_storage::{CacheKey, LocalCache, RemoteStore, Resource};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

pub fn overlay_id(import_id: &str, source_id: &str) -> String {
    format!("overlay::{import_id}::{source_id}")
}

pub fn pseudo_id(import_id: &str) -> String {
    format!("pseudo::{import_id}")
}

fn equivalence_element(import_id: &str, source: &str, target: &str) -> GraphElement {
    let id = format!("equiv::{import_id}::{}", parts_digest(&[source, target]));
    let mut element = GraphElement::new(
        &id,
        "equivalentClass",
        ElementAttrs::Equivalence(EquivalenceAttrs {
            source: source.to_string(),
            target: target.to_string(),
        }),
    );
    element.origin = Origin::overlay(import_id);
    element
}

/// Outcome of one `refresh_overlays` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionReport {
    /// Imports composed successfully, in slot order.
    pub composed: Vec<String>,
    /// Imports no longer visible whose overlay elements were removed.
    pub purged: Vec<String>,
    /// Imports whose snapshot could not be fetched; they contribute nothing.
    pub failed: Vec<String>,
    /// Imports skipped because another composition of them was in flight.
    pub coalesced: Vec<String>,
    pub inserted: usize,
    pub removed: usize,
}

/// One composition slot: an import composed into one ontology of one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompositionKey {
    project: String,
    ontology: String,
    import: String,
}

impl CompositionKey {
    fn new(session: &EditorSession, import_id: &str) -> Self {
        Self {
            project: session.project_id.clone(),
            ontology: session.ontology_id.clone(),
            import: import_id.to_string(),
        }
    }
}

/// In-flight compositions. The flag is set when another request for the
/// same key arrived meanwhile and the holder owes one more pass.
type InFlight = Mutex<HashMap<CompositionKey, bool>>;

/// Marks an import as being composed; released on drop.
pub struct CompositionGuard<'a> {
    in_flight: &'a InFlight,
    key: CompositionKey,
    released: bool,
}

impl CompositionGuard<'_> {
    /// Release the claim unless a coalesced request is waiting, in which case
    /// the claim is kept and `true` tells the holder to compose again.
    pub fn finish(&mut self) -> bool {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get_mut(&self.key) {
            Some(rerun) if *rerun => {
                *rerun = false;
                true
            }
            _ => {
                in_flight.remove(&self.key);
                self.released = true;
                false
            }
        }
    }
}

impl Drop for CompositionGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.in_flight.lock().remove(&self.key);
        }
    }
}

pub struct OverlayComposer {
    geometry: OverlayGeometry,
    cache: Arc<LocalCache>,
    remote: Arc<dyn RemoteStore>,
    in_flight: InFlight,
}

impl OverlayComposer {
    pub fn new(geometry: OverlayGeometry, cache: Arc<LocalCache>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            geometry,
            cache,
            remote,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the composition of `import_id` into the session's ontology.
    ///
    /// If it is already claimed, the holder is asked for another pass and
    /// `ConcurrentComposition` is returned.
    pub fn begin(
        &self,
        session: &EditorSession,
        import_id: &str,
    ) -> Result<CompositionGuard<'_>, SyncError> {
        let key = CompositionKey::new(session, import_id);
        let mut in_flight = self.in_flight.lock();
        if let Some(rerun) = in_flight.get_mut(&key) {
            *rerun = true;
            return Err(SyncError::ConcurrentComposition(import_id.to_string()));
        }
        in_flight.insert(key.clone(), false);
        Ok(CompositionGuard {
            in_flight: &self.in_flight,
            key,
            released: false,
        })
    }

    /// The import's graph as overlay elements.
    ///
    /// Read-through: a non-empty cached snapshot is used as-is; otherwise the
    /// remote graph is fetched, converted and written back.
    pub async fn import_elements(
        &self,
        session: &EditorSession,
        import_id: &str,
    ) -> Result<Vec<GraphElement>, SyncError> {
        let key = CacheKey::new(
            session,
            Resource::ImportSnapshot {
                import_id: import_id.to_string(),
            },
        );
        let cached: Option<GraphSnapshot> = match self.cache.get(&key) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(import = %import_id, error = %e, "unreadable import snapshot, refetching");
                None
            }
        };

        let snapshot = match cached {
            Some(snapshot) if !snapshot.is_empty() => snapshot,
            _ => {
                let document = self.remote.fetch_graph(import_id).await?;
                let snapshot = document.into_snapshot(Provenance::Remote, Utc::now());
                if let Err(e) = self.cache.put(&key, &snapshot) {
                    tracing::warn!(import = %import_id, error = %e, "failed to cache import snapshot");
                }
                snapshot
            }
        };

        Ok(snapshot
            .into_elements()
            .map(|mut element| {
                element.rekey(|id| overlay_id(import_id, id));
                element.origin = Origin::overlay(import_id);
                element
            })
            .collect())
    }

    /// Top-left corner of the cluster in `slot`.
    pub fn cluster_origin(&self, model: &GraphModel, slot: usize) -> Position {
        let g = &self.geometry;
        let offset = slot as f64 * g.cluster_width;
        match model.local_bounds() {
            Some(bounds) => Position::new(bounds.max.x + g.cluster_gap + offset, bounds.min.y),
            None => Position::new(g.cluster_gap + offset, 0.0),
        }
    }

    fn grid_position(&self, origin: Position, index: usize) -> Position {
        let columns = self.geometry.grid_columns.max(1);
        let spacing = self.geometry.grid_spacing;
        Position::new(
            origin.x + (index % columns) as f64 * spacing,
            origin.y + (index / columns) as f64 * spacing,
        )
    }

    /// Reconcile the model's overlay elements of one import with `source`.
    ///
    /// Elements already present and unchanged stay where they are; stale or
    /// changed ones are removed; missing ones are inserted. Returns
    /// `(inserted, removed)`.
    pub fn compose(
        &self,
        model: &mut GraphModel,
        session: &EditorSession,
        import_id: &str,
        source: &[GraphElement],
        collapsed: bool,
        slot: usize,
    ) -> (usize, usize) {
        self.remember_positions(model, session, import_id);
        let remembered = self.remembered_positions(session, import_id);
        let origin = self.cluster_origin(model, slot);

        let mut source_nodes: Vec<&GraphElement> = source.iter().filter(|e| !e.is_edge()).collect();
        source_nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut source_edges: Vec<&GraphElement> = source.iter().filter(|e| e.is_edge()).collect();
        source_edges.sort_by(|a, b| a.id.cmp(&b.id));

        let mut local_classes: HashMap<String, Vec<String>> = HashMap::new();
        for class in model
            .local_elements()
            .filter(|e| e.kind() == ElementKind::Class)
        {
            local_classes
                .entry(class.normalized_label())
                .or_default()
                .push(class.id.clone());
        }

        let mut desired: Vec<(GraphElement, Option<Position>)> = Vec::new();
        if collapsed {
            let id = pseudo_id(import_id);
            let position = self
                .remembered_pseudo(session, import_id)
                .or_else(|| centroid(remembered.values()))
                .unwrap_or(origin);
            let mut pseudo = GraphElement::new(
                &id,
                import_id,
                ElementAttrs::PseudoImport(PseudoImportAttrs {
                    import_id: import_id.to_string(),
                    member_count: source_nodes.len(),
                }),
            );
            pseudo.origin = Origin::overlay(import_id);
            desired.push((pseudo, Some(position)));

            let imported_labels: HashSet<String> = source_nodes
                .iter()
                .filter(|e| e.kind() == ElementKind::Class)
                .map(|e| e.normalized_label())
                .collect();
            let mut targets: Vec<&String> = imported_labels
                .iter()
                .filter_map(|label| local_classes.get(label))
                .flatten()
                .collect();
            targets.sort();
            for target in targets {
                desired.push((equivalence_element(import_id, &id, target), None));
            }
        } else {
            for (index, node) in source_nodes.iter().enumerate() {
                let position = remembered
                    .get(&node.id)
                    .copied()
                    .unwrap_or_else(|| self.grid_position(origin, index));
                desired.push(((*node).clone(), Some(position)));
            }
            for edge in &source_edges {
                desired.push(((*edge).clone(), None));
            }
            for node in source_nodes
                .iter()
                .filter(|e| e.kind() == ElementKind::Class)
            {
                for target in local_classes.get(&node.normalized_label()).into_iter().flatten() {
                    desired.push((equivalence_element(import_id, &node.id, target), None));
                }
            }
        }

        let wanted: HashMap<&str, &GraphElement> =
            desired.iter().map(|(e, _)| (e.id.as_str(), e)).collect();
        let removed = model
            .remove_overlay_elements(import_id, |e| wanted.get(e.id.as_str()) != Some(&e))
            .len();

        let mut inserted = 0;
        for (element, position) in desired {
            if model.insert_overlay(element, position) {
                inserted += 1;
            }
        }
        tracing::debug!(import = %import_id, collapsed, inserted, removed, "composed overlay");
        (inserted, removed)
    }

    /// Remove every overlay element of an import, remembering positions first.
    pub fn purge(&self, model: &mut GraphModel, session: &EditorSession, import_id: &str) -> usize {
        self.remember_positions(model, session, import_id);
        model.remove_overlay_elements(import_id, |_| true).len()
    }

    /// Persist the current positions of an import's overlay nodes.
    pub fn remember_positions(&self, model: &GraphModel, session: &EditorSession, import_id: &str) {
        let pseudo = pseudo_id(import_id);
        let mut current: BTreeMap<String, Position> = BTreeMap::new();
        let mut pseudo_position = None;
        for node in model.overlay_elements(import_id).filter(|e| !e.is_edge()) {
            let Some(position) = model.position(&node.id) else {
                continue;
            };
            if node.id == pseudo {
                pseudo_position = Some(position);
            } else {
                current.insert(node.id.clone(), position);
            }
        }

        if !current.is_empty() {
            let mut merged = self.remembered_positions(session, import_id);
            merged.extend(current);
            self.write(session, Resource::OverlayPositions { import_id: import_id.to_string() }, &merged);
        }
        if let Some(position) = pseudo_position {
            self.write(session, Resource::PseudoPosition { import_id: import_id.to_string() }, &position);
        }
    }

    pub fn remembered_positions(&self, session: &EditorSession, import_id: &str) -> BTreeMap<String, Position> {
        let key = CacheKey::new(session, Resource::OverlayPositions { import_id: import_id.to_string() });
        self.cache.get(&key).ok().flatten().unwrap_or_default()
    }

    fn remembered_pseudo(&self, session: &EditorSession, import_id: &str) -> Option<Position> {
        let key = CacheKey::new(session, Resource::PseudoPosition { import_id: import_id.to_string() });
        self.cache.get(&key).ok().flatten()
    }

    fn write<T: serde::Serialize>(&self, session: &EditorSession, resource: Resource, value: &T) {
        let key = CacheKey::new(session, resource);
        if let Err(e) = self.cache.put(&key, value) {
            tracing::warn!(key = %key, error = %e, "failed to persist overlay positions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ontograph_model::{ClassAttrs, ElementSpec};
    use ontograph_storage::MemoryRemoteStore;

    fn composer() -> OverlayComposer {
        OverlayComposer::new(
            OverlayGeometry::default(),
            Arc::new(LocalCache::in_memory()),
            Arc::new(MemoryRemoteStore::new()),
        )
    }

    fn imported(import_id: &str, labels: &[&str]) -> Vec<GraphElement> {
        labels
            .iter()
            .map(|label| {
                let mut e = GraphElement::new(
                    &overlay_id(import_id, label),
                    label,
                    ElementAttrs::Class(ClassAttrs::default()),
                );
                e.origin = Origin::overlay(import_id);
                e
            })
            .collect()
    }

    fn model_with_local(labels: &[&str]) -> (GraphModel, EditorSession) {
        let session = EditorSession::new("p1", "sensors", "ana");
        let mut model = GraphModel::new(session.clone());
        for (i, label) in labels.iter().enumerate() {
            model
                .add_element(ElementSpec::class(label).with_id(label).at(i as f64 * 100.0, 0.0))
                .unwrap();
        }
        (model, session)
    }

    #[test]
    fn expanded_cluster_sits_right_of_local_bounds() {
        let c = composer();
        let (mut model, session) = model_with_local(&["Sensor", "Platform"]);
        let source = imported("foaf", &["Agent", "Person"]);
        c.compose(&mut model, &session, "foaf", &source, false, 0);

        for id in [overlay_id("foaf", "Agent"), overlay_id("foaf", "Person")] {
            let p = model.position(&id).unwrap();
            assert!(p.x >= 100.0 + OverlayGeometry::default().cluster_gap);
        }
    }

    #[test]
    fn equivalence_matches_normalized_labels() {
        let c = composer();
        let (mut model, session) = model_with_local(&["Person"]);
        let source = imported("foaf", &[" person ", "Agent"]);
        c.compose(&mut model, &session, "foaf", &source, false, 0);

        let equivalences: Vec<_> = model
            .query(|e| e.kind() == ElementKind::Equivalence)
            .into_iter()
            .map(|e| e.endpoints().map(|(s, t)| (s.to_string(), t.to_string())))
            .collect();
        assert_eq!(
            equivalences,
            vec![Some((overlay_id("foaf", " person "), "Person".to_string()))]
        );
    }

    #[test]
    fn compose_is_idempotent() {
        let c = composer();
        let (mut model, session) = model_with_local(&["Person"]);
        let source = imported("foaf", &["Person", "Agent"]);
        let first = c.compose(&mut model, &session, "foaf", &source, false, 0);
        let count = model.len();
        let second = c.compose(&mut model, &session, "foaf", &source, false, 0);
        assert_eq!(first, (3, 0));
        assert_eq!(second, (0, 0));
        assert_eq!(model.len(), count);
    }

    #[test]
    fn collapsed_pseudo_node_links_to_matching_locals() {
        let c = composer();
        let (mut model, session) = model_with_local(&["Person", "Sensor"]);
        let source = imported("foaf", &["Person", "Agent"]);
        c.compose(&mut model, &session, "foaf", &source, true, 0);

        let pseudo = model.get(&pseudo_id("foaf")).unwrap();
        match &pseudo.attrs {
            ElementAttrs::PseudoImport(p) => assert_eq!(p.member_count, 2),
            other => panic!("unexpected attrs {other:?}"),
        }
        assert_eq!(model.overlay_elements("foaf").count(), 2);
        assert!(model
            .edges()
            .any(|e| e.endpoints() == Some((pseudo_id("foaf").as_str(), "Person"))));
    }

    #[test]
    fn guard_rejects_second_claim_until_dropped() {
        let c = composer();
        let session = EditorSession::new("p1", "sensors", "ana");
        let guard = c.begin(&session, "foaf").unwrap();
        assert!(matches!(
            c.begin(&session, "foaf"),
            Err(SyncError::ConcurrentComposition(id)) if id == "foaf"
        ));
        drop(guard);
        assert!(c.begin(&session, "foaf").is_ok());
    }

    #[test]
    fn coalesced_claim_asks_holder_for_one_more_pass() {
        let c = composer();
        let session = EditorSession::new("p1", "sensors", "ana");
        let mut guard = c.begin(&session, "foaf").unwrap();
        assert!(c.begin(&session, "foaf").is_err());
        assert!(c.begin(&session, "foaf").is_err());

        assert!(guard.finish());
        assert!(c.begin(&session, "foaf").is_err());
        assert!(guard.finish());
        assert!(!guard.finish());
        assert!(c.begin(&session, "foaf").is_ok());
    }

    #[test]
    fn claims_are_per_ontology() {
        let c = composer();
        let sensors = EditorSession::new("p1", "sensors", "ana");
        let _guard = c.begin(&sensors, "foaf").unwrap();
        assert!(c.begin(&sensors.with_ontology("vehicles"), "foaf").is_ok());
    }
}
