//! The authoritative in-memory graph.
//!
//! `GraphModel` owns every local element and the layout state. Overlay
//! elements live here too (so they render and take part in queries), but
//! they are inserted and removed only through the overlay entry points; the
//! ordinary mutation API refuses to touch them.
//!
//! Every mutation is journaled as a [`ModelChange`]. The persistence layer
//! drains the journal to decide which debounce channels to arm.

use crate::element::{ElementAttrs, ElementSpec, GraphElement, Origin, Stamp};
use crate::error::ModelError;
use crate::layout::{Bounds, LayoutSnapshot, Position, Viewport};
use crate::session::EditorSession;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

// ============================================================================
// Snapshots and journal
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    /// Written by this editor; may hold edits the remote store has not seen.
    Local,
    /// Mirrors what the remote store returned or confirmed.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphElement>,
    pub edges: Vec<GraphElement>,
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
}

impl GraphSnapshot {
    pub fn new(
        elements: impl IntoIterator<Item = GraphElement>,
        provenance: Provenance,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (edges, nodes) = elements.into_iter().partition(|e| e.is_edge());
        Self {
            nodes,
            edges,
            timestamp,
            provenance,
        }
    }

    pub fn empty(provenance: Provenance) -> Self {
        Self::new(Vec::new(), provenance, Utc::now())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn elements(&self) -> impl Iterator<Item = &GraphElement> {
        self.nodes.iter().chain(self.edges.iter())
    }

    pub fn into_elements(self) -> impl Iterator<Item = GraphElement> {
        self.nodes.into_iter().chain(self.edges)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChange {
    /// Local elements added, removed, or re-attributed.
    Structural { ids: Vec<String> },
    /// Node positions moved.
    Position { ids: Vec<String> },
    /// Zoom or pan changed.
    Viewport,
    /// Overlay elements of one import were (re)composed or purged.
    Overlay { import_id: String },
}

impl ModelChange {
    pub fn is_structural(&self) -> bool {
        matches!(self, ModelChange::Structural { .. })
    }

    /// Position and camera changes both count as layout changes.
    pub fn is_layout(&self) -> bool {
        matches!(self, ModelChange::Position { .. } | ModelChange::Viewport)
    }
}

/// Outcome of a batch removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removal {
    /// Requested ids plus the incident edges that went with them.
    pub removed: Vec<String>,
    pub not_found: Vec<String>,
    pub read_only: Vec<String>,
}

// ============================================================================
// Graph model
// ============================================================================

#[derive(Debug, Clone)]
pub struct GraphModel {
    session: EditorSession,
    elements: BTreeMap<String, GraphElement>,
    positions: BTreeMap<String, Position>,
    viewport: Viewport,
    revision: u64,
    changes: Vec<ModelChange>,
}

impl GraphModel {
    pub fn new(session: EditorSession) -> Self {
        Self {
            session,
            elements: BTreeMap::new(),
            positions: BTreeMap::new(),
            viewport: Viewport::default(),
            revision: 0,
            changes: Vec::new(),
        }
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    /// Monotonic counter bumped by every mutation, journaled or not.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn record(&mut self, change: ModelChange) {
        self.revision += 1;
        self.changes.push(change);
    }

    pub fn drain_changes(&mut self) -> Vec<ModelChange> {
        std::mem::take(&mut self.changes)
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&GraphElement> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn query(&self, predicate: impl Fn(&GraphElement) -> bool) -> Vec<&GraphElement> {
        self.elements.values().filter(|e| predicate(*e)).collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &GraphElement> {
        self.elements.values()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphElement> {
        self.elements.values().filter(|e| !e.is_edge())
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphElement> {
        self.elements.values().filter(|e| e.is_edge())
    }

    pub fn local_elements(&self) -> impl Iterator<Item = &GraphElement> {
        self.elements.values().filter(|e| !e.is_overlay())
    }

    pub fn overlay_elements<'a>(
        &'a self,
        import_id: &'a str,
    ) -> impl Iterator<Item = &'a GraphElement> + 'a {
        self.elements
            .values()
            .filter(move |e| e.import_source() == Some(import_id))
    }

    // ------------------------------------------------------------------------
    // Local mutation
    // ------------------------------------------------------------------------

    fn is_local_node(&self, id: &str) -> bool {
        self.elements
            .get(id)
            .is_some_and(|e| !e.is_edge() && !e.is_overlay())
    }

    /// Create a local element. Stamps `creator` / `createdAt`.
    pub fn add_element(&mut self, spec: ElementSpec) -> Result<String, ModelError> {
        let id = spec.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.elements.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        if let Some((source, target)) = spec.attrs.endpoints() {
            for endpoint in [source, target] {
                if !self.is_local_node(endpoint) {
                    return Err(ModelError::DanglingEdge {
                        id,
                        endpoint: endpoint.to_string(),
                    });
                }
            }
        }

        let element = GraphElement {
            id: id.clone(),
            label: spec.label,
            origin: Origin::Local,
            stamp: Stamp {
                creator: Some(self.session.user.clone()),
                created_at: Some(Utc::now()),
                ..Default::default()
            },
            attrs: spec.attrs,
        };
        if let (Some(position), false) = (spec.position, element.is_edge()) {
            self.positions.insert(id.clone(), position);
        }
        self.elements.insert(id.clone(), element);
        self.record(ModelChange::Structural {
            ids: vec![id.clone()],
        });
        Ok(id)
    }

    /// Remove local elements. Removing a node removes its incident edges.
    pub fn remove_elements<S: AsRef<str>>(&mut self, ids: &[S]) -> Removal {
        let mut removal = Removal::default();
        let mut doomed: BTreeSet<String> = BTreeSet::new();

        for id in ids {
            let id = id.as_ref();
            match self.elements.get(id) {
                None => removal.not_found.push(id.to_string()),
                Some(e) if e.is_overlay() => removal.read_only.push(id.to_string()),
                Some(_) => {
                    doomed.insert(id.to_string());
                }
            }
        }

        let incident: Vec<String> = self
            .elements
            .values()
            .filter(|e| {
                e.endpoints()
                    .is_some_and(|(s, t)| doomed.contains(s) || doomed.contains(t))
            })
            .map(|e| e.id.clone())
            .collect();
        doomed.extend(incident);

        for id in &doomed {
            self.elements.remove(id);
            self.positions.remove(id);
        }
        for element in self.elements.values_mut() {
            if let ElementAttrs::Class(c) = &mut element.attrs {
                c.parents.retain(|p| !doomed.contains(p));
            }
        }

        if !doomed.is_empty() {
            removal.removed = doomed.into_iter().collect();
            self.record(ModelChange::Structural {
                ids: removal.removed.clone(),
            });
        }
        removal
    }

    /// Shallow-merge a patch into an element's attributes.
    ///
    /// Stamps `lastModifiedBy` / `lastModifiedAt` and returns the new attrs.
    pub fn update_attrs(
        &mut self,
        id: &str,
        patch: &crate::element::AttrPatch,
    ) -> Result<ElementAttrs, ModelError> {
        let current = self
            .elements
            .get(id)
            .ok_or_else(|| ModelError::NotFound(id.to_string()))?;
        if current.is_overlay() {
            return Err(ModelError::ReadOnlyOverlay(id.to_string()));
        }

        let mut updated = current.clone();
        updated.apply_patch(patch, &self.session.user, Utc::now())?;
        if let ElementAttrs::Class(c) = &updated.attrs {
            if let Some(bad) = c.parents.iter().find(|p| {
                p.as_str() == id
                    || !self
                        .elements
                        .get(p.as_str())
                        .is_some_and(|e| matches!(e.attrs, ElementAttrs::Class(_)))
            }) {
                return Err(ModelError::InvalidAttribute {
                    id: id.to_string(),
                    kind: updated.kind(),
                    key: "parents".to_string(),
                    reason: format!("`{bad}` is not another class in this graph"),
                });
            }
        }

        let attrs = updated.attrs.clone();
        self.elements.insert(id.to_string(), updated);
        self.record(ModelChange::Structural {
            ids: vec![id.to_string()],
        });
        Ok(attrs)
    }

    // ------------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------------

    pub fn position(&self, id: &str) -> Option<Position> {
        self.positions.get(id).copied()
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    /// Move a node (local or overlay).
    pub fn set_position(&mut self, id: &str, position: Position) -> Result<(), ModelError> {
        match self.elements.get(id) {
            Some(e) if !e.is_edge() => {
                self.positions.insert(id.to_string(), position);
                self.record(ModelChange::Position {
                    ids: vec![id.to_string()],
                });
                Ok(())
            }
            _ => Err(ModelError::NotFound(id.to_string())),
        }
    }

    /// Bulk move; ids that are not nodes in the graph are skipped.
    /// Returns how many positions were applied.
    pub fn apply_positions<'a>(
        &mut self,
        positions: impl IntoIterator<Item = (&'a String, &'a Position)>,
    ) -> usize {
        let mut moved = Vec::new();
        for (id, position) in positions {
            if self.elements.get(id).is_some_and(|e| !e.is_edge()) {
                self.positions.insert(id.clone(), *position);
                moved.push(id.clone());
            }
        }
        let count = moved.len();
        if count > 0 {
            self.record(ModelChange::Position { ids: moved });
        }
        count
    }

    /// Apply a whole layout: node positions plus camera.
    pub fn apply_layout(&mut self, layout: &LayoutSnapshot) -> usize {
        let moved = self.apply_positions(&layout.positions());
        self.set_viewport(layout.viewport());
        moved
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.record(ModelChange::Viewport);
    }

    /// Layout of local nodes (or of every node) plus the camera.
    pub fn layout_snapshot(&self, local_only: bool) -> LayoutSnapshot {
        let positions: BTreeMap<String, Position> = self
            .positions
            .iter()
            .filter(|(id, _)| !local_only || self.is_local_node(id))
            .map(|(id, p)| (id.clone(), *p))
            .collect();
        LayoutSnapshot::from_parts(&positions, self.viewport)
    }

    /// Bounding box of the local nodes that have positions.
    pub fn local_bounds(&self) -> Option<Bounds> {
        Bounds::around(
            self.positions
                .iter()
                .filter(|(id, _)| self.is_local_node(id))
                .map(|(_, p)| p),
        )
    }

    // ------------------------------------------------------------------------
    // Snapshot / restore
    // ------------------------------------------------------------------------

    /// Non-overlay content, stamped now.
    pub fn snapshot(&self, provenance: Provenance) -> GraphSnapshot {
        GraphSnapshot::new(self.local_elements().cloned(), provenance, Utc::now())
    }

    /// Replace the whole graph (overlays included) with a loaded snapshot.
    ///
    /// Loading is not an edit, so nothing is journaled.
    pub fn restore(&mut self, snapshot: &GraphSnapshot, layout: &LayoutSnapshot) {
        self.elements.clear();
        self.positions.clear();
        self.changes.clear();

        for node in &snapshot.nodes {
            let mut node = node.clone();
            node.origin = Origin::Local;
            self.elements.insert(node.id.clone(), node);
        }
        for edge in &snapshot.edges {
            match edge.endpoints() {
                Some((s, t)) if self.is_local_node(s) && self.is_local_node(t) => {
                    let mut edge = edge.clone();
                    edge.origin = Origin::Local;
                    self.elements.insert(edge.id.clone(), edge);
                }
                _ => tracing::warn!(edge = %edge.id, "dropping dangling edge from snapshot"),
            }
        }
        for (id, position) in layout.positions() {
            if self.elements.get(&id).is_some_and(|e| !e.is_edge()) {
                self.positions.insert(id, position);
            }
        }
        self.viewport = layout.viewport();
        self.revision += 1;
    }

    // ------------------------------------------------------------------------
    // Overlay entry points (owned by the overlay composer)
    // ------------------------------------------------------------------------

    /// Insert an overlay element unless its id is already present.
    ///
    /// Edges need both endpoints present. Returns whether it was inserted.
    pub fn insert_overlay(&mut self, element: GraphElement, position: Option<Position>) -> bool {
        let Some(import_id) = element.import_source().map(str::to_string) else {
            tracing::warn!(id = %element.id, "refusing to insert a local element as overlay");
            return false;
        };
        if self.elements.contains_key(&element.id) {
            return false;
        }
        if let Some((s, t)) = element.endpoints() {
            if !self.contains(s) || !self.contains(t) {
                return false;
            }
        }
        if let (Some(position), false) = (position, element.is_edge()) {
            self.positions.insert(element.id.clone(), position);
        }
        self.elements.insert(element.id.clone(), element);
        self.record(ModelChange::Overlay { import_id });
        true
    }

    /// Remove overlay elements of `import_id` selected by `filter`, plus any
    /// edge incident to a removed node. Returns each removed element with
    /// the position it had.
    pub fn remove_overlay_elements(
        &mut self,
        import_id: &str,
        filter: impl Fn(&GraphElement) -> bool,
    ) -> Vec<(GraphElement, Option<Position>)> {
        let mut doomed: BTreeSet<String> = self
            .overlay_elements(import_id)
            .filter(|e| filter(*e))
            .map(|e| e.id.clone())
            .collect();
        let incident: Vec<String> = self
            .elements
            .values()
            .filter(|e| {
                e.endpoints()
                    .is_some_and(|(s, t)| doomed.contains(s) || doomed.contains(t))
            })
            .map(|e| e.id.clone())
            .collect();
        doomed.extend(incident);

        let mut removed = Vec::new();
        for id in doomed {
            if let Some(element) = self.elements.remove(&id) {
                let position = self.positions.remove(&id);
                removed.push((element, position));
            }
        }
        if !removed.is_empty() {
            self.record(ModelChange::Overlay {
                import_id: import_id.to_string(),
            });
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{AttrPatch, AttrValue, ClassAttrs, ElementKind};

    fn model() -> GraphModel {
        GraphModel::new(EditorSession::new("p1", "o1", "alice"))
    }

    #[test]
    fn add_stamps_creator_and_journals() {
        let mut m = model();
        let id = m.add_element(ElementSpec::class("Sensor").at(1.0, 2.0)).unwrap();
        let el = m.get(&id).unwrap();
        assert_eq!(el.stamp.creator.as_deref(), Some("alice"));
        assert!(el.stamp.created_at.is_some());
        assert_eq!(m.position(&id), Some(Position::new(1.0, 2.0)));
        assert!(m.drain_changes()[0].is_structural());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        assert_eq!(
            m.add_element(ElementSpec::class("B").with_id("a")),
            Err(ModelError::DuplicateId("a".into()))
        );
    }

    #[test]
    fn edges_need_local_endpoints() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        let err = m
            .add_element(ElementSpec::relation("a", "missing", "rel"))
            .unwrap_err();
        assert!(matches!(err, ModelError::DanglingEdge { endpoint, .. } if endpoint == "missing"));
    }

    #[test]
    fn removing_node_removes_incident_edges_and_parent_links() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        m.add_element(ElementSpec::class("B").with_id("b").with_parents(&["a"]))
            .unwrap();
        m.add_element(ElementSpec::relation("a", "b", "rel").with_id("e"))
            .unwrap();

        let removal = m.remove_elements(&["a", "ghost"]);
        assert_eq!(removal.removed, vec!["a".to_string(), "e".to_string()]);
        assert_eq!(removal.not_found, vec!["ghost".to_string()]);
        assert!(!m.contains("e"));
        let ElementAttrs::Class(b) = &m.get("b").unwrap().attrs else {
            panic!()
        };
        assert!(b.parents.is_empty());
    }

    #[test]
    fn update_unknown_id_is_not_found_and_no_op() {
        let mut m = model();
        let before = m.revision();
        let err = m.update_attrs("nope", &AttrPatch::new()).unwrap_err();
        assert_eq!(err, ModelError::NotFound("nope".into()));
        assert_eq!(m.revision(), before);
    }

    #[test]
    fn update_stamps_modifier() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        let mut patch = AttrPatch::new();
        patch.insert("comment".into(), Some(AttrValue::text("a thing")));
        let attrs = m.update_attrs("a", &patch).unwrap();
        assert_eq!(
            attrs,
            ElementAttrs::Class(ClassAttrs {
                comment: Some("a thing".into()),
                ..Default::default()
            })
        );
        let el = m.get("a").unwrap();
        assert_eq!(el.stamp.last_modified_by.as_deref(), Some("alice"));
    }

    #[test]
    fn parents_must_name_other_classes() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        m.add_element(ElementSpec::note("n").with_id("n")).unwrap();
        let mut patch = AttrPatch::new();
        patch.insert("parents".into(), Some(AttrValue::list(&["n"])));
        assert!(matches!(
            m.update_attrs("a", &patch),
            Err(ModelError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn overlay_elements_are_read_only() {
        let mut m = model();
        let mut overlay = GraphElement::new("o", "Ext", ElementAttrs::Class(ClassAttrs::default()));
        overlay.origin = Origin::overlay("imp");
        assert!(m.insert_overlay(overlay.clone(), None));
        assert!(!m.insert_overlay(overlay, None));

        assert_eq!(
            m.update_attrs("o", &AttrPatch::new()),
            Err(ModelError::ReadOnlyOverlay("o".into()))
        );
        assert_eq!(m.remove_elements(&["o"]).read_only, vec!["o".to_string()]);
        assert!(m.snapshot(Provenance::Local).is_empty());

        let removed = m.remove_overlay_elements("imp", |_| true);
        assert_eq!(removed.len(), 1);
        assert!(m.is_empty());
    }

    #[test]
    fn query_filters_by_predicate() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        m.add_element(ElementSpec::note("n").with_id("n")).unwrap();
        let classes = m.query(|e| e.kind() == ElementKind::Class);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].id, "a");
    }

    #[test]
    fn restore_does_not_journal() {
        let mut m = model();
        m.add_element(ElementSpec::class("A").with_id("a")).unwrap();
        let snapshot = m.snapshot(Provenance::Remote);
        let layout = m.layout_snapshot(true);

        let mut fresh = model();
        fresh.restore(&snapshot, &layout);
        assert!(fresh.contains("a"));
        assert!(fresh.drain_changes().is_empty());
    }
}
