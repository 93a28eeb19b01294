//! Remote store contract and the JSON graph document it exchanges.
//!
//! The remote store speaks in ontology terms (classes, object properties,
//! datatype properties, notes); the editor speaks in nodes and edges. The
//! conversion lives here so both the engine and the overlay composer use the
//! same mapping.

use crate::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ontograph_model::{
    ClassAttrs, DataPropertyAttrs, ElementAttrs, GraphElement, GraphSnapshot, LayoutSnapshot,
    NamedView, NoteAttrs, Origin, Provenance, RelationAttrs, Stamp,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Contract
// ============================================================================

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_graph(&self, ontology_id: &str) -> Result<RemoteGraphDocument, StorageError>;

    async fn commit_graph(
        &self,
        ontology_id: &str,
        document: &RemoteGraphDocument,
    ) -> Result<(), StorageError>;

    async fn fetch_layout(&self, ontology_id: &str) -> Result<LayoutSnapshot, StorageError>;

    async fn commit_layout(
        &self,
        ontology_id: &str,
        layout: &LayoutSnapshot,
    ) -> Result<(), StorageError>;

    async fn fetch_named_views(&self, ontology_id: &str) -> Result<Vec<NamedView>, StorageError>;

    async fn commit_named_views(
        &self,
        ontology_id: &str,
        views: &[NamedView],
    ) -> Result<(), StorageError>;

    /// Hand a serialized exchange document (Turtle) to the store.
    async fn post_exchange_document(
        &self,
        ontology_id: &str,
        turtle: &str,
    ) -> Result<(), StorageError>;
}

// ============================================================================
// Graph document
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteClass {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sub_class_of: Vec<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// Any relation between two local nodes. `domain` / `range` are node ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteObjectProperty {
    pub id: String,
    pub label: String,
    pub predicate: String,
    pub domain: String,
    pub range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype_constraint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enumeration_values: Vec<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteDatatypeProperty {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enumeration: Vec<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteNote {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// `{classes, objectProperties, datatypeProperties, notes}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteGraphDocument {
    pub classes: Vec<RemoteClass>,
    pub object_properties: Vec<RemoteObjectProperty>,
    pub datatype_properties: Vec<RemoteDatatypeProperty>,
    pub notes: Vec<RemoteNote>,
}

impl RemoteGraphDocument {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.object_properties.is_empty()
            && self.datatype_properties.is_empty()
            && self.notes.is_empty()
    }

    /// Build a document from local elements. Overlay elements, pseudo-import
    /// nodes and equivalence edges never leave the editor.
    pub fn from_elements<'a>(elements: impl IntoIterator<Item = &'a GraphElement>) -> Self {
        let mut doc = Self::default();
        for element in elements.into_iter().filter(|e| !e.is_overlay()) {
            let id = element.id.clone();
            let label = element.label.clone();
            let stamp = element.stamp.clone();
            match &element.attrs {
                ElementAttrs::Class(c) => doc.classes.push(RemoteClass {
                    id,
                    label,
                    comment: c.comment.clone(),
                    definition: c.definition.clone(),
                    sub_class_of: c.parents.clone(),
                    stamp,
                }),
                ElementAttrs::DataProperty(d) => doc.datatype_properties.push(RemoteDatatypeProperty {
                    id,
                    label,
                    range: d.datatype.clone(),
                    comment: d.comment.clone(),
                    definition: d.definition.clone(),
                    enumeration: d.enumeration.clone(),
                    stamp,
                }),
                ElementAttrs::Note(n) => doc.notes.push(RemoteNote {
                    id,
                    label,
                    comment: n.comment.clone(),
                    stamp,
                }),
                ElementAttrs::Relation(r) => doc.object_properties.push(RemoteObjectProperty {
                    id,
                    label,
                    predicate: r.predicate.clone(),
                    domain: r.source.clone(),
                    range: r.target.clone(),
                    comment: r.comment.clone(),
                    min_count: r.min_count,
                    max_count: r.max_count,
                    datatype_constraint: r.datatype_constraint.clone(),
                    enumeration_values: r.enumeration_values.clone(),
                    stamp,
                }),
                ElementAttrs::PseudoImport(_) | ElementAttrs::Equivalence(_) => {}
            }
        }
        doc
    }

    pub fn from_snapshot(snapshot: &GraphSnapshot) -> Self {
        Self::from_elements(snapshot.elements())
    }

    /// Convert into local elements. Relations whose endpoints are missing
    /// from the document are dropped.
    pub fn into_elements(self) -> Vec<GraphElement> {
        let mut out = Vec::new();
        for c in self.classes {
            out.push(element(
                c.id,
                c.label,
                c.stamp,
                ElementAttrs::Class(ClassAttrs {
                    comment: c.comment,
                    definition: c.definition,
                    parents: c.sub_class_of,
                }),
            ));
        }
        for d in self.datatype_properties {
            out.push(element(
                d.id,
                d.label,
                d.stamp,
                ElementAttrs::DataProperty(DataPropertyAttrs {
                    comment: d.comment,
                    definition: d.definition,
                    datatype: d.range,
                    enumeration: d.enumeration,
                }),
            ));
        }
        for n in self.notes {
            out.push(element(
                n.id,
                n.label,
                n.stamp,
                ElementAttrs::Note(NoteAttrs { comment: n.comment }),
            ));
        }

        let node_ids: std::collections::HashSet<String> = out.iter().map(|e| e.id.clone()).collect();
        for p in self.object_properties {
            if !node_ids.contains(&p.domain) || !node_ids.contains(&p.range) {
                tracing::debug!(property = %p.id, "dropping object property with unknown endpoint");
                continue;
            }
            let predicate = if p.predicate.is_empty() {
                p.label.clone()
            } else {
                p.predicate
            };
            out.push(element(
                p.id,
                p.label,
                p.stamp,
                ElementAttrs::Relation(RelationAttrs {
                    source: p.domain,
                    target: p.range,
                    predicate,
                    comment: p.comment,
                    min_count: p.min_count,
                    max_count: p.max_count,
                    datatype_constraint: p.datatype_constraint,
                    enumeration_values: p.enumeration_values,
                }),
            ));
        }
        out
    }

    pub fn into_snapshot(self, provenance: Provenance, timestamp: DateTime<Utc>) -> GraphSnapshot {
        GraphSnapshot::new(self.into_elements(), provenance, timestamp)
    }
}

fn element(id: String, label: String, stamp: Stamp, attrs: ElementAttrs) -> GraphElement {
    GraphElement {
        id,
        label,
        origin: Origin::Local,
        stamp,
        attrs,
    }
}
