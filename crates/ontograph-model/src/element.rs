//! Graph elements and the per-kind attribute schema.
//!
//! Attributes are a tagged union keyed by element kind: a class carries
//! inheritance parents, a relation carries endpoints and multiplicity, and so
//! on. Free-form patches coming from the UI (`AttrPatch`) are validated against
//! that schema before anything is written.

use crate::error::ModelError;
use crate::layout::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Kinds and origin
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementKind {
    Class,
    DataProperty,
    Note,
    PseudoImport,
    Relation,
    Equivalence,
}

impl ElementKind {
    pub fn is_edge(self) -> bool {
        matches!(self, ElementKind::Relation | ElementKind::Equivalence)
    }

    pub fn is_node(self) -> bool {
        !self.is_edge()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Class => "class",
            ElementKind::DataProperty => "dataProperty",
            ElementKind::Note => "note",
            ElementKind::PseudoImport => "pseudoImport",
            ElementKind::Relation => "relation",
            ElementKind::Equivalence => "equivalence",
        }
    }
}

/// Where an element came from.
///
/// `Overlay` elements are sourced from an imported ontology: rendered, never
/// locally mutated, never serialized or persisted remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Origin {
    #[default]
    Local,
    Overlay {
        #[serde(rename = "importId")]
        import_id: String,
    },
}

impl Origin {
    pub fn overlay(import_id: &str) -> Self {
        Origin::Overlay {
            import_id: import_id.to_string(),
        }
    }

    pub fn is_overlay(&self) -> bool {
        matches!(self, Origin::Overlay { .. })
    }

    pub fn import_id(&self) -> Option<&str> {
        match self {
            Origin::Local => None,
            Origin::Overlay { import_id } => Some(import_id),
        }
    }
}

/// Creation / modification metadata stamped by the model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stamp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Attribute values and patches
// ============================================================================

/// A loosely typed attribute value as it crosses the UI boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn text(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }

    pub fn list<S: AsRef<str>>(items: &[S]) -> Self {
        AttrValue::List(items.iter().map(|s| s.as_ref().to_string()).collect())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// A non-negative integral number that fits a `u32`.
    pub fn as_count(&self) -> Option<u32> {
        match self {
            AttrValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= u32::MAX as f64 => {
                Some(*n as u32)
            }
            _ => None,
        }
    }

    fn shape(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "bool",
            AttrValue::Number(_) => "number",
            AttrValue::Text(_) => "text",
            AttrValue::List(_) => "list",
        }
    }
}

/// Shallow patch: `Some(value)` sets a key, `None` clears it.
pub type AttrPatch = BTreeMap<String, Option<AttrValue>>;

fn expect_text(value: Option<&AttrValue>) -> Result<Option<String>, String> {
    match value {
        None => Ok(None),
        Some(AttrValue::Text(s)) => Ok(Some(s.clone())),
        Some(other) => Err(format!("expected text, got {}", other.shape())),
    }
}

fn expect_list(value: Option<&AttrValue>) -> Result<Vec<String>, String> {
    match value {
        None => Ok(Vec::new()),
        Some(AttrValue::List(items)) => Ok(items.clone()),
        Some(other) => Err(format!("expected list, got {}", other.shape())),
    }
}

fn expect_count(value: Option<&AttrValue>) -> Result<Option<u32>, String> {
    match value {
        None => Ok(None),
        Some(v) => v
            .as_count()
            .map(Some)
            .ok_or_else(|| format!("expected a non-negative integer, got {v:?}")),
    }
}

// ============================================================================
// Per-kind schemas
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// Ids of parent classes.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataPropertyAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    /// XSD local name (`string`, `integer`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datatype: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enumeration: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteAttrs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PseudoImportAttrs {
    pub import_id: String,
    pub member_count: usize,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationAttrs {
    pub source: String,
    pub target: String,
    pub predicate: String,
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
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EquivalenceAttrs {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ElementAttrs {
    Class(ClassAttrs),
    DataProperty(DataPropertyAttrs),
    Note(NoteAttrs),
    PseudoImport(PseudoImportAttrs),
    Relation(RelationAttrs),
    Equivalence(EquivalenceAttrs),
}

impl ElementAttrs {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementAttrs::Class(_) => ElementKind::Class,
            ElementAttrs::DataProperty(_) => ElementKind::DataProperty,
            ElementAttrs::Note(_) => ElementKind::Note,
            ElementAttrs::PseudoImport(_) => ElementKind::PseudoImport,
            ElementAttrs::Relation(_) => ElementKind::Relation,
            ElementAttrs::Equivalence(_) => ElementKind::Equivalence,
        }
    }

    pub fn endpoints(&self) -> Option<(&str, &str)> {
        match self {
            ElementAttrs::Relation(r) => Some((&r.source, &r.target)),
            ElementAttrs::Equivalence(e) => Some((&e.source, &e.target)),
            _ => None,
        }
    }

    /// Flattened view of the set fields, keyed the way patches and the
    /// attribute codec name them. Endpoints are structural and not included.
    pub fn to_attr_map(&self) -> BTreeMap<String, AttrValue> {
        fn put_text(out: &mut BTreeMap<String, AttrValue>, key: &str, v: &Option<String>) {
            if let Some(v) = v {
                out.insert(key.to_string(), AttrValue::Text(v.clone()));
            }
        }

        let mut out = BTreeMap::new();
        match self {
            ElementAttrs::Class(c) => {
                put_text(&mut out, "comment", &c.comment);
                put_text(&mut out, "definition", &c.definition);
                if !c.parents.is_empty() {
                    out.insert("parents".to_string(), AttrValue::List(c.parents.clone()));
                }
            }
            ElementAttrs::DataProperty(d) => {
                put_text(&mut out, "comment", &d.comment);
                put_text(&mut out, "definition", &d.definition);
                put_text(&mut out, "datatype", &d.datatype);
                if !d.enumeration.is_empty() {
                    out.insert(
                        "enumeration".to_string(),
                        AttrValue::List(d.enumeration.clone()),
                    );
                }
            }
            ElementAttrs::Note(n) => put_text(&mut out, "comment", &n.comment),
            ElementAttrs::PseudoImport(p) => {
                out.insert("importId".to_string(), AttrValue::Text(p.import_id.clone()));
                out.insert(
                    "memberCount".to_string(),
                    AttrValue::Number(p.member_count as f64),
                );
            }
            ElementAttrs::Relation(r) => {
                out.insert("predicate".to_string(), AttrValue::Text(r.predicate.clone()));
                put_text(&mut out, "comment", &r.comment);
                if let Some(n) = r.min_count {
                    out.insert("minCount".to_string(), AttrValue::Number(n as f64));
                }
                if let Some(n) = r.max_count {
                    out.insert("maxCount".to_string(), AttrValue::Number(n as f64));
                }
                put_text(&mut out, "datatypeConstraint", &r.datatype_constraint);
                if !r.enumeration_values.is_empty() {
                    out.insert(
                        "enumerationValues".to_string(),
                        AttrValue::List(r.enumeration_values.clone()),
                    );
                }
            }
            ElementAttrs::Equivalence(_) => {}
        }
        out
    }

    /// Apply one patch entry. Returns the rejection reason on failure.
    fn apply(&mut self, key: &str, value: Option<&AttrValue>) -> Result<(), String> {
        match (self, key) {
            (ElementAttrs::Class(c), "comment") => c.comment = expect_text(value)?,
            (ElementAttrs::Class(c), "definition") => c.definition = expect_text(value)?,
            (ElementAttrs::Class(c), "parents") => c.parents = expect_list(value)?,

            (ElementAttrs::DataProperty(d), "comment") => d.comment = expect_text(value)?,
            (ElementAttrs::DataProperty(d), "definition") => d.definition = expect_text(value)?,
            (ElementAttrs::DataProperty(d), "datatype") => d.datatype = expect_text(value)?,
            (ElementAttrs::DataProperty(d), "enumeration") => d.enumeration = expect_list(value)?,

            (ElementAttrs::Note(n), "comment") => n.comment = expect_text(value)?,

            (ElementAttrs::Relation(r), "predicate") => {
                r.predicate = expect_text(value)?
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| "predicate cannot be empty".to_string())?;
            }
            (ElementAttrs::Relation(r), "comment") => r.comment = expect_text(value)?,
            (ElementAttrs::Relation(r), "minCount") => r.min_count = expect_count(value)?,
            (ElementAttrs::Relation(r), "maxCount") => r.max_count = expect_count(value)?,
            (ElementAttrs::Relation(r), "datatypeConstraint") => {
                r.datatype_constraint = expect_text(value)?
            }
            (ElementAttrs::Relation(r), "enumerationValues") => {
                r.enumeration_values = expect_list(value)?
            }

            (attrs, _) => {
                return Err(format!(
                    "not part of the {} schema",
                    attrs.kind().as_str()
                ))
            }
        }
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), (String, String)> {
        if let ElementAttrs::Relation(r) = self {
            if let (Some(min), Some(max)) = (r.min_count, r.max_count) {
                if min > max {
                    return Err((
                        "minCount".to_string(),
                        format!("minCount {min} exceeds maxCount {max}"),
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Graph elements
// ============================================================================

/// Trimmed, case-folded label used for equivalence matching.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphElement {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    pub stamp: Stamp,
    pub attrs: ElementAttrs,
}

impl GraphElement {
    pub fn new(id: &str, label: &str, attrs: ElementAttrs) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            origin: Origin::Local,
            stamp: Stamp::default(),
            attrs,
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.attrs.kind()
    }

    pub fn is_edge(&self) -> bool {
        self.kind().is_edge()
    }

    pub fn is_overlay(&self) -> bool {
        self.origin.is_overlay()
    }

    pub fn import_source(&self) -> Option<&str> {
        self.origin.import_id()
    }

    pub fn endpoints(&self) -> Option<(&str, &str)> {
        self.attrs.endpoints()
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.endpoints()
            .is_some_and(|(s, t)| s == node_id || t == node_id)
    }

    pub fn normalized_label(&self) -> String {
        normalize_label(&self.label)
    }

    /// Schema attributes plus provenance stamp, as a flat key/value map.
    pub fn attr_map(&self) -> BTreeMap<String, AttrValue> {
        let mut out = self.attrs.to_attr_map();
        if let Some(c) = &self.stamp.creator {
            out.insert("creator".to_string(), AttrValue::Text(c.clone()));
        }
        if let Some(t) = &self.stamp.created_at {
            out.insert("createdAt".to_string(), AttrValue::Text(t.to_rfc3339()));
        }
        if let Some(m) = &self.stamp.last_modified_by {
            out.insert("lastModifiedBy".to_string(), AttrValue::Text(m.clone()));
        }
        if let Some(t) = &self.stamp.last_modified_at {
            out.insert("lastModifiedAt".to_string(), AttrValue::Text(t.to_rfc3339()));
        }
        out
    }

    /// Validate and apply a shallow patch. All-or-nothing.
    pub fn apply_patch(
        &mut self,
        patch: &AttrPatch,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ModelError> {
        let invalid = |key: &str, reason: String| ModelError::InvalidAttribute {
            id: self.id.clone(),
            kind: self.kind(),
            key: key.to_string(),
            reason,
        };

        let mut attrs = self.attrs.clone();
        let mut label = self.label.clone();
        for (key, value) in patch {
            if key == "label" {
                label = expect_text(value.as_ref())
                    .and_then(|l| l.ok_or_else(|| "label cannot be cleared".to_string()))
                    .map_err(|reason| invalid(key, reason))?;
                continue;
            }
            attrs
                .apply(key, value.as_ref())
                .map_err(|reason| invalid(key, reason))?;
        }
        attrs
            .check_invariants()
            .map_err(|(key, reason)| invalid(&key, reason))?;

        self.attrs = attrs;
        self.label = label;
        self.stamp.last_modified_by = Some(actor.to_string());
        self.stamp.last_modified_at = Some(now);
        Ok(())
    }

    /// Rewrite this element's id and every id it references.
    pub fn rekey(&mut self, map: impl Fn(&str) -> String) {
        self.id = map(&self.id);
        match &mut self.attrs {
            ElementAttrs::Class(c) => {
                for parent in &mut c.parents {
                    *parent = map(parent);
                }
            }
            ElementAttrs::Relation(r) => {
                r.source = map(&r.source);
                r.target = map(&r.target);
            }
            ElementAttrs::Equivalence(e) => {
                e.source = map(&e.source);
                e.target = map(&e.target);
            }
            _ => {}
        }
    }
}

// ============================================================================
// Creation specs
// ============================================================================

/// What the UI asks for when it creates an element.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSpec {
    pub id: Option<String>,
    pub label: String,
    pub attrs: ElementAttrs,
    pub position: Option<Position>,
}

impl ElementSpec {
    fn with_attrs(label: &str, attrs: ElementAttrs) -> Self {
        Self {
            id: None,
            label: label.to_string(),
            attrs,
            position: None,
        }
    }

    pub fn class(label: &str) -> Self {
        Self::with_attrs(label, ElementAttrs::Class(ClassAttrs::default()))
    }

    pub fn data_property(label: &str, datatype: Option<&str>) -> Self {
        Self::with_attrs(
            label,
            ElementAttrs::DataProperty(DataPropertyAttrs {
                datatype: datatype.map(str::to_string),
                ..Default::default()
            }),
        )
    }

    pub fn note(label: &str) -> Self {
        Self::with_attrs(label, ElementAttrs::Note(NoteAttrs::default()))
    }

    pub fn relation(source: &str, target: &str, predicate: &str) -> Self {
        Self::with_attrs(
            predicate,
            ElementAttrs::Relation(RelationAttrs {
                source: source.to_string(),
                target: target.to_string(),
                predicate: predicate.to_string(),
                ..Default::default()
            }),
        )
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    pub fn with_multiplicity(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        if let ElementAttrs::Relation(r) = &mut self.attrs {
            r.min_count = min;
            r.max_count = max;
        }
        self
    }

    pub fn with_parents(mut self, parents: &[&str]) -> Self {
        if let ElementAttrs::Class(c) = &mut self.attrs {
            c.parents = parents.iter().map(|p| p.to_string()).collect();
        }
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        let comment = Some(comment.to_string());
        match &mut self.attrs {
            ElementAttrs::Class(c) => c.comment = comment,
            ElementAttrs::DataProperty(d) => d.comment = comment,
            ElementAttrs::Note(n) => n.comment = comment,
            ElementAttrs::Relation(r) => r.comment = comment,
            ElementAttrs::PseudoImport(_) | ElementAttrs::Equivalence(_) => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation() -> GraphElement {
        GraphElement::new(
            "r1",
            "mountedOn",
            ElementAttrs::Relation(RelationAttrs {
                source: "a".into(),
                target: "b".into(),
                predicate: "mountedOn".into(),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn patch_sets_multiplicity_and_stamps() {
        let mut el = relation();
        let mut patch = AttrPatch::new();
        patch.insert("minCount".into(), Some(AttrValue::Number(1.0)));
        patch.insert("maxCount".into(), Some(AttrValue::Number(3.0)));
        el.apply_patch(&patch, "alice", Utc::now()).unwrap();

        let ElementAttrs::Relation(r) = &el.attrs else {
            panic!("kind changed");
        };
        assert_eq!((r.min_count, r.max_count), (Some(1), Some(3)));
        assert_eq!(el.stamp.last_modified_by.as_deref(), Some("alice"));
        assert!(el.stamp.last_modified_at.is_some());
    }

    #[test]
    fn patch_rejects_keys_outside_schema() {
        let mut el = GraphElement::new("c", "Sensor", ElementAttrs::Class(ClassAttrs::default()));
        let mut patch = AttrPatch::new();
        patch.insert("minCount".into(), Some(AttrValue::Number(1.0)));
        let err = el.apply_patch(&patch, "alice", Utc::now()).unwrap_err();
        assert!(matches!(err, ModelError::InvalidAttribute { ref key, .. } if key == "minCount"));
        assert!(el.stamp.last_modified_at.is_none());
    }

    #[test]
    fn patch_is_all_or_nothing() {
        let mut el = relation();
        let mut patch = AttrPatch::new();
        patch.insert("comment".into(), Some(AttrValue::text("kept out")));
        patch.insert("minCount".into(), Some(AttrValue::Number(4.0)));
        patch.insert("maxCount".into(), Some(AttrValue::Number(2.0)));
        assert!(el.apply_patch(&patch, "alice", Utc::now()).is_err());
        assert_eq!(el, relation());
    }

    #[test]
    fn negative_or_fractional_counts_are_rejected() {
        let mut el = relation();
        for bad in [-1.0, 1.5] {
            let mut patch = AttrPatch::new();
            patch.insert("minCount".into(), Some(AttrValue::Number(bad)));
            assert!(el.apply_patch(&patch, "alice", Utc::now()).is_err());
        }
    }

    #[test]
    fn null_clears_optional_fields() {
        let mut el = relation();
        let mut patch = AttrPatch::new();
        patch.insert("comment".into(), Some(AttrValue::text("x")));
        el.apply_patch(&patch, "u", Utc::now()).unwrap();
        let mut clear = AttrPatch::new();
        clear.insert("comment".into(), None);
        el.apply_patch(&clear, "u", Utc::now()).unwrap();
        assert!(!el.attr_map().contains_key("comment"));
    }

    #[test]
    fn attrs_roundtrip_through_json_with_kind_tag() {
        let el = relation();
        let json = serde_json::to_value(&el).unwrap();
        assert_eq!(json["attrs"]["kind"], "relation");
        let back: GraphElement = serde_json::from_value(json).unwrap();
        assert_eq!(back, el);
    }

    #[test]
    fn rekey_rewrites_references() {
        let mut el = relation();
        el.rekey(|id| format!("x::{id}"));
        assert_eq!(el.id, "x::r1");
        assert_eq!(el.endpoints(), Some(("x::a", "x::b")));
    }

    #[test]
    fn normalized_label_trims_and_folds_case() {
        assert_eq!(normalize_label("  Vehicle "), "vehicle");
        assert_ne!(normalize_label("Vehicles"), normalize_label("vehicle"));
    }
}
