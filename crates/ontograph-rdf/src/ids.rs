//! Stable external identifiers.
//!
//! The first time an element is serialized it gets a readable identifier
//! derived from its label (`Sensor`, `mountedOn`, `mountedOn_2`, ...). The
//! registry is persisted per ontology, so later saves reuse the same IRI even
//! after the element is renamed.

use ontograph_model::digest::sanitize_id_component;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalIds {
    by_element: BTreeMap<String, String>,
}

impl ExternalIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, element_id: &str) -> Option<&str> {
        self.by_element.get(element_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_element.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_element.is_empty()
    }

    /// Element id for an external id, if one was assigned.
    pub fn element_for(&self, external_id: &str) -> Option<&str> {
        self.by_element
            .iter()
            .find(|(_, ext)| ext.as_str() == external_id)
            .map(|(id, _)| id.as_str())
    }

    /// Record a known mapping (used when importing a document).
    pub fn insert(&mut self, element_id: &str, external_id: &str) {
        self.by_element
            .insert(element_id.to_string(), external_id.to_string());
    }

    /// Existing id, or a fresh one derived from `label`.
    pub fn assign(&mut self, element_id: &str, label: &str) -> String {
        if let Some(existing) = self.by_element.get(element_id) {
            return existing.clone();
        }
        let taken: BTreeSet<&str> = self.by_element.values().map(String::as_str).collect();
        let base = external_base(label);
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(candidate.as_str()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.by_element
            .insert(element_id.to_string(), candidate.clone());
        candidate
    }
}

fn external_base(label: &str) -> String {
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return "element".to_string();
    }
    let sanitized = sanitize_id_component(trimmed);
    if sanitized.starts_with('-') {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_is_sticky_and_collision_suffixed() {
        let mut ids = ExternalIds::new();
        assert_eq!(ids.assign("e1", "mountedOn"), "mountedOn");
        assert_eq!(ids.assign("e2", "mountedOn"), "mountedOn_2");
        assert_eq!(ids.assign("e1", "renamed"), "mountedOn");
        assert_eq!(ids.element_for("mountedOn_2"), Some("e2"));
    }

    #[test]
    fn labels_are_sanitized() {
        let mut ids = ExternalIds::new();
        assert_eq!(ids.assign("a", " Air Vehicle "), "Air_Vehicle");
        assert_eq!(ids.assign("b", "  "), "element");
    }
}
