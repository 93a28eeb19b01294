//! Visibility state: five category gates plus sparse per-element overrides.

use crate::element::{ElementKind, GraphElement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Classes,
    DataProperties,
    Notes,
    Edges,
    Imported,
}

impl Category {
    /// Overlay elements (and pseudo-import nodes) are gated by `Imported`
    /// regardless of their concrete kind.
    pub fn of(element: &GraphElement) -> Category {
        if element.is_overlay() {
            return Category::Imported;
        }
        Category::for_kind(element.kind())
    }

    pub fn for_kind(kind: ElementKind) -> Category {
        match kind {
            ElementKind::Class => Category::Classes,
            ElementKind::DataProperty => Category::DataProperties,
            ElementKind::Note => Category::Notes,
            ElementKind::PseudoImport => Category::Imported,
            ElementKind::Relation | ElementKind::Equivalence => Category::Edges,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryFlags {
    pub classes: bool,
    pub data_properties: bool,
    pub notes: bool,
    pub edges: bool,
    pub imported: bool,
}

impl Default for CategoryFlags {
    fn default() -> Self {
        Self {
            classes: true,
            data_properties: true,
            notes: true,
            edges: true,
            imported: true,
        }
    }
}

impl CategoryFlags {
    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Classes => self.classes,
            Category::DataProperties => self.data_properties,
            Category::Notes => self.notes,
            Category::Edges => self.edges,
            Category::Imported => self.imported,
        }
    }

    pub fn set(&mut self, category: Category, visible: bool) {
        let slot = match category {
            Category::Classes => &mut self.classes,
            Category::DataProperties => &mut self.data_properties,
            Category::Notes => &mut self.notes,
            Category::Edges => &mut self.edges,
            Category::Imported => &mut self.imported,
        };
        *slot = visible;
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisibilityState {
    pub categories: CategoryFlags,
    pub overrides: BTreeMap<String, bool>,
}

impl VisibilityState {
    /// `category(kind) AND (override(id) ?? true)`.
    ///
    /// A hidden category hides everything in it, whatever the overrides say.
    pub fn effective(&self, element: &GraphElement) -> bool {
        self.categories.get(Category::of(element))
            && self.overrides.get(&element.id).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{ClassAttrs, ElementAttrs, Origin};

    fn class(id: &str) -> GraphElement {
        GraphElement::new(id, id, ElementAttrs::Class(ClassAttrs::default()))
    }

    #[test]
    fn category_gate_dominates_override() {
        let mut state = VisibilityState::default();
        state.categories.set(Category::Classes, false);
        state.overrides.insert("A".into(), true);
        assert!(!state.effective(&class("A")));
    }

    #[test]
    fn override_hides_inside_visible_category() {
        let mut state = VisibilityState::default();
        state.overrides.insert("A".into(), false);
        assert!(!state.effective(&class("A")));
        assert!(state.effective(&class("B")));
    }

    #[test]
    fn overlay_classes_use_imported_flag() {
        let mut state = VisibilityState::default();
        state.categories.set(Category::Imported, false);
        let mut overlay = class("O");
        overlay.origin = Origin::overlay("foaf");
        assert!(!state.effective(&overlay));
        assert!(state.effective(&class("L")));
    }
}
