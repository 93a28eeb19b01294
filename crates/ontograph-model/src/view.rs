use crate::layout::Position;
use crate::visibility::CategoryFlags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named, addressable snapshot of layout and visibility.
///
/// Immutable once captured except for `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedView {
    pub id: String,
    pub name: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub zoom: f64,
    pub pan: Position,
    #[serde(default)]
    pub node_positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub visibility_state: CategoryFlags,
    #[serde(default)]
    pub element_visibility: BTreeMap<String, bool>,
    #[serde(default)]
    pub collapsed_imports: BTreeSet<String>,
    #[serde(default)]
    pub visible_imports: BTreeSet<String>,
}
