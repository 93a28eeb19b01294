//! Layout data: node positions, camera, and the layout snapshot exchanged with
//! the cache and the remote store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Camera state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub zoom: f64,
    pub pan: Position,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Position::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// `{nodes:[{id,x,y}], zoom, pan}`, the wire shape of a layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodePosition>,
    #[serde(default = "default_zoom")]
    pub zoom: f64,
    #[serde(default)]
    pub pan: Position,
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for LayoutSnapshot {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            zoom: default_zoom(),
            pan: Position::default(),
        }
    }
}

impl LayoutSnapshot {
    pub fn from_parts(positions: &BTreeMap<String, Position>, viewport: Viewport) -> Self {
        Self {
            nodes: positions
                .iter()
                .map(|(id, p)| NodePosition {
                    id: id.clone(),
                    x: p.x,
                    y: p.y,
                })
                .collect(),
            zoom: viewport.zoom,
            pan: viewport.pan,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn positions(&self) -> BTreeMap<String, Position> {
        self.nodes
            .iter()
            .map(|n| (n.id.clone(), Position::new(n.x, n.y)))
            .collect()
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            zoom: self.zoom,
            pan: self.pan,
        }
    }
}

/// Axis-aligned bounding box over a set of positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Position,
    pub max: Position,
}

impl Bounds {
    pub fn around<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Self> {
        let mut iter = positions.into_iter();
        let first = *iter.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in iter {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }
}

/// Arithmetic mean of a set of positions.
pub fn centroid<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Option<Position> {
    let mut count = 0usize;
    let mut sum = Position::default();
    for p in positions {
        sum.x += p.x;
        sum.y += p.y;
        count += 1;
    }
    (count > 0).then(|| Position::new(sum.x / count as f64, sum.y / count as f64))
}
