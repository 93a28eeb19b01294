//! Ontograph graph model
//!
//! The in-memory side of the editor: typed graph elements, the per-kind
//! attribute schema, layout and camera state, visibility rules and named
//! views.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                       GRAPH MODEL                          │
//! ├────────────────────────────────────────────────────────────┤
//! │   local elements ──┐                                       │
//! │                    ├──► elements + positions + viewport    │
//! │   overlay elements ┘            │                          │
//! │   (read-only)                   ▼                          │
//! │                          change journal ──► persistence    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate does I/O. Caching, remote persistence and RDF
//! exchange live in `ontograph-storage`, `ontograph-rdf` and `ontograph-sync`.

pub mod digest;
pub mod element;
pub mod error;
pub mod graph;
pub mod layout;
pub mod session;
pub mod view;
pub mod visibility;

pub use element::{
    normalize_label, AttrPatch, AttrValue, ClassAttrs, DataPropertyAttrs, ElementAttrs,
    ElementKind, ElementSpec, EquivalenceAttrs, GraphElement, NoteAttrs, Origin,
    PseudoImportAttrs, RelationAttrs, Stamp,
};
pub use error::ModelError;
pub use graph::{GraphModel, GraphSnapshot, ModelChange, Provenance, Removal};
pub use layout::{centroid, Bounds, LayoutSnapshot, NodePosition, Position, Viewport};
pub use session::EditorSession;
pub use view::NamedView;
pub use visibility::{Category, CategoryFlags, VisibilityState};
