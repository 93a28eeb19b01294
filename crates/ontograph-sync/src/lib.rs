//! Ontograph sync engine
//!
//! Keeps one editor session's graph in step with the local cache and the
//! remote store, and layers everything the editor shows on top of the local
//! graph.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          GRAPH ENGINE                            │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   load_graph ─► cache / remote precedence ─► GraphModel          │
//! │                                                  │               │
//! │   VisibilityController ─┐                        │               │
//! │   (categories, imports) ├─► OverlayComposer ─────┤               │
//! │                         │   (clusters, pseudo    │               │
//! │   NamedViewManager ─────┘    nodes, equivalence) │               │
//! │   (activate / restore)                           ▼               │
//! │                                       PersistenceScheduler       │
//! │                                       fast ─► LocalCache         │
//! │                                       slow ─► RemoteStore        │
//! │                                                                  │
//! │   save / export / import ─► SerializationEngine (Turtle)         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Cache precedence**: a fresh local snapshot beats the remote store
//! - **Deterministic overlays**: composing twice changes nothing
//! - **Two debounce channels**: local snapshots fast, remote layout slow
//! - **Session gate**: late results for a previous ontology are dropped

pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod overlay;
pub mod views;
pub mod visibility;

pub use config::{EngineConfig, FreshnessPolicy, OverlayGeometry};
pub use engine::{
    EngineEvent, EngineEventHandler, GraphEngine, ImportSummary, LoadSource, PersistenceStats,
};
pub use error::SyncError;
pub use layout::{ForceDirected, LayoutAlgorithm, LayoutInput, LayoutRegistry};
pub use overlay::{overlay_id, pseudo_id, CompositionReport, OverlayComposer};
pub use views::{Checkpoint, NamedViewManager, Transition, ViewState};
pub use visibility::{ImportRegistry, VisibilityController};
