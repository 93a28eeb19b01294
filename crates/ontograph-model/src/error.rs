use crate::element::ElementKind;

/// Errors raised at the graph model boundary.
///
/// None of these leave the model in a partially mutated state.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("element `{0}` not found")]
    NotFound(String),

    #[error("element id `{0}` already exists")]
    DuplicateId(String),

    #[error("edge `{id}` references missing or non-local node `{endpoint}`")]
    DanglingEdge { id: String, endpoint: String },

    #[error("invalid attribute `{key}` for {kind:?} element `{id}`: {reason}")]
    InvalidAttribute {
        id: String,
        kind: ElementKind,
        key: String,
        reason: String,
    },

    #[error("element `{0}` belongs to an imported overlay and is read-only")]
    ReadOnlyOverlay(String),
}
