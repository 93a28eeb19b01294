use ontograph_model::ModelError;
use ontograph_rdf::RdfError;
use ontograph_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Rdf(#[from] RdfError),

    #[error("composition of import `{0}` is already in flight")]
    ConcurrentComposition(String),

    #[error("unknown named view `{0}`")]
    UnknownView(String),

    #[error("unknown layout algorithm `{0}`")]
    UnknownLayout(String),

    #[error("layout `{name}` failed: {reason}")]
    Layout { name: String, reason: String },

    /// The session moved to another ontology while the operation was awaiting.
    #[error("result for ontology `{ontology}` discarded")]
    Discarded { ontology: String },
}

