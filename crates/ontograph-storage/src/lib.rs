//! Ontograph storage layer
//!
//! Two tiers sit behind the editor's in-memory graph:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        STORAGE TIERS                             │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │   GraphModel ──► PersistenceScheduler ──┬──► LocalCache          │
//! │                   (fast / slow / suspend)│    (per project,      │
//! │                                          │     JSON per key)     │
//! │                                          │                       │
//! │                                          └──► RemoteStore        │
//! │                                               (layout, graph,    │
//! │                                                views, exchange)  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Typed keys**: every entry is addressed by `(project, ontology, resource)`
//! - **Atomic cache writes**: lock, write to a temp file, rename
//! - **Pluggable remote**: in-memory store for tests, HTTP behind the `http` feature
//! - **Deadline-based debouncing**: the scheduler never sleeps or spawns

pub mod cache;
#[cfg(feature = "http")]
pub mod http;
pub mod key;
pub mod memory;
pub mod remote;
pub mod scheduler;

#[cfg(test)]
mod tests;

pub use cache::LocalCache;
#[cfg(feature = "http")]
pub use http::HttpRemoteStore;
pub use key::{CacheKey, Resource};
pub use memory::{MemoryRemoteStore, RemoteOp};
pub use remote::{
    RemoteClass, RemoteDatatypeProperty, RemoteGraphDocument, RemoteNote, RemoteObjectProperty,
    RemoteStore,
};
pub use scheduler::{Flush, PersistenceScheduler};

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed cache or remote JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("fetching {resource} for `{ontology}` failed: {reason}")]
    FetchFailure {
        ontology: String,
        resource: &'static str,
        reason: String,
    },

    #[error("committing {resource} for `{ontology}` failed: {reason}")]
    CommitFailure {
        ontology: String,
        resource: &'static str,
        reason: String,
    },

    #[error("remote rejected a stale {resource} write for `{ontology}`")]
    StaleWrite {
        ontology: String,
        resource: &'static str,
    },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Remote failures are retried on the next debounce tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::FetchFailure { .. }
                | StorageError::CommitFailure { .. }
                | StorageError::StaleWrite { .. }
        )
    }
}
