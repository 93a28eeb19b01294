//! In-process remote store for tests and offline use.
//!
//! Besides holding documents it can inject failures per operation and
//! ontology, reject layout commits as stale, count calls, and yield to the
//! scheduler on every call so concurrent requests actually interleave.

use crate::remote::{RemoteGraphDocument, RemoteStore};
use crate::StorageError;
use async_trait::async_trait;
use ontograph_model::{LayoutSnapshot, NamedView};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchGraph,
    CommitGraph,
    FetchLayout,
    CommitLayout,
    FetchViews,
    CommitViews,
    PostExchange,
}

impl RemoteOp {
    fn resource(self) -> &'static str {
        match self {
            RemoteOp::FetchGraph | RemoteOp::CommitGraph => "graph",
            RemoteOp::FetchLayout | RemoteOp::CommitLayout => "layout",
            RemoteOp::FetchViews | RemoteOp::CommitViews => "views",
            RemoteOp::PostExchange => "exchange",
        }
    }

    fn is_fetch(self) -> bool {
        matches!(
            self,
            RemoteOp::FetchGraph | RemoteOp::FetchLayout | RemoteOp::FetchViews
        )
    }
}

#[derive(Default)]
struct MemoryState {
    graphs: HashMap<String, RemoteGraphDocument>,
    layouts: HashMap<String, LayoutSnapshot>,
    views: HashMap<String, Vec<NamedView>>,
    exchange: HashMap<String, Vec<String>>,
    failing: HashSet<(RemoteOp, String)>,
    stale_layout_commits: HashMap<String, usize>,
    calls: HashMap<RemoteOp, usize>,
}

#[derive(Default)]
pub struct MemoryRemoteStore {
    state: Mutex<MemoryState>,
    cooperative_yield: AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the runtime at the start of every call.
    pub fn with_cooperative_yield(self) -> Self {
        self.cooperative_yield.store(true, Ordering::SeqCst);
        self
    }

    pub fn put_graph(&self, ontology_id: &str, document: RemoteGraphDocument) {
        self.state
            .lock()
            .graphs
            .insert(ontology_id.to_string(), document);
    }

    pub fn put_layout(&self, ontology_id: &str, layout: LayoutSnapshot) {
        self.state
            .lock()
            .layouts
            .insert(ontology_id.to_string(), layout);
    }

    pub fn graph(&self, ontology_id: &str) -> Option<RemoteGraphDocument> {
        self.state.lock().graphs.get(ontology_id).cloned()
    }

    pub fn layout(&self, ontology_id: &str) -> Option<LayoutSnapshot> {
        self.state.lock().layouts.get(ontology_id).cloned()
    }

    pub fn views(&self, ontology_id: &str) -> Vec<NamedView> {
        self.state
            .lock()
            .views
            .get(ontology_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn exchange_documents(&self, ontology_id: &str) -> Vec<String> {
        self.state
            .lock()
            .exchange
            .get(ontology_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every `op` against `ontology_id` fail until [`heal`](Self::heal).
    pub fn fail(&self, op: RemoteOp, ontology_id: &str) {
        self.state
            .lock()
            .failing
            .insert((op, ontology_id.to_string()));
    }

    pub fn heal(&self, op: RemoteOp, ontology_id: &str) {
        self.state
            .lock()
            .failing
            .remove(&(op, ontology_id.to_string()));
    }

    /// Reject the next `count` layout commits for `ontology_id` as stale.
    pub fn reject_stale_layouts(&self, ontology_id: &str, count: usize) {
        self.state
            .lock()
            .stale_layout_commits
            .insert(ontology_id.to_string(), count);
    }

    pub fn calls(&self, op: RemoteOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: RemoteOp, ontology_id: &str) -> Result<(), StorageError> {
        *self.state.lock().calls.entry(op).or_default() += 1;
        if self.cooperative_yield.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        let state = self.state.lock();
        if state.failing.contains(&(op, ontology_id.to_string())) {
            let reason = "injected failure".to_string();
            let ontology = ontology_id.to_string();
            let resource = op.resource();
            return Err(if op.is_fetch() {
                StorageError::FetchFailure {
                    ontology,
                    resource,
                    reason,
                }
            } else {
                StorageError::CommitFailure {
                    ontology,
                    resource,
                    reason,
                }
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_graph(&self, ontology_id: &str) -> Result<RemoteGraphDocument, StorageError> {
        self.enter(RemoteOp::FetchGraph, ontology_id).await?;
        Ok(self.graph(ontology_id).unwrap_or_default())
    }

    async fn commit_graph(
        &self,
        ontology_id: &str,
        document: &RemoteGraphDocument,
    ) -> Result<(), StorageError> {
        self.enter(RemoteOp::CommitGraph, ontology_id).await?;
        self.put_graph(ontology_id, document.clone());
        Ok(())
    }

    async fn fetch_layout(&self, ontology_id: &str) -> Result<LayoutSnapshot, StorageError> {
        self.enter(RemoteOp::FetchLayout, ontology_id).await?;
        Ok(self.layout(ontology_id).unwrap_or_default())
    }

    async fn commit_layout(
        &self,
        ontology_id: &str,
        layout: &LayoutSnapshot,
    ) -> Result<(), StorageError> {
        self.enter(RemoteOp::CommitLayout, ontology_id).await?;
        {
            let mut state = self.state.lock();
            if let Some(remaining) = state.stale_layout_commits.get_mut(ontology_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StorageError::StaleWrite {
                        ontology: ontology_id.to_string(),
                        resource: "layout",
                    });
                }
            }
        }
        self.put_layout(ontology_id, layout.clone());
        Ok(())
    }

    async fn fetch_named_views(&self, ontology_id: &str) -> Result<Vec<NamedView>, StorageError> {
        self.enter(RemoteOp::FetchViews, ontology_id).await?;
        Ok(self.views(ontology_id))
    }

    async fn commit_named_views(
        &self,
        ontology_id: &str,
        views: &[NamedView],
    ) -> Result<(), StorageError> {
        self.enter(RemoteOp::CommitViews, ontology_id).await?;
        self.state
            .lock()
            .views
            .insert(ontology_id.to_string(), views.to_vec());
        Ok(())
    }

    async fn post_exchange_document(
        &self,
        ontology_id: &str,
        turtle: &str,
    ) -> Result<(), StorageError> {
        self.enter(RemoteOp::PostExchange, ontology_id).await?;
        self.state
            .lock()
            .exchange
            .entry(ontology_id.to_string())
            .or_default()
            .push(turtle.to_string());
        Ok(())
    }
}
