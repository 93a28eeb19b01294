//! The graph engine: one editor session's model plus everything that keeps it
//! in sync with the cache and the remote store.
//!
//! ```text
//!   UI ──► mutations ──► GraphModel ──► change journal
//!                            ▲                │ tick()
//!                            │                ▼
//!   load_graph ◄── cache ◄───┼──── PersistenceScheduler
//!        │         (fresh?)  │          │fast        │slow
//!        ▼                   │          ▼            ▼
//!   RemoteStore ─────────────┘      LocalCache   RemoteStore
//! ```
//!
//! The engine never spawns or sleeps: the host calls [`GraphEngine::tick`]
//! (or [`GraphEngine::tick_at`] in tests) and due flushes run inline.
//! Locks are never held across an `.await`; results that arrive after the
//! session moved to another ontology are discarded.

use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::layout::{ForceDirected, LayoutAlgorithm, LayoutInput, LayoutRegistry};
use crate::overlay::{CompositionReport, OverlayComposer};
use crate::views::{Checkpoint, NamedViewManager, Transition, ViewState};
use crate::visibility::{ImportRegistry, VisibilityController};
use chrono::Utc;
use ontograph_model::{
    AttrPatch, Category, EditorSession, ElementAttrs, ElementSpec, GraphElement, GraphModel, GraphSnapshot,
    LayoutSnapshot, NamedView, Position, Provenance, Removal, Viewport, VisibilityState,
};
use ontograph_rdf::{ExchangeDocument, ExternalIds, SerializationEngine, SerializationSkip};
use ontograph_storage::{
    CacheKey, Flush, LocalCache, PersistenceScheduler, RemoteGraphDocument, RemoteStore, Resource,
    StorageError,
};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Events
// ============================================================================

/// Where `load_graph` got its content from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    /// A fresh local snapshot.
    LocalCache,
    Remote,
    /// Remote unreachable; an older cached snapshot was used.
    StaleCache,
    /// Remote unreachable and nothing cached.
    Empty,
    /// An exchange document handed to `import_document`.
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    GraphLoaded {
        ontology_id: String,
        source: LoadSource,
        elements: usize,
    },
    OverlaysRefreshed {
        composed: Vec<String>,
        failed: Vec<String>,
    },
    VisibilityApplied,
    PositionsApplied {
        count: usize,
    },
    CameraAnimated {
        zoom: f64,
        pan: Position,
    },
    ViewActivated {
        view_id: String,
    },
    ViewDeactivated,
    LocalFlushed,
    RemoteLayoutCommitted,
    RemoteWriteFailed {
        resource: String,
        reason: String,
    },
    LayoutStarted {
        name: String,
    },
    LayoutFinished {
        name: String,
        moved: usize,
    },
    Saved {
        ontology_id: String,
        triples: usize,
    },
}

pub type EngineEventHandler = Box<dyn Fn(EngineEvent) + Send + Sync>;

/// Counters for what persistence actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStats {
    /// Fast flushes (graph + layout + overlay positions to the cache).
    pub local_writes: u64,
    pub remote_layout_writes: u64,
    pub remote_failures: u64,
    pub stale_writes: u64,
    /// Async results dropped because the session moved on.
    pub discarded: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSummary {
    pub elements: usize,
    pub imports: Vec<String>,
    pub skipped: Vec<SerializationSkip>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct GraphEngine {
    config: EngineConfig,
    session: RwLock<EditorSession>,
    /// Bumped whenever the session switches ontology (or reloads).
    generation: AtomicU64,
    model: Arc<RwLock<GraphModel>>,
    cache: Arc<LocalCache>,
    remote: Arc<dyn RemoteStore>,
    scheduler: Mutex<PersistenceScheduler>,
    composer: OverlayComposer,
    visibility: RwLock<VisibilityController>,
    views: RwLock<NamedViewManager>,
    serializer: SerializationEngine,
    layouts: RwLock<LayoutRegistry>,
    stats: Mutex<PersistenceStats>,
    event_handlers: Vec<EngineEventHandler>,
}

impl GraphEngine {
    pub fn new(
        session: EditorSession,
        config: EngineConfig,
        cache: Arc<LocalCache>,
        remote: Arc<dyn RemoteStore>,
    ) -> Self {
        let scheduler = PersistenceScheduler::new(config.fast_debounce(), config.slow_debounce());
        let composer = OverlayComposer::new(config.overlay.clone(), cache.clone(), remote.clone());
        let serializer = SerializationEngine::new(&config.base_iri, &config.equivalence_predicate);
        Self {
            model: Arc::new(RwLock::new(GraphModel::new(session.clone()))),
            visibility: RwLock::new(VisibilityController::load(&session, cache.clone())),
            views: RwLock::new(NamedViewManager::load(&session, cache.clone())),
            session: RwLock::new(session),
            generation: AtomicU64::new(0),
            scheduler: Mutex::new(scheduler),
            composer,
            serializer,
            layouts: RwLock::new(LayoutRegistry::default()),
            stats: Mutex::new(PersistenceStats::default()),
            config,
            cache,
            remote,
            event_handlers: Vec::new(),
        }
    }

    /// Register an event handler.
    pub fn on_event(&mut self, handler: EngineEventHandler) {
        self.event_handlers.push(handler);
    }

    fn emit(&self, event: EngineEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> EditorSession {
        self.session.read().clone()
    }

    /// Shared handle to the model, for reads by the UI.
    pub fn model(&self) -> Arc<RwLock<GraphModel>> {
        self.model.clone()
    }

    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    pub fn stats(&self) -> PersistenceStats {
        self.stats.lock().clone()
    }

    pub fn register_layout(&self, algorithm: Arc<dyn LayoutAlgorithm>) {
        self.layouts.write().register(algorithm);
    }

    // ------------------------------------------------------------------------
    // Session gate and cache helpers
    // ------------------------------------------------------------------------

    fn ticket(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn ensure_current(&self, ticket: u64, session: &EditorSession) -> Result<(), SyncError> {
        if self.generation.load(Ordering::SeqCst) == ticket {
            return Ok(());
        }
        self.stats.lock().discarded += 1;
        tracing::debug!(ontology = %session.ontology_id, "discarding result for a superseded session");
        Err(SyncError::Discarded {
            ontology: session.ontology_id.clone(),
        })
    }

    fn read_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        match self.cache.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn write_cache<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if let Err(e) = self.cache.put(key, value) {
            tracing::warn!(key = %key, error = %e, "cache write failed");
        }
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Load an ontology into the session.
    ///
    /// A local snapshot younger than the freshness window wins. Otherwise the
    /// remote store is asked; if that fails, any cached snapshot is used, and
    /// failing that the graph starts empty.
    pub async fn load_graph(&self, ontology_id: &str) -> Result<LoadSource, SyncError> {
        let session = {
            let mut current = self.session.write();
            if current.ontology_id != ontology_id {
                *current = current.with_ontology(ontology_id);
            }
            current.clone()
        };
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.visibility.write() = VisibilityController::load(&session, self.cache.clone());
        *self.views.write() = NamedViewManager::load(&session, self.cache.clone());
        *self.scheduler.lock() =
            PersistenceScheduler::new(self.config.fast_debounce(), self.config.slow_debounce());

        let graph_key = CacheKey::new(&session, Resource::Graph);
        let layout_key = CacheKey::new(&session, Resource::Layout);
        let cached_graph: Option<GraphSnapshot> = self.read_cache(&graph_key);
        let cached_layout: Option<LayoutSnapshot> = self.read_cache(&layout_key);

        let (snapshot, layout, source) = match cached_graph {
            Some(graph) if self.config.freshness.is_fresh(&graph, Utc::now()) => {
                (graph, cached_layout.unwrap_or_default(), LoadSource::LocalCache)
            }
            cached => match self.fetch_remote_graph(&session).await {
                Ok((graph, layout)) => (graph, layout, LoadSource::Remote),
                Err(e) => {
                    tracing::warn!(ontology = %ontology_id, error = %e, "remote load failed, falling back to cache");
                    match cached {
                        Some(graph) => (graph, cached_layout.unwrap_or_default(), LoadSource::StaleCache),
                        None => (
                            GraphSnapshot::empty(Provenance::Local),
                            LayoutSnapshot::default(),
                            LoadSource::Empty,
                        ),
                    }
                }
            },
        };
        self.ensure_current(ticket, &session)?;

        let known = layout.positions();
        let needed_layout = snapshot.nodes.iter().any(|n| !known.contains_key(&n.id));
        let placed = self.place_nodes(&snapshot, &known).await;
        let layout = LayoutSnapshot::from_parts(&placed, layout.viewport());
        self.ensure_current(ticket, &session)?;

        if source == LoadSource::Remote {
            self.write_cache(&graph_key, &snapshot);
            self.write_cache(&layout_key, &layout);
        }
        let elements = {
            let mut model = self.model.write();
            *model = GraphModel::new(session.clone());
            model.restore(&snapshot, &layout);
            model.len()
        };
        if needed_layout {
            let now = Instant::now();
            let mut scheduler = self.scheduler.lock();
            scheduler.schedule_fast(now);
            scheduler.schedule_slow(now);
        }
        tracing::info!(ontology = %ontology_id, ?source, elements, "graph loaded");
        self.emit(EngineEvent::GraphLoaded {
            ontology_id: ontology_id.to_string(),
            source,
            elements,
        });

        if self.views.read().list().is_empty() {
            match self.remote.fetch_named_views(ontology_id).await {
                Ok(views) if !views.is_empty() => {
                    self.ensure_current(ticket, &session)?;
                    self.views.write().replace(views);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(ontology = %ontology_id, error = %e, "could not fetch named views"),
            }
        }

        if !self.visibility.read().imports().visible().is_empty() {
            self.refresh_overlays().await?;
        }
        Ok(source)
    }

    async fn fetch_remote_graph(
        &self,
        session: &EditorSession,
    ) -> Result<(GraphSnapshot, LayoutSnapshot), SyncError> {
        let document = self.remote.fetch_graph(&session.ontology_id).await?;
        let layout = match self.remote.fetch_layout(&session.ontology_id).await {
            Ok(layout) => layout,
            Err(e) => {
                tracing::warn!(ontology = %session.ontology_id, error = %e, "no remote layout, using default layout");
                LayoutSnapshot::default()
            }
        };
        Ok((document.into_snapshot(Provenance::Remote, Utc::now()), layout))
    }

    /// Positions for every node of `snapshot`: known ones are kept, the rest
    /// come from the default layout.
    async fn place_nodes(
        &self,
        snapshot: &GraphSnapshot,
        known: &BTreeMap<String, Position>,
    ) -> BTreeMap<String, Position> {
        let mut positions: BTreeMap<String, Position> = snapshot
            .nodes
            .iter()
            .filter_map(|n| known.get(&n.id).map(|p| (n.id.clone(), *p)))
            .collect();
        if positions.len() == snapshot.nodes.len() {
            return positions;
        }

        let input = LayoutInput {
            nodes: snapshot.nodes.iter().map(|n| n.id.clone()).collect(),
            edges: snapshot
                .edges
                .iter()
                .filter_map(|e| e.endpoints())
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
            positions: positions.clone(),
        };
        let name = self.config.default_layout.clone();
        let algorithm = self.layouts.read().resolve(&name);
        let computed = match algorithm {
            Some(algorithm) => algorithm.run(input.clone()).await,
            None => Err(anyhow::anyhow!("unknown layout `{name}`")),
        };
        let computed = computed.unwrap_or_else(|e| {
            tracing::warn!(layout = %name, error = %e, "default layout failed, using force-directed");
            ForceDirected::default().compute(&input)
        });
        for (id, position) in computed {
            positions.entry(id).or_insert(position);
        }
        positions
    }

    // ------------------------------------------------------------------------
    // Overlays
    // ------------------------------------------------------------------------

    /// Bring overlay elements in line with the visible imports.
    ///
    /// Imports that are no longer visible are purged. An import whose
    /// snapshot cannot be fetched ends up with no overlay elements; the
    /// others are unaffected. A request that finds its import already being
    /// composed is coalesced: the running composition makes one more pass.
    pub async fn refresh_overlays(&self) -> Result<CompositionReport, SyncError> {
        let session = self.session();
        let ticket = self.ticket();
        let visible = self.visibility.read().imports().visible_in_order();
        let mut report = CompositionReport::default();

        {
            let mut model = self.model.write();
            let present: BTreeSet<String> = model
                .elements()
                .filter_map(|e| e.import_source())
                .map(str::to_string)
                .collect();
            for import_id in present.into_iter().filter(|i| !visible.contains(i)) {
                report.removed += self.composer.purge(&mut model, &session, &import_id);
                report.purged.push(import_id);
            }
        }

        for import_id in &visible {
            let mut guard = match self.composer.begin(&session, import_id) {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::debug!(import = %import_id, error = %e, "coalescing overlay composition");
                    report.coalesced.push(import_id.clone());
                    continue;
                }
            };
            loop {
                let fetched = self.composer.import_elements(&session, import_id).await;
                self.ensure_current(ticket, &session)?;
                self.settle_import(&session, import_id, fetched, &mut report);
                if !guard.finish() {
                    break;
                }
                tracing::debug!(import = %import_id, "import changed during composition, composing again");
            }
        }

        self.emit(EngineEvent::OverlaysRefreshed {
            composed: report.composed.clone(),
            failed: report.failed.clone(),
        });
        Ok(report)
    }

    /// Apply a fetched import against the registry as it is now, not as it
    /// was when the fetch started.
    fn settle_import(
        &self,
        session: &EditorSession,
        import_id: &str,
        fetched: Result<Vec<GraphElement>, SyncError>,
        report: &mut CompositionReport,
    ) {
        let mut model = self.model.write();
        let (slot, collapsed) = {
            let visibility = self.visibility.read();
            let imports = visibility.imports();
            (
                imports
                    .visible_in_order()
                    .iter()
                    .position(|i| i == import_id),
                imports.collapsed().contains(import_id),
            )
        };
        let note = |list: &mut Vec<String>| {
            if !list.iter().any(|i| i == import_id) {
                list.push(import_id.to_string());
            }
        };
        match (slot, fetched) {
            (None, _) => {
                report.removed += self.composer.purge(&mut model, session, import_id);
                note(&mut report.purged);
            }
            (Some(slot), Ok(source)) => {
                let (inserted, removed) =
                    self.composer
                        .compose(&mut model, session, import_id, &source, collapsed, slot);
                report.inserted += inserted;
                report.removed += removed;
                note(&mut report.composed);
            }
            (Some(_), Err(e)) => {
                tracing::warn!(import = %import_id, error = %e, "import unavailable, showing nothing for it");
                report.removed += self.composer.purge(&mut model, session, import_id);
                note(&mut report.failed);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Local mutations
    // ------------------------------------------------------------------------

    pub fn add_element(&self, spec: ElementSpec) -> Result<String, SyncError> {
        Ok(self.model.write().add_element(spec)?)
    }

    pub fn remove_elements<S: AsRef<str>>(&self, ids: &[S]) -> Removal {
        self.model.write().remove_elements(ids)
    }

    pub fn update_attrs(&self, id: &str, patch: &AttrPatch) -> Result<ElementAttrs, SyncError> {
        Ok(self.model.write().update_attrs(id, patch)?)
    }

    pub fn move_node(&self, id: &str, position: Position) -> Result<(), SyncError> {
        Ok(self.model.write().set_position(id, position)?)
    }

    pub fn set_viewport(&self, viewport: Viewport) {
        self.model.write().set_viewport(viewport);
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    fn note_changes(&self, now: Instant) {
        let changes = self.model.write().drain_changes();
        if changes.is_empty() {
            return;
        }
        let mut scheduler = self.scheduler.lock();
        for change in &changes {
            scheduler.note(change, now);
        }
    }

    /// Feed journaled changes to the scheduler and run the flushes that are due.
    pub async fn tick(&self) -> Vec<Flush> {
        self.tick_at(Instant::now()).await
    }

    pub async fn tick_at(&self, now: Instant) -> Vec<Flush> {
        self.note_changes(now);
        let due = self.scheduler.lock().poll(now);
        for flush in &due {
            self.perform(*flush, now).await;
        }
        due
    }

    /// Earliest pending flush deadline, for the host's timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.lock().next_deadline()
    }

    pub fn is_persistence_suspended(&self) -> bool {
        self.scheduler.lock().is_suspended()
    }

    pub fn suspend_persistence(&self) {
        self.note_changes(Instant::now());
        self.scheduler.lock().suspend();
    }

    pub async fn resume_persistence(&self) -> Vec<Flush> {
        self.resume_persistence_at(Instant::now()).await
    }

    /// Changes made while suspended are noted first so dropped layout writes
    /// re-arm the slow channel; the immediate fast flush runs inline.
    pub async fn resume_persistence_at(&self, now: Instant) -> Vec<Flush> {
        self.note_changes(now);
        let flushes = self.scheduler.lock().resume(now);
        for flush in &flushes {
            self.perform(*flush, now).await;
        }
        flushes
    }

    async fn perform(&self, flush: Flush, now: Instant) {
        match flush {
            Flush::Fast => self.flush_local(),
            Flush::Slow => self.flush_remote_layout(now).await,
        }
    }

    /// Snapshot graph, layout and overlay positions to the local cache.
    pub fn flush_local(&self) {
        let session = self.session();
        {
            let model = self.model.read();
            self.write_cache(
                &CacheKey::new(&session, Resource::Graph),
                &model.snapshot(Provenance::Local),
            );
            self.write_cache(
                &CacheKey::new(&session, Resource::Layout),
                &model.layout_snapshot(true),
            );
            let imports: BTreeSet<&str> = model.elements().filter_map(|e| e.import_source()).collect();
            for import_id in imports {
                self.composer.remember_positions(&model, &session, import_id);
            }
        }
        self.stats.lock().local_writes += 1;
        tracing::trace!(ontology = %session.ontology_id, "local flush");
        self.emit(EngineEvent::LocalFlushed);
    }

    async fn flush_remote_layout(&self, now: Instant) {
        let session = self.session();
        let ticket = self.ticket();
        let layout = self.model.read().layout_snapshot(true);
        let result = self.remote.commit_layout(&session.ontology_id, &layout).await;
        if self.ensure_current(ticket, &session).is_err() {
            return;
        }
        match result {
            Ok(()) => {
                self.stats.lock().remote_layout_writes += 1;
                self.emit(EngineEvent::RemoteLayoutCommitted);
            }
            Err(e) => {
                {
                    let mut stats = self.stats.lock();
                    match e {
                        StorageError::StaleWrite { .. } => stats.stale_writes += 1,
                        _ => stats.remote_failures += 1,
                    }
                }
                tracing::warn!(ontology = %session.ontology_id, error = %e, "layout commit failed, retrying after debounce");
                self.scheduler.lock().retry_slow(now);
                self.emit(EngineEvent::RemoteWriteFailed {
                    resource: "layout".to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------------

    /// Run a layout algorithm with persistence suspended; the result is
    /// persisted once, on resume.
    pub async fn run_layout(&self, name: &str) -> Result<usize, SyncError> {
        let algorithm = self
            .layouts
            .read()
            .resolve(name)
            .ok_or_else(|| SyncError::UnknownLayout(name.to_string()))?;
        let session = self.session();
        let ticket = self.ticket();
        let input = LayoutInput::from_model(&self.model.read());

        self.suspend_persistence();
        self.emit(EngineEvent::LayoutStarted {
            name: name.to_string(),
        });
        let outcome = match algorithm.run(input).await {
            Ok(positions) => self.ensure_current(ticket, &session).map(|()| {
                let moved = self.model.write().apply_positions(&positions);
                self.emit(EngineEvent::PositionsApplied { count: moved });
                moved
            }),
            Err(e) => Err(SyncError::Layout {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        };
        self.resume_persistence_at(Instant::now()).await;

        self.emit(EngineEvent::LayoutFinished {
            name: name.to_string(),
            moved: *outcome.as_ref().unwrap_or(&0),
        });
        outcome
    }

    pub fn layout_names(&self) -> Vec<String> {
        self.layouts.read().names()
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    fn build_exchange(&self, session: &EditorSession, model: &GraphModel) -> ExchangeDocument {
        let key = CacheKey::new(session, Resource::ExternalIds);
        let mut ids: ExternalIds = self.read_cache(&key).unwrap_or_default();
        let imports = self.visibility.read().imports().registered().to_vec();
        let document =
            self.serializer
                .serialize(&session.ontology_id, model.local_elements(), &imports, &mut ids);
        self.write_cache(&key, &ids);
        document
    }

    /// The local graph as Turtle. Nothing is sent anywhere.
    pub fn export_document(&self) -> String {
        let session = self.session();
        let model = self.model.read();
        self.build_exchange(&session, &model).to_turtle()
    }

    /// Replace the local graph with the content of a Turtle document.
    ///
    /// Known node positions are kept; new nodes are placed by the default
    /// layout. Imports declared by the document are registered.
    pub async fn import_document(&self, turtle: &str) -> Result<ImportSummary, SyncError> {
        let parsed = self.serializer.deserialize(turtle)?;
        let session = self.session();
        let ticket = self.ticket();

        let (known, viewport) = {
            let model = self.model.read();
            (model.positions().clone(), model.viewport())
        };
        let positions = self.place_nodes(&parsed.snapshot, &known).await;
        self.ensure_current(ticket, &session)?;

        let layout = LayoutSnapshot::from_parts(&positions, viewport);
        let elements = {
            let mut model = self.model.write();
            model.restore(&parsed.snapshot, &layout);
            model.len()
        };
        {
            let now = Instant::now();
            let mut scheduler = self.scheduler.lock();
            scheduler.schedule_fast(now);
            scheduler.schedule_slow(now);
        }
        self.write_cache(
            &CacheKey::new(&session, Resource::ExternalIds),
            &parsed.external_ids,
        );
        {
            let mut visibility = self.visibility.write();
            for import_id in &parsed.imports {
                visibility.register_import(import_id);
            }
        }
        for skip in &parsed.skipped {
            tracing::info!(%skip, "document content not imported");
        }
        self.emit(EngineEvent::GraphLoaded {
            ontology_id: session.ontology_id.clone(),
            source: LoadSource::Document,
            elements,
        });

        if !self.visibility.read().imports().visible().is_empty() {
            self.refresh_overlays().await?;
        }
        Ok(ImportSummary {
            elements,
            imports: parsed.imports,
            skipped: parsed.skipped,
        })
    }

    /// Explicit save: commit the graph, the layout and the exchange document.
    ///
    /// Returns the Turtle that was posted.
    pub async fn save(&self) -> Result<String, SyncError> {
        let session = self.session();
        let ticket = self.ticket();
        let ontology_id = session.ontology_id.clone();
        let (document, exchange, layout) = {
            let model = self.model.read();
            (
                RemoteGraphDocument::from_elements(model.local_elements()),
                self.build_exchange(&session, &model),
                model.layout_snapshot(true),
            )
        };

        if let Err(e) = self.remote.commit_graph(&ontology_id, &document).await {
            self.stats.lock().remote_failures += 1;
            return Err(e.into());
        }
        self.ensure_current(ticket, &session)?;
        if self.config.freshness.invalidate_on_commit {
            let snapshot = self.model.read().snapshot(Provenance::Remote);
            self.write_cache(&CacheKey::new(&session, Resource::Graph), &snapshot);
        }

        match self.remote.commit_layout(&ontology_id, &layout).await {
            Ok(()) => self.stats.lock().remote_layout_writes += 1,
            Err(e) => {
                tracing::warn!(ontology = %ontology_id, error = %e, "layout commit during save failed");
                self.stats.lock().remote_failures += 1;
                self.scheduler.lock().retry_slow(Instant::now());
            }
        }

        let turtle = exchange.to_turtle();
        self.remote.post_exchange_document(&ontology_id, &turtle).await?;
        tracing::info!(ontology = %ontology_id, triples = exchange.triples.len(), "saved");
        self.emit(EngineEvent::Saved {
            ontology_id,
            triples: exchange.triples.len(),
        });
        Ok(turtle)
    }

    // ------------------------------------------------------------------------
    // Visibility and imports
    // ------------------------------------------------------------------------

    /// Effective visibility of every element in the model.
    pub fn get_visibility(&self) -> BTreeMap<String, bool> {
        let model = self.model.read();
        let visibility = self.visibility.read();
        model
            .elements()
            .map(|e| (e.id.clone(), visibility.is_visible(e)))
            .collect()
    }

    pub fn visibility_state(&self) -> VisibilityState {
        self.visibility.read().state().clone()
    }

    pub fn imports(&self) -> ImportRegistry {
        self.visibility.read().imports().clone()
    }

    pub fn set_category_visibility(&self, category: Category, visible: bool) {
        self.visibility.write().set_category(category, visible);
        self.emit(EngineEvent::VisibilityApplied);
    }

    pub fn set_element_visibility(&self, element_id: &str, visible: bool) {
        self.visibility.write().set_element(element_id, visible);
        self.emit(EngineEvent::VisibilityApplied);
    }

    pub fn clear_element_visibility(&self, element_id: &str) -> bool {
        self.visibility.write().clear_element(element_id)
    }

    pub fn register_import(&self, import_id: &str) -> bool {
        self.visibility.write().register_import(import_id)
    }

    pub async fn unregister_import(&self, import_id: &str) -> Result<CompositionReport, SyncError> {
        self.visibility.write().unregister_import(import_id);
        self.refresh_overlays().await
    }

    pub async fn set_import_visible(
        &self,
        import_id: &str,
        visible: bool,
    ) -> Result<CompositionReport, SyncError> {
        self.visibility.write().set_import_visible(import_id, visible);
        self.refresh_overlays().await
    }

    pub async fn set_import_collapsed(
        &self,
        import_id: &str,
        collapsed: bool,
    ) -> Result<CompositionReport, SyncError> {
        self.visibility
            .write()
            .set_import_collapsed(import_id, collapsed);
        self.refresh_overlays().await
    }

    // ------------------------------------------------------------------------
    // Named views
    // ------------------------------------------------------------------------

    fn checkpoint(&self) -> Checkpoint {
        let model = self.model.read();
        let visibility = self.visibility.read();
        Checkpoint {
            positions: model.positions().clone(),
            viewport: model.viewport(),
            visibility: visibility.state().clone(),
            visible_imports: visibility.imports().visible().clone(),
            collapsed_imports: visibility.imports().collapsed().clone(),
        }
    }

    /// Visibility, then overlays, then positions, then camera.
    async fn apply_checkpoint(&self, target: &Checkpoint) -> Result<(), SyncError> {
        self.visibility.write().apply(
            target.visibility.clone(),
            target.visible_imports.clone(),
            target.collapsed_imports.clone(),
        );
        self.emit(EngineEvent::VisibilityApplied);

        self.refresh_overlays().await?;

        let count = self.model.write().apply_positions(&target.positions);
        self.emit(EngineEvent::PositionsApplied { count });

        self.model.write().set_viewport(target.viewport);
        self.emit(EngineEvent::CameraAnimated {
            zoom: target.viewport.zoom,
            pan: target.viewport.pan,
        });
        Ok(())
    }

    async fn commit_views(&self, session: &EditorSession) {
        let views = self.views.read().list().to_vec();
        if let Err(e) = self
            .remote
            .commit_named_views(&session.ontology_id, &views)
            .await
        {
            self.stats.lock().remote_failures += 1;
            tracing::warn!(ontology = %session.ontology_id, error = %e, "named views not committed; kept in cache");
        }
    }

    pub fn list_views(&self) -> Vec<NamedView> {
        self.views.read().list().to_vec()
    }

    pub fn view_state(&self) -> ViewState {
        self.views.read().state().clone()
    }

    pub async fn capture_view(&self, name: &str) -> Result<NamedView, SyncError> {
        let session = self.session();
        let checkpoint = self.checkpoint();
        let view = self
            .views
            .write()
            .capture(name, &checkpoint, &session.user, Utc::now());
        self.commit_views(&session).await;
        Ok(view)
    }

    pub async fn rename_view(&self, view_id: &str, name: &str) -> Result<(), SyncError> {
        self.views.write().rename(view_id, name)?;
        self.commit_views(&self.session()).await;
        Ok(())
    }

    pub async fn delete_view(&self, view_id: &str) -> Result<NamedView, SyncError> {
        let view = self.views.write().delete(view_id)?;
        self.commit_views(&self.session()).await;
        Ok(view)
    }

    /// Activate a view; activating the active view restores the original state.
    pub async fn activate_view(&self, view_id: &str) -> Result<(), SyncError> {
        // Taken before the views lock: model and visibility come first.
        let current = self.checkpoint();
        let transition = self.views.write().activate(view_id, || current)?;
        match transition {
            Transition::Apply(target) => {
                self.apply_checkpoint(&target).await?;
                self.emit(EngineEvent::ViewActivated {
                    view_id: view_id.to_string(),
                });
            }
            Transition::Restore(original) => {
                self.apply_checkpoint(&original).await?;
                self.emit(EngineEvent::ViewDeactivated);
            }
        }
        Ok(())
    }

    /// Returns whether anything was restored.
    pub async fn deactivate_view(&self) -> Result<bool, SyncError> {
        let original = self.views.write().deactivate();
        match original {
            Some(original) => {
                self.apply_checkpoint(&original).await?;
                self.emit(EngineEvent::ViewDeactivated);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
