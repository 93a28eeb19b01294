//! Integration tests for the complete Ontograph pipeline
//!
//! These tests verify end-to-end functionality across crates:
//! - Model edits → Save → Remote store + exchange document
//! - On-disk cache → Engine restart → Load precedence
//! - Exchange document → Import → Export
//!
//! Run with: cargo test --test integration_tests

use ontograph_model::{Category, EditorSession, ElementAttrs, ElementSpec, Position};
use ontograph_storage::{LocalCache, MemoryRemoteStore, RemoteOp};
use ontograph_sync::{EngineConfig, GraphEngine, LoadSource};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn session() -> EditorSession {
    EditorSession::new("p1", "sensors", "ana")
}

fn disk_engine(remote: &Arc<MemoryRemoteStore>, dir: &Path) -> GraphEngine {
    let cache = Arc::new(LocalCache::open(dir).unwrap());
    GraphEngine::new(session(), EngineConfig::default(), cache, remote.clone())
}

fn build_sensor_graph(engine: &GraphEngine) {
    engine
        .add_element(ElementSpec::class("Sensor").with_id("Sensor").at(0.0, 0.0))
        .unwrap();
    engine
        .add_element(ElementSpec::class("Platform").with_id("Platform").at(300.0, 0.0))
        .unwrap();
    engine
        .add_element(
            ElementSpec::relation("Sensor", "Platform", "mountedOn")
                .with_id("mountedOn")
                .with_multiplicity(Some(1), Some(1)),
        )
        .unwrap();
}

// ============================================================================
// Save → cold reload
// ============================================================================

#[tokio::test]
async fn test_save_then_cold_cache_reload() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let first_dir = tempdir().unwrap();
    let engine = disk_engine(&remote, first_dir.path());
    engine.load_graph("sensors").await.unwrap();
    build_sensor_graph(&engine);

    let turtle = engine.save().await.unwrap();
    assert!(turtle.contains(":mountedOn\n    a owl:ObjectProperty"));
    assert!(turtle.contains("rdfs:domain :Sensor"));
    assert!(turtle.contains("rdfs:range :Platform"));
    assert!(turtle.contains("og:minCount \"1\"^^xsd:nonNegativeInteger"));
    assert!(turtle.contains("og:maxCount \"1\"^^xsd:nonNegativeInteger"));
    assert_eq!(remote.exchange_documents("sensors"), vec![turtle.clone()]);

    let stored = remote.graph("sensors").unwrap();
    assert_eq!(stored.classes.len(), 2);
    assert_eq!(stored.object_properties.len(), 1);

    // A different machine: empty cache, same remote.
    let cold_dir = tempdir().unwrap();
    let cold = disk_engine(&remote, cold_dir.path());
    assert_eq!(cold.load_graph("sensors").await.unwrap(), LoadSource::Remote);

    let model = cold.model();
    let model = model.read();
    assert_eq!(model.len(), 3);
    assert_eq!(model.position("Sensor"), Some(Position::new(0.0, 0.0)));
    assert_eq!(model.position("Platform"), Some(Position::new(300.0, 0.0)));
    let ElementAttrs::Relation(relation) = &model.get("mountedOn").unwrap().attrs else {
        panic!("mountedOn should be a relation");
    };
    assert_eq!(relation.source, "Sensor");
    assert_eq!(relation.target, "Platform");
    assert_eq!((relation.min_count, relation.max_count), (Some(1), Some(1)));
    assert_eq!(model.get("Sensor").unwrap().stamp.creator.as_deref(), Some("ana"));
}

// ============================================================================
// Cache precedence across restarts
// ============================================================================

#[tokio::test]
async fn test_recent_local_edits_survive_restart_without_remote() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dir = tempdir().unwrap();
    {
        let engine = disk_engine(&remote, dir.path());
        engine.load_graph("sensors").await.unwrap();
        build_sensor_graph(&engine);
        engine.set_category_visibility(Category::Edges, false);
        engine.capture_view("overview").await.unwrap();
        let t0 = Instant::now();
        engine.tick_at(t0).await;
        engine.tick_at(t0 + Duration::from_millis(150)).await;
        assert_eq!(engine.stats().local_writes, 1);
    }

    // Nothing was saved remotely; the fresh local snapshot must win.
    remote.fail(RemoteOp::FetchGraph, "sensors");
    let fetches = remote.calls(RemoteOp::FetchGraph);
    let restarted = disk_engine(&remote, dir.path());
    assert_eq!(
        restarted.load_graph("sensors").await.unwrap(),
        LoadSource::LocalCache
    );
    assert_eq!(restarted.model().read().len(), 3);
    assert!(!restarted.visibility_state().categories.edges);
    assert_eq!(restarted.list_views().len(), 1);
    assert_eq!(remote.calls(RemoteOp::FetchGraph), fetches);
}

#[tokio::test]
async fn test_committed_remote_wins_after_restart() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dir = tempdir().unwrap();
    {
        let engine = disk_engine(&remote, dir.path());
        engine.load_graph("sensors").await.unwrap();
        build_sensor_graph(&engine);
        engine.flush_local();
        engine.save().await.unwrap();
    }

    // Someone else removes the relation and saves.
    let mut document = remote.graph("sensors").unwrap();
    document.object_properties.clear();
    remote.put_graph("sensors", document);

    let restarted = disk_engine(&remote, dir.path());
    assert_eq!(restarted.load_graph("sensors").await.unwrap(), LoadSource::Remote);
    assert_eq!(restarted.model().read().len(), 2);
}

// ============================================================================
// Exchange document round trip
// ============================================================================

#[tokio::test]
async fn test_exported_document_imports_into_another_project() {
    let remote = Arc::new(MemoryRemoteStore::new());
    let dir = tempdir().unwrap();
    let engine = disk_engine(&remote, dir.path());
    engine.load_graph("sensors").await.unwrap();
    build_sensor_graph(&engine);
    engine.register_import("foaf");
    let turtle = engine.export_document();

    let other_dir = tempdir().unwrap();
    let other = disk_engine(&Arc::new(MemoryRemoteStore::new()), other_dir.path());
    other.load_graph("sensors").await.unwrap();
    let summary = other.import_document(&turtle).await.unwrap();

    assert_eq!(summary.elements, 3);
    assert_eq!(summary.imports, vec!["foaf"]);
    assert!(summary.skipped.is_empty());
    let model = other.model();
    let model = model.read();
    let ElementAttrs::Relation(relation) = &model.get("mountedOn").unwrap().attrs else {
        panic!("mountedOn should be a relation");
    };
    assert_eq!((relation.source.as_str(), relation.target.as_str()), ("Sensor", "Platform"));
    assert_eq!(relation.max_count, Some(1));
    assert!(model.position("Sensor").is_some());
}
