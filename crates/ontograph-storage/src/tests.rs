//! Cache and remote store tests

use super::*;
use ontograph_model::{
    EditorSession, ElementSpec, GraphModel, GraphSnapshot, LayoutSnapshot, NodePosition, Position,
    Provenance,
};
use tempfile::tempdir;

fn session() -> EditorSession {
    EditorSession::new("proj", "onto", "tester")
}

/// Helper to create an on-disk cache
fn test_cache() -> (LocalCache, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let cache = LocalCache::open(dir.path().join("cache")).unwrap();
    (cache, dir)
}

#[test]
fn test_snapshot_survives_reopen() {
    let (cache, dir) = test_cache();
    let mut model = GraphModel::new(session());
    model
        .add_element(ElementSpec::class("Sensor").with_id("s"))
        .unwrap();
    let key = CacheKey::new(&session(), Resource::Graph);
    cache.put(&key, &model.snapshot(Provenance::Local)).unwrap();

    let reopened = LocalCache::open(dir.path().join("cache")).unwrap();
    let snapshot: GraphSnapshot = reopened.get(&key).unwrap().unwrap();
    assert_eq!(snapshot.nodes.len(), 1);
    assert_eq!(snapshot.provenance, Provenance::Local);
}

#[test]
fn test_write_leaves_no_temp_files() {
    let (cache, _dir) = test_cache();
    let key = CacheKey::new(&session(), Resource::Layout);
    for x in 0..3 {
        let layout = LayoutSnapshot {
            nodes: vec![NodePosition {
                id: "a".into(),
                x: x as f64,
                y: 0.0,
            }],
            ..Default::default()
        };
        cache.put(&key, &layout).unwrap();
    }
    let files = cache.list_files().unwrap();
    assert_eq!(files, vec![key.storage_name()]);
    assert_eq!(cache.write_count(), 3);
}

#[test]
fn test_missing_and_removed_entries() {
    let (cache, _dir) = test_cache();
    let key = CacheKey::new(&session(), Resource::NamedViews);
    assert!(cache.get::<Vec<String>>(&key).unwrap().is_none());
    cache.put(&key, &vec!["v".to_string()]).unwrap();
    assert!(cache.remove(&key).unwrap());
    assert!(cache.get::<Vec<String>>(&key).unwrap().is_none());
    assert!(!cache.remove(&key).unwrap());
}

#[test]
fn test_malformed_entry_is_a_json_error() {
    let (cache, dir) = test_cache();
    let key = CacheKey::new(&session(), Resource::Graph);
    std::fs::write(dir.path().join("cache").join(key.storage_name()), "{ nope").unwrap();
    assert!(matches!(
        cache.get::<GraphSnapshot>(&key),
        Err(StorageError::Json(_))
    ));
}

#[test]
fn test_sessions_do_not_share_entries() {
    let cache = LocalCache::in_memory();
    let a = CacheKey::new(&session(), Resource::Imports);
    let b = CacheKey::new(&session().with_ontology("other"), Resource::Imports);
    cache.put(&a, &vec!["foaf".to_string()]).unwrap();
    assert!(cache.get::<Vec<String>>(&b).unwrap().is_none());
}

#[tokio::test]
async fn test_memory_store_failure_injection() {
    let store = MemoryRemoteStore::new();
    store.fail(RemoteOp::FetchGraph, "onto");
    let err = store.fetch_graph("onto").await.unwrap_err();
    assert!(matches!(err, StorageError::FetchFailure { .. }));
    assert!(err.is_retryable());
    assert_eq!(store.calls(RemoteOp::FetchGraph), 1);

    store.heal(RemoteOp::FetchGraph, "onto");
    assert!(store.fetch_graph("onto").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_memory_store_stale_layout_then_accept() {
    let store = MemoryRemoteStore::new();
    store.reject_stale_layouts("onto", 1);
    let layout = LayoutSnapshot {
        nodes: vec![NodePosition {
            id: "a".into(),
            x: 1.0,
            y: 2.0,
        }],
        ..Default::default()
    };
    assert!(matches!(
        store.commit_layout("onto", &layout).await,
        Err(StorageError::StaleWrite { .. })
    ));
    store.commit_layout("onto", &layout).await.unwrap();
    let stored = store.fetch_layout("onto").await.unwrap();
    assert_eq!(stored.positions()["a"], Position::new(1.0, 2.0));
}
