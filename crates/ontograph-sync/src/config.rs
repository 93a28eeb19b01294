//! Engine configuration.

use chrono::{DateTime, Utc};
use ontograph_model::{GraphSnapshot, Provenance};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// When a locally cached graph wins over the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessPolicy {
    /// A local snapshot younger than this is used instead of fetching.
    pub window_ms: u64,
    /// After a confirmed remote graph commit, re-stamp the cached snapshot
    /// as `remote` so it no longer overrides the store.
    pub invalidate_on_commit: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            window_ms: 30_000,
            invalidate_on_commit: true,
        }
    }
}

impl FreshnessPolicy {
    pub fn is_fresh(&self, snapshot: &GraphSnapshot, now: DateTime<Utc>) -> bool {
        snapshot.provenance == Provenance::Local
            && (now - snapshot.timestamp).num_milliseconds() < self.window_ms as i64
    }
}

/// Where overlay clusters and their grids are placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayGeometry {
    /// Horizontal gap between the local bounding box and the first cluster.
    pub cluster_gap: f64,
    /// Horizontal space reserved per visible import.
    pub cluster_width: f64,
    pub grid_spacing: f64,
    pub grid_columns: usize,
}

impl Default for OverlayGeometry {
    fn default() -> Self {
        Self {
            cluster_gap: 300.0,
            cluster_width: 700.0,
            grid_spacing: 140.0,
            grid_columns: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Namespace under which ontology IRIs are minted.
    pub base_iri: String,
    pub fast_debounce_ms: u64,
    pub slow_debounce_ms: u64,
    pub freshness: FreshnessPolicy,
    pub overlay: OverlayGeometry,
    /// Relation predicate serialized as `owl:equivalentClass`.
    pub equivalence_predicate: String,
    /// Layout used when a graph arrives without positions.
    pub default_layout: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_iri: "https://ontograph.dev/onto".to_string(),
            fast_debounce_ms: 100,
            slow_debounce_ms: 5000,
            freshness: FreshnessPolicy::default(),
            overlay: OverlayGeometry::default(),
            equivalence_predicate: "equivalentClass".to_string(),
            default_layout: "force-directed".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn fast_debounce(&self) -> Duration {
        Duration::from_millis(self.fast_debounce_ms)
    }

    pub fn slow_debounce(&self) -> Duration {
        Duration::from_millis(self.slow_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{ "slow_debounce_ms": 250, "freshness": { "window_ms": 5 } }"#)
            .unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.slow_debounce_ms, 250);
        assert_eq!(config.fast_debounce_ms, 100);
        assert_eq!(config.freshness.window_ms, 5);
        assert!(config.freshness.invalidate_on_commit);
    }

    #[test]
    fn freshness_requires_local_provenance() {
        let policy = FreshnessPolicy::default();
        let now = Utc::now();
        let mut snapshot = GraphSnapshot::new(
            Vec::new(),
            Provenance::Local,
            now - chrono::Duration::seconds(5),
        );
        assert!(policy.is_fresh(&snapshot, now));
        snapshot.provenance = Provenance::Remote;
        assert!(!policy.is_fresh(&snapshot, now));
        snapshot.provenance = Provenance::Local;
        snapshot.timestamp = now - chrono::Duration::seconds(60);
        assert!(!policy.is_fresh(&snapshot, now));
    }
}
