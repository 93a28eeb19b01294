//! Layout algorithms.
//!
//! An algorithm takes the current node set, edges and positions and returns
//! new positions. The engine runs it inside a suspended-persistence section
//! and writes the result once, after it finishes.

use async_trait::async_trait;
use ontograph_model::{GraphModel, Position};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What a layout run sees of the graph.
#[derive(Debug, Clone, Default)]
pub struct LayoutInput {
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
    pub positions: BTreeMap<String, Position>,
}

impl LayoutInput {
    /// Every node of the model (overlays included) and every edge between them.
    pub fn from_model(model: &GraphModel) -> Self {
        Self {
            nodes: model.nodes().map(|n| n.id.clone()).collect(),
            edges: model
                .edges()
                .filter_map(|e| e.endpoints())
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect(),
            positions: model.positions().clone(),
        }
    }
}

#[async_trait]
pub trait LayoutAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, input: LayoutInput) -> anyhow::Result<BTreeMap<String, Position>>;
}

// ============================================================================
// Force-directed
// ============================================================================

/// Spring-and-repulsion layout with damped integration.
///
/// Deterministic: nodes without a position start on a circle in id order and
/// every step uses the same fixed time step.
#[derive(Debug, Clone)]
pub struct ForceDirected {
    pub iterations: usize,
    /// Preferred edge length.
    pub target_distance: f64,
    /// Pairs closer than this push each other apart.
    pub min_separation: f64,
}

impl Default for ForceDirected {
    fn default() -> Self {
        Self {
            iterations: 200,
            target_distance: 160.0,
            min_separation: 120.0,
        }
    }
}

impl ForceDirected {
    pub const NAME: &'static str = "force-directed";

    pub fn compute(&self, input: &LayoutInput) -> BTreeMap<String, Position> {
        let n = input.nodes.len();
        if n == 0 {
            return BTreeMap::new();
        }

        let mut ids: Vec<&String> = input.nodes.iter().collect();
        ids.sort();
        let index: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let radius = self.target_distance * (n as f64).sqrt();
        let mut pos: Vec<(f64, f64)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| match input.positions.get(*id) {
                Some(p) => (p.x, p.y),
                None => {
                    let angle = std::f64::consts::TAU * i as f64 / n as f64;
                    (radius * angle.cos(), radius * angle.sin())
                }
            })
            .collect();
        let mut velocity = vec![(0.0_f64, 0.0_f64); n];

        let edges: Vec<(usize, usize)> = input
            .edges
            .iter()
            .filter_map(|(s, t)| Some((*index.get(s.as_str())?, *index.get(t.as_str())?)))
            .filter(|(a, b)| a != b)
            .collect();

        let dt = 0.02;
        let spring_k = 4.0;
        let repulse_k = 10.0;
        let damping = 6.0;
        let max_step = 5.0;

        for _ in 0..self.iterations {
            let mut force = vec![(0.0_f64, 0.0_f64); n];

            for &(a, b) in &edges {
                let (dx, dy) = (pos[b].0 - pos[a].0, pos[b].1 - pos[a].1);
                let dist = (dx * dx + dy * dy).sqrt();
                if dist > 1e-6 {
                    let stretch = dist - self.target_distance;
                    let (fx, fy) = (dx / dist * spring_k * stretch, dy / dist * spring_k * stretch);
                    force[a].0 += fx;
                    force[a].1 += fy;
                    force[b].0 -= fx;
                    force[b].1 -= fy;
                }
            }

            for a in 0..n {
                for b in (a + 1)..n {
                    let (mut dx, mut dy) = (pos[b].0 - pos[a].0, pos[b].1 - pos[a].1);
                    let mut dist = (dx * dx + dy * dy).sqrt();
                    if dist >= self.min_separation {
                        continue;
                    }
                    if dist < 1e-6 {
                        // Coincident nodes: separate along a fixed axis.
                        dx = 1.0;
                        dy = 0.0;
                        dist = 1.0;
                    }
                    let push = repulse_k * (self.min_separation - dist);
                    let (fx, fy) = (dx / dist * push, dy / dist * push);
                    force[a].0 -= fx;
                    force[a].1 -= fy;
                    force[b].0 += fx;
                    force[b].1 += fy;
                }
            }

            for i in 0..n {
                velocity[i].0 = (velocity[i].0 + force[i].0 * dt) * (1.0 - damping * dt);
                velocity[i].1 = (velocity[i].1 + force[i].1 * dt) * (1.0 - damping * dt);
                let step_x = (velocity[i].0 * dt).clamp(-max_step, max_step);
                let step_y = (velocity[i].1 * dt).clamp(-max_step, max_step);
                pos[i].0 += step_x;
                pos[i].1 += step_y;
            }
        }

        ids.into_iter()
            .zip(pos)
            .map(|(id, (x, y))| (id.clone(), Position::new(x, y)))
            .collect()
    }
}

#[async_trait]
impl LayoutAlgorithm for ForceDirected {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, input: LayoutInput) -> anyhow::Result<BTreeMap<String, Position>> {
        Ok(self.compute(&input))
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone)]
pub struct LayoutRegistry {
    algorithms: HashMap<String, Arc<dyn LayoutAlgorithm>>,
}

impl LayoutRegistry {
    pub fn register(&mut self, algorithm: Arc<dyn LayoutAlgorithm>) {
        self.algorithms
            .insert(algorithm.name().to_string(), algorithm);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn LayoutAlgorithm>> {
        self.algorithms.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.algorithms.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        let mut registry = Self {
            algorithms: HashMap::new(),
        };
        registry.register(Arc::new(ForceDirected::default()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(nodes: &[&str], edges: &[(&str, &str)]) -> LayoutInput {
        LayoutInput {
            nodes: nodes.iter().map(|s| s.to_string()).collect(),
            edges: edges
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            positions: BTreeMap::new(),
        }
    }

    #[test]
    fn force_directed_is_deterministic_and_total() {
        let layout = ForceDirected::default();
        let g = input(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let first = layout.compute(&g);
        let second = layout.compute(&g);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.values().all(|p| p.x.is_finite() && p.y.is_finite()));
    }

    #[test]
    fn coincident_nodes_are_pulled_apart() {
        let layout = ForceDirected::default();
        let mut g = input(&["a", "b"], &[]);
        g.positions.insert("a".into(), Position::new(0.0, 0.0));
        g.positions.insert("b".into(), Position::new(0.0, 0.0));
        let out = layout.compute(&g);
        assert!(out["a"].distance(&out["b"]) > 1.0);
    }

    #[test]
    fn registry_resolves_default_algorithm() {
        let registry = LayoutRegistry::default();
        assert!(registry.resolve(ForceDirected::NAME).is_some());
        assert!(registry.resolve("circular").is_none());
        assert_eq!(registry.names(), vec![ForceDirected::NAME.to_string()]);
    }
}
