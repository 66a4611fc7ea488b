//! Hierarchical navigable small-world index.
//!
//! Layered graph: greedy descent on the upper layers, best-first
//! beam search (bounded by `ef`) at the target layer. Writes are
//! serialized by the owning store, so the graph needs no internal
//! locking. Deletes are soft: tombstoned nodes stay navigable but
//! never appear in results.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use fathom_core::config::{DistanceMetric, VectorConfig};
use fathom_core::errors::{FathomError, FathomResult, IndexError};

use crate::metric;

/// Hard cap on layer assignment; geometric sampling rarely exceeds it.
const MAX_LEVEL: usize = 16;

/// Nearest-neighbor candidate. Ordered as a min-heap on distance
/// (BinaryHeap is a max-heap, so the comparison is reversed).
#[derive(Debug, Copy, Clone, PartialEq)]
struct Candidate {
    internal: usize,
    distance: f64,
}

impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(CmpOrdering::Equal)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

/// Neighbor lists per layer. `layers[0]` is the dense base layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Node {
    layers: Vec<Vec<usize>>,
}

/// The ANN index. Position in `ids` is the internal integer index.
#[derive(Debug)]
pub struct HnswIndex {
    dimensions: usize,
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    /// Configured floor for the self-initialized capacity.
    initial_capacity: usize,
    /// 0 until the first insert self-initializes it.
    capacity: usize,
    vectors: Vec<Vec<f32>>,
    ids: Vec<String>,
    id_to_internal: HashMap<String, usize>,
    tombstones: HashSet<usize>,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_layer: usize,
    /// Level multiplier 1/ln(m).
    level_mult: f64,
}

/// Full persisted form: graph topology plus the internal→doc-id mapping.
#[derive(Serialize, Deserialize)]
struct HnswSnapshot {
    dimensions: usize,
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    #[serde(default)]
    initial_capacity: usize,
    capacity: usize,
    vectors: Vec<Vec<f32>>,
    ids: Vec<String>,
    tombstones: Vec<usize>,
    nodes: Vec<Node>,
    entry_point: Option<usize>,
    max_layer: usize,
}

impl HnswIndex {
    pub fn new(dimensions: usize, config: &VectorConfig) -> Self {
        Self {
            dimensions,
            metric: config.metric,
            m: config.m,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
            initial_capacity: config.initial_capacity.max(1),
            capacity: 0,
            vectors: Vec::new(),
            ids: Vec::new(),
            id_to_internal: HashMap::new(),
            tombstones: HashSet::new(),
            nodes: Vec::new(),
            entry_point: None,
            max_layer: 0,
            level_mult: 1.0 / (config.m.max(2) as f64).ln(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Live (non-tombstoned) vector count.
    pub fn len(&self) -> usize {
        self.ids.len() - self.tombstones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_internal.contains_key(id)
    }

    /// Doc id for an internal index, if live.
    pub fn doc_id(&self, internal: usize) -> Option<&str> {
        if internal >= self.ids.len() || self.tombstones.contains(&internal) {
            return None;
        }
        Some(&self.ids[internal])
    }

    /// All live doc ids.
    pub fn ids(&self) -> Vec<&str> {
        (0..self.ids.len())
            .filter(|i| !self.tombstones.contains(i))
            .map(|i| self.ids[i].as_str())
            .collect()
    }

    /// Insert vectors, recording an internal index per id. Existing ids
    /// are upserted: the old node is tombstoned and a fresh one inserted.
    pub fn add_vectors(&mut self, vectors: &[Vec<f32>], ids: &[String]) -> FathomResult<()> {
        if vectors.len() != ids.len() {
            return Err(IndexError::LengthMismatch {
                texts: vectors.len(),
                ids: ids.len(),
            }
            .into());
        }
        for v in vectors {
            if v.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: v.len(),
                }
                .into());
            }
        }

        self.ensure_capacity(vectors.len());

        for (vector, id) in vectors.iter().zip(ids) {
            if let Some(old) = self.id_to_internal.remove(id) {
                self.tombstones.insert(old);
            }
            let internal = self.ids.len();
            self.vectors.push(vector.clone());
            self.ids.push(id.clone());
            self.id_to_internal.insert(id.clone(), internal);
            self.link_node(internal);
        }

        debug!(live = self.len(), capacity = self.capacity, "vectors added");
        Ok(())
    }

    /// Soft-delete one id. Returns false when unknown.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.id_to_internal.remove(id) {
            Some(internal) => {
                self.tombstones.insert(internal);
                true
            }
            None => false,
        }
    }

    /// K nearest neighbors as `(similarity, internal_index)` pairs,
    /// descending; higher is always better. `k` is clamped to the live
    /// vector count.
    pub fn search(&self, query: &[f32], k: usize) -> FathomResult<Vec<(f64, usize)>> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            }
            .into());
        }
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        // Greedy descent through the upper layers.
        let mut curr = entry;
        let mut curr_dist = self.dist_to(curr, query);
        for layer in (1..=self.max_layer).rev() {
            loop {
                let mut improved = false;
                for &n in self.neighbors(curr, layer) {
                    let d = self.dist_to(n, query);
                    if d < curr_dist {
                        curr_dist = d;
                        curr = n;
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        // Beam search on the base layer. The beam must be wide enough to
        // find k live nodes even when tombstones sit in between.
        let ef = self.ef_search.max(k) + self.tombstones.len().min(self.ids.len());
        let found = self.search_layer(curr, query, 0, ef);

        let mut hits: Vec<(f64, usize)> = found
            .into_iter()
            .filter(|c| !self.tombstones.contains(&c.internal))
            .map(|c| (metric::similarity(self.metric, c.distance), c.internal))
            .collect();
        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(CmpOrdering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Persist the graph, vectors, and id mapping.
    pub fn save(&self, path: &Path) -> FathomResult<()> {
        let mut tombstones: Vec<usize> = self.tombstones.iter().copied().collect();
        tombstones.sort_unstable();
        let snapshot = HnswSnapshot {
            dimensions: self.dimensions,
            metric: self.metric,
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            initial_capacity: self.initial_capacity,
            capacity: self.capacity,
            vectors: self.vectors.clone(),
            ids: self.ids.clone(),
            tombstones,
            nodes: self.nodes.clone(),
            entry_point: self.entry_point,
            max_layer: self.max_layer,
        };
        let json = serde_json::to_vec(&snapshot)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore a saved index into an immediately searchable state.
    pub fn load(path: &Path) -> FathomResult<Self> {
        let corrupt = |reason: String| {
            FathomError::from(IndexError::Corruption {
                path: path.display().to_string(),
                reason,
            })
        };
        let bytes = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let snapshot: HnswSnapshot =
            serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
        if snapshot.vectors.len() != snapshot.ids.len()
            || snapshot.nodes.len() != snapshot.ids.len()
        {
            return Err(corrupt("vector/id/node lists have unequal lengths".into()));
        }
        if snapshot
            .vectors
            .iter()
            .any(|v| v.len() != snapshot.dimensions)
        {
            return Err(corrupt("stored vector with wrong dimensionality".into()));
        }

        let id_to_internal = snapshot
            .ids
            .iter()
            .enumerate()
            .filter(|(i, _)| !snapshot.tombstones.contains(i))
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Ok(Self {
            dimensions: snapshot.dimensions,
            metric: snapshot.metric,
            m: snapshot.m,
            ef_construction: snapshot.ef_construction,
            ef_search: snapshot.ef_search,
            initial_capacity: snapshot.initial_capacity.max(1),
            capacity: snapshot.capacity,
            vectors: snapshot.vectors,
            ids: snapshot.ids,
            id_to_internal,
            tombstones: snapshot.tombstones.into_iter().collect(),
            level_mult: 1.0 / (snapshot.m.max(2) as f64).ln(),
            nodes: snapshot.nodes,
            entry_point: snapshot.entry_point,
            max_layer: snapshot.max_layer,
        })
    }

    /// Self-initialize on first insert, grow in place afterwards.
    /// Capacity is never a reason to drop documents.
    fn ensure_capacity(&mut self, incoming: usize) {
        if self.capacity == 0 {
            self.capacity = (incoming * 2).max(self.initial_capacity);
            info!(capacity = self.capacity, "vector index initialized");
        }
        let needed = self.ids.len() + incoming;
        if needed > self.capacity {
            self.capacity = (self.capacity * 2).max(needed);
            info!(capacity = self.capacity, "vector index capacity grown");
        }
        self.vectors.reserve(incoming);
        self.nodes.reserve(incoming);
    }

    /// Wire a freshly pushed vector into the graph.
    fn link_node(&mut self, internal: usize) {
        let level = self.random_level();
        self.nodes.push(Node {
            layers: vec![Vec::new(); level + 1],
        });

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(internal);
            self.max_layer = level;
            return;
        };

        let query = self.vectors[internal].clone();
        let mut curr = entry;
        let mut curr_dist = self.dist_to(curr, &query);

        // Phase 1: greedy descent down to level+1.
        for layer in ((level + 1)..=self.max_layer).rev() {
            loop {
                let mut improved = false;
                for &n in self.neighbors(curr, layer) {
                    let d = self.dist_to(n, &query);
                    if d < curr_dist {
                        curr_dist = d;
                        curr = n;
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }

        // Phase 2: connect on each layer from min(level, max_layer) down.
        for layer in (0..=level.min(self.max_layer)).rev() {
            let m_max = if layer == 0 { self.m * 2 } else { self.m };
            let mut candidates = self.search_layer(curr, &query, layer, self.ef_construction);
            candidates.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(CmpOrdering::Equal)
            });
            candidates.truncate(self.m);

            for c in &candidates {
                self.add_link(internal, c.internal, layer);
                self.add_link(c.internal, internal, layer);
                if self.nodes[c.internal].layers[layer].len() > m_max {
                    self.prune(c.internal, layer, m_max);
                }
            }
            if let Some(best) = candidates.first() {
                curr = best.internal;
            }
        }

        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal);
        }
    }

    /// Best-first search within one layer, beam bounded by `ef`.
    fn search_layer(&self, start: usize, query: &[f32], layer: usize, ef: usize) -> Vec<Candidate> {
        let start_dist = self.dist_to(start, query);
        let mut visited: HashSet<usize> = HashSet::new();
        visited.insert(start);

        // candidates: min-heap by distance; results: max-heap (worst on top).
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<std::cmp::Reverse<Candidate>> = BinaryHeap::new();
        candidates.push(Candidate {
            internal: start,
            distance: start_dist,
        });
        results.push(std::cmp::Reverse(Candidate {
            internal: start,
            distance: start_dist,
        }));

        while let Some(closest) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.distance).unwrap_or(f64::MAX);
            if closest.distance > worst && results.len() >= ef {
                break;
            }
            for &n in self.neighbors(closest.internal, layer) {
                if !visited.insert(n) {
                    continue;
                }
                let d = self.dist_to(n, query);
                let worst = results.peek().map(|r| r.0.distance).unwrap_or(f64::MAX);
                if results.len() < ef || d < worst {
                    candidates.push(Candidate {
                        internal: n,
                        distance: d,
                    });
                    results.push(std::cmp::Reverse(Candidate {
                        internal: n,
                        distance: d,
                    }));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_iter().map(|r| r.0).collect()
    }

    fn add_link(&mut self, src: usize, dst: usize, layer: usize) {
        if src == dst {
            return;
        }
        let links = &mut self.nodes[src].layers[layer];
        if !links.contains(&dst) {
            links.push(dst);
        }
    }

    /// Keep only the `m_max` nearest neighbors of a node on one layer.
    fn prune(&mut self, internal: usize, layer: usize, m_max: usize) {
        let own = self.vectors[internal].clone();
        let mut links: Vec<Candidate> = self.nodes[internal].layers[layer]
            .iter()
            .map(|&n| Candidate {
                internal: n,
                distance: metric::distance(self.metric, &own, &self.vectors[n]),
            })
            .collect();
        links.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(CmpOrdering::Equal)
        });
        links.truncate(m_max);
        self.nodes[internal].layers[layer] = links.into_iter().map(|c| c.internal).collect();
    }

    fn neighbors(&self, internal: usize, layer: usize) -> &[usize] {
        self.nodes[internal]
            .layers
            .get(layer)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn dist_to(&self, internal: usize, query: &[f32]) -> f64 {
        metric::distance(self.metric, &self.vectors[internal], query)
    }

    /// Geometric level sampling: P(level ≥ l) = (1/m)^l.
    fn random_level(&self) -> usize {
        let mut rng = rand::thread_rng();
        let uniform: f64 = rng.gen_range(f64::EPSILON..1.0);
        ((-uniform.ln() * self.level_mult).floor() as usize).min(MAX_LEVEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> VectorConfig {
        VectorConfig {
            m: 8,
            ef_construction: 64,
            ef_search: 32,
            ..Default::default()
        }
    }

    fn basis_vector(dim: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[axis % dim] = 1.0;
        v
    }

    #[test]
    fn dimension_mismatch_rejected_on_insert() {
        let mut index = HnswIndex::new(4, &small_config());
        let err = index
            .add_vectors(&[vec![1.0, 2.0]], &["d1".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            FathomError::Index(IndexError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn length_mismatch_rejected() {
        let mut index = HnswIndex::new(2, &small_config());
        let err = index.add_vectors(&[vec![1.0, 0.0]], &[]).unwrap_err();
        assert!(matches!(
            err,
            FathomError::Index(IndexError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn empty_index_returns_no_neighbors() {
        let index = HnswIndex::new(3, &small_config());
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn nearest_neighbor_is_found() {
        let mut index = HnswIndex::new(3, &small_config());
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![0.9, 0.1, 0.0],
        ];
        let ids: Vec<String> = (0..4).map(|i| format!("d{i}")).collect();
        index.add_vectors(&vectors, &ids).unwrap();

        let hits = index.search(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(index.doc_id(hits[0].1), Some("d0"));
        assert_eq!(index.doc_id(hits[1].1), Some("d3"));
        // Similarity is higher-is-better and descending.
        assert!(hits[0].0 >= hits[1].0);
    }

    #[test]
    fn k_clamped_to_live_count() {
        let mut index = HnswIndex::new(2, &small_config());
        index
            .add_vectors(&[vec![1.0, 0.0]], &["only".to_string()])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn query_dimension_mismatch_rejected() {
        let mut index = HnswIndex::new(3, &small_config());
        index
            .add_vectors(&[vec![1.0, 0.0, 0.0]], &["d1".to_string()])
            .unwrap();
        assert!(index.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn upsert_replaces_vector_for_id() {
        let mut index = HnswIndex::new(2, &small_config());
        index
            .add_vectors(&[vec![1.0, 0.0]], &["d1".to_string()])
            .unwrap();
        index
            .add_vectors(&[vec![0.0, 1.0]], &["d1".to_string()])
            .unwrap();
        assert_eq!(index.len(), 1);

        let hits = index.search(&[0.0, 1.0], 1).unwrap();
        assert_eq!(index.doc_id(hits[0].1), Some("d1"));
        assert!(hits[0].0 > 0.99);
    }

    #[test]
    fn removed_ids_never_returned() {
        let mut index = HnswIndex::new(2, &small_config());
        index
            .add_vectors(
                &[vec![1.0, 0.0], vec![0.9, 0.1]],
                &["keep".to_string(), "drop".to_string()],
            )
            .unwrap();
        assert!(index.remove("drop"));
        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.doc_id(hits[0].1), Some("keep"));
    }

    #[test]
    fn capacity_self_initializes_and_grows() {
        let mut index = HnswIndex::new(2, &small_config());
        index
            .add_vectors(&[vec![1.0, 0.0]], &["d0".to_string()])
            .unwrap();
        // Capacity heuristic: 2 × batch, floored at the configured
        // initial capacity (defaults to 10_000).
        assert!(index.capacity >= 10_000);

        // Inserting past capacity must grow, never drop.
        index.capacity = 2;
        let vectors: Vec<Vec<f32>> = (0..4).map(|i| vec![i as f32, 1.0]).collect();
        let ids: Vec<String> = (1..=4).map(|i| format!("d{i}")).collect();
        index.add_vectors(&vectors, &ids).unwrap();
        assert_eq!(index.len(), 5);
        assert!(index.capacity >= 5);
    }

    #[test]
    fn configured_initial_capacity_is_the_floor() {
        let mut cfg = small_config();
        cfg.initial_capacity = 64;
        let mut index = HnswIndex::new(2, &cfg);
        index
            .add_vectors(&[vec![1.0, 0.0]], &["d0".to_string()])
            .unwrap();
        assert_eq!(index.capacity, 64);
    }

    #[test]
    fn large_first_batch_overrides_small_initial_capacity() {
        let mut cfg = small_config();
        cfg.initial_capacity = 4;
        let mut index = HnswIndex::new(2, &cfg);
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32, 1.0]).collect();
        let ids: Vec<String> = (0..10).map(|i| format!("d{i}")).collect();
        index.add_vectors(&vectors, &ids).unwrap();
        assert_eq!(index.capacity, 20);
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn moderate_corpus_recall() {
        let mut index = HnswIndex::new(8, &small_config());
        let vectors: Vec<Vec<f32>> = (0..200).map(|i| basis_vector(8, i)).collect();
        let ids: Vec<String> = (0..200).map(|i| format!("d{i}")).collect();
        index.add_vectors(&vectors, &ids).unwrap();

        // Query near axis 3: all axis-3 vectors are equally nearest.
        let mut q = vec![0.0; 8];
        q[3] = 1.0;
        let hits = index.search(&q, 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits[0].0 > 0.99);
    }

    #[test]
    fn save_load_round_trip_is_searchable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.json");

        let mut index = HnswIndex::new(3, &small_config());
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
        ];
        let ids: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        index.add_vectors(&vectors, &ids).unwrap();
        index.remove("b");
        index.save(&path).unwrap();

        let restored = HnswIndex::load(&path).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dimensions(), 3);

        let before = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
        let after = restored.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(before.len(), after.len());
        for (x, y) in before.iter().zip(&after) {
            assert_eq!(index.doc_id(x.1), restored.doc_id(y.1));
            assert!((x.0 - y.0).abs() < 1e-12);
        }
    }

    #[test]
    fn load_missing_file_is_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let err = HnswIndex::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(
            err,
            FathomError::Index(IndexError::Corruption { .. })
        ));
    }
}
