//! HNSW index over fact vectors.
//!
//! Backs the `approximate` similarity strategy: instead of scanning every
//! fact vector, the orchestrator probes this index for nearest neighbours.
//! Wraps the `hnsw_rs` crate with L2 distance internally; vectors are
//! normalised on insertion so the L2 result converts to cosine similarity at
//! the API boundary.
//!
//! Removals are tombstoned and the graph is rebuilt lazily on the next
//! search, mirroring the single-writer cache policy used elsewhere.

use hnsw_rs::hnsw::Hnsw;
use hnsw_rs::prelude::*;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Identifier of an indexed vector (the owning fact's id).
pub type VectorId = u64;

/// Approximate nearest-neighbour index over fact vectors.
pub struct AnnIndex {
    /// The rebuilt-on-demand HNSW structure.
    inner: RwLock<Option<AnnInner>>,
    /// All inserted vectors, normalised, in insertion order.
    vectors: RwLock<Vec<(VectorId, Vec<f32>)>>,
    /// Ids marked for deletion; filtered out at rebuild and search.
    tombstones: RwLock<HashSet<VectorId>>,
    /// Set on every mutation; cleared by rebuild.
    dirty: AtomicBool,
    /// Graph connectivity parameter.
    max_nb_connection: usize,
    ef_construction: usize,
    ef_search: usize,
}

struct AnnInner {
    hnsw: Box<Hnsw<'static, f32, DistL2>>,
    /// Keeps the vector storage alive for the graph's 'static borrows.
    _storage: Arc<Vec<Vec<f32>>>,
    index_to_id: Vec<VectorId>,
}

// Safety: the HNSW graph uses atomics internally and the storage behind the
// 'static borrow is owned by `_storage`, which outlives the graph (fields
// drop in declaration order).
unsafe impl Send for AnnInner {}
unsafe impl Sync for AnnInner {}

impl Default for AnnIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnIndex {
    /// Create an empty index with default HNSW parameters.
    pub fn new() -> Self {
        AnnIndex {
            inner: RwLock::new(None),
            vectors: RwLock::new(Vec::new()),
            tombstones: RwLock::new(HashSet::new()),
            dirty: AtomicBool::new(false),
            max_nb_connection: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }

    /// Insert a vector under the given id. Replaces any tombstone for it.
    pub fn insert(&self, id: VectorId, vector: &[f32]) {
        if vector.is_empty() {
            return;
        }
        self.tombstones.write().remove(&id);
        self.vectors.write().push((id, Self::normalise(vector)));
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Mark a vector as deleted.
    pub fn remove(&self, id: VectorId) {
        self.tombstones.write().insert(id);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Number of live (non-tombstoned) vectors.
    pub fn len(&self) -> usize {
        let tombstones = self.tombstones.read();
        self.vectors
            .read()
            .iter()
            .filter(|(id, _)| !tombstones.contains(id))
            .count()
    }

    /// Whether the index holds no live vectors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest neighbours of `query` as `(id, similarity)` pairs, most
    /// similar first. Rebuilds the graph first if the index is dirty.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        if self.dirty.swap(false, Ordering::Relaxed) {
            self.rebuild();
        }
        let guard = self.inner.read();
        let inner = match &*guard {
            Some(inner) => inner,
            None => return Vec::new(),
        };
        let tombstones = self.tombstones.read();
        let prepared = Self::normalise(query);
        let raw = inner.hnsw.search(&prepared, k.max(1), self.ef_search);

        let mut results: Vec<(VectorId, f32)> = raw
            .into_iter()
            .filter_map(|neighbour| {
                let id = *inner.index_to_id.get(neighbour.d_id)?;
                if tombstones.contains(&id) {
                    return None;
                }
                // Unit vectors: L2^2 = 2(1 - cos), so cos = 1 - L2^2 / 2.
                let cos = 1.0 - neighbour.distance * neighbour.distance / 2.0;
                Some((id, cos.clamp(0.0, 1.0)))
            })
            .collect();
        results.sort_by(|a, b| b.1.total_cmp(&a.1));
        results.truncate(k);
        results
    }

    fn rebuild(&self) {
        let vectors = self.vectors.read();
        let tombstones = self.tombstones.read();
        let active: Vec<(VectorId, &Vec<f32>)> = vectors
            .iter()
            .filter(|(id, _)| !tombstones.contains(id))
            .map(|(id, vector)| (*id, vector))
            .collect();

        if active.is_empty() {
            *self.inner.write() = None;
            return;
        }

        let storage: Vec<Vec<f32>> = active.iter().map(|(_, v)| (*v).clone()).collect();
        let index_to_id: Vec<VectorId> = active.iter().map(|(id, _)| *id).collect();
        let storage = Arc::new(storage);

        // SAFETY: the 'static borrow is backed by `storage`, which is moved
        // into `AnnInner._storage` and dropped only after the graph (struct
        // fields drop in declaration order). Nothing moves the Arc out.
        let storage_ref: &'static Vec<Vec<f32>> =
            unsafe { &*Arc::as_ptr(&storage).cast::<Vec<Vec<f32>>>() };

        let n = storage_ref.len();
        let max_layer = if n <= 1 {
            4
        } else {
            let m = (self.max_nb_connection as f64).max(2.0);
            (((n as f64).ln() / m.ln()).ceil() as usize).clamp(4, 16)
        };

        let mut hnsw: Hnsw<'static, f32, DistL2> = Hnsw::new(
            self.max_nb_connection,
            n,
            max_layer,
            self.ef_construction,
            DistL2,
        );
        // Keep pruned connections so small datasets stay connected.
        hnsw.set_keeping_pruned(true);
        hnsw.set_extend_candidates(true);

        for (idx, vector) in storage_ref.iter().enumerate() {
            hnsw.insert((vector, idx));
        }

        *self.inner.write() = Some(AnnInner {
            hnsw: Box::new(hnsw),
            _storage: storage,
            index_to_id,
        });
        tracing::debug!(vectors = n, "rebuilt approximate vector index");
    }

    fn normalise(vector: &[f32]) -> Vec<f32> {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-10 {
            vector.iter().map(|x| x / norm).collect()
        } else {
            vector.to_vec()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdc::{DenseOracle, VectorOracle};

    #[test]
    fn search_finds_the_identical_vector_first() {
        let oracle = DenseOracle::new(512);
        let index = AnnIndex::new();
        for (i, name) in ["Dog", "Cat", "Fish", "Bird"].iter().enumerate() {
            index.insert(i as u64, &oracle.from_name(name));
        }
        let hits = index.search(&oracle.from_name("Cat"), 2);
        assert_eq!(hits.first().map(|(id, _)| *id), Some(1));
        assert!(hits[0].1 > 0.99);
    }

    #[test]
    fn tombstoned_vectors_disappear_from_results() {
        let oracle = DenseOracle::new(512);
        let index = AnnIndex::new();
        index.insert(1, &oracle.from_name("Dog"));
        index.insert(2, &oracle.from_name("Cat"));
        index.remove(1);
        let hits = index.search(&oracle.from_name("Dog"), 4);
        assert!(hits.iter().all(|(id, _)| *id != 1));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = AnnIndex::new();
        assert!(index.search(&[1.0, 0.0], 3).is_empty());
        assert!(index.is_empty());
    }
}
