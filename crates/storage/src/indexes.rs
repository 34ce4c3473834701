// storage/src/indexes.rs
//
// Derived state that is cheap to rebuild and too hot-path to round-trip
// through RocksDB on every consensus step: the verification-children
// inverted index, the best-tip cache, the height index, and mempool
// membership. Guarded by `parking_lot` rather than `std::sync` since these
// are taken on nearly every `ConsensusStorage` call.

use dag_core::{BlockHeight, Hash};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
pub struct Indexes {
    verification_children: RwLock<HashMap<Hash, Vec<Hash>>>,
    best_tips: RwLock<Option<Vec<Hash>>>,
    height_index: RwLock<Vec<(BlockHeight, Hash)>>,
    tip_candidates: RwLock<HashSet<Hash>>,
    mempool: RwLock<HashSet<Hash>>,
}

impl Indexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_parent(&self, parent: Hash, child: Hash) {
        self.verification_children.write().entry(parent).or_default().push(child);
    }

    pub fn verification_children(&self, hash: &Hash) -> Vec<Hash> {
        self.verification_children.read().get(hash).cloned().unwrap_or_default()
    }

    pub fn best_tips(&self) -> Option<Vec<Hash>> {
        self.best_tips.read().clone()
    }

    pub fn set_best_tips(&self, tips: Option<Vec<Hash>>) {
        *self.best_tips.write() = tips;
    }

    pub fn height_tip(&self) -> Option<(BlockHeight, Hash)> {
        self.height_index.read().last().copied()
    }

    pub fn push_height(&self, height: BlockHeight, hash: Hash) {
        self.height_index.write().push((height, hash));
    }

    pub fn add_tip_candidate(&self, hash: Hash) {
        self.tip_candidates.write().insert(hash);
    }

    pub fn remove_tip_candidate(&self, hash: &Hash) -> bool {
        self.tip_candidates.write().remove(hash)
    }

    pub fn is_tip_candidate(&self, hash: &Hash) -> bool {
        self.tip_candidates.read().contains(hash)
    }

    pub fn tip_candidates(&self) -> Vec<Hash> {
        self.tip_candidates.read().iter().copied().collect()
    }

    pub fn mempool_insert(&self, hash: Hash) {
        self.mempool.write().insert(hash);
    }

    pub fn mempool_remove(&self, hash: &Hash) {
        self.mempool.write().remove(hash);
    }

    pub fn mempool_snapshot(&self) -> Vec<Hash> {
        self.mempool.read().iter().copied().collect()
    }
}
