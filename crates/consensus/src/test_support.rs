// consensus/src/test_support.rs
//
// A minimal in-memory `ConsensusStorage` used only by this crate's own
// tests, so `block_consensus`/`tx_consensus`/`driver` tests don't each
// reinvent a fake store. Not exported outside `#[cfg(test)]`.

#![cfg(test)]

use crate::error::{ConsensusError, ConsensusResult};
use crate::storage::ConsensusStorage;
use dag_core::{BlockHeight, Hash, Metadata, Record, Timestamp};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct FakeStorage {
    records: RwLock<HashMap<Hash, Record>>,
    metadata: RwLock<HashMap<Hash, Metadata>>,
    verification_children: RwLock<HashMap<Hash, Vec<Hash>>>,
    best_tips: RwLock<Option<Vec<Hash>>>,
    height_index: RwLock<Vec<(BlockHeight, Hash)>>,
    indexed: RwLock<std::collections::HashSet<Hash>>,
    mempool: RwLock<std::collections::HashSet<Hash>>,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, its freshly-initialized metadata, and register it as
    /// a verification child of each of its parents.
    pub fn insert(&self, record: Record) {
        let hash = record.hash;
        for parent in record.parents() {
            self.verification_children
                .write()
                .unwrap()
                .entry(parent)
                .or_default()
                .push(hash);
        }
        if let dag_core::RecordKind::Block(fields) = &record.kind {
            if !record.is_genesis {
                let mut metadata = self.metadata.write().unwrap();
                if let Some(parent_meta) = metadata.get_mut(&fields.block_parent) {
                    parent_meta.children.insert(hash);
                }
            }
        }
        let meta = Metadata::new(&record);
        self.metadata.write().unwrap().insert(hash, meta);
        self.indexed.write().unwrap().insert(hash);
        self.records.write().unwrap().insert(hash, record);
    }

    pub fn metadata_of(&self, hash: &Hash) -> Metadata {
        self.metadata.read().unwrap().get(hash).cloned().unwrap()
    }

    pub fn is_indexed(&self, hash: &Hash) -> bool {
        self.indexed.read().unwrap().contains(hash)
    }
}

impl ConsensusStorage for FakeStorage {
    fn get_record(&self, hash: &Hash) -> ConsensusResult<Record> {
        self.records
            .read()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| ConsensusError::missing_record(*hash))
    }

    fn get_metadata(&self, hash: &Hash) -> ConsensusResult<Metadata> {
        self.metadata
            .read()
            .unwrap()
            .get(hash)
            .cloned()
            .ok_or_else(|| ConsensusError::missing_metadata(*hash))
    }

    fn save_metadata(&self, hash: &Hash, metadata: Metadata) -> ConsensusResult<()> {
        self.metadata.write().unwrap().insert(*hash, metadata);
        Ok(())
    }

    fn verification_children(&self, hash: &Hash) -> ConsensusResult<Vec<Hash>> {
        Ok(self.verification_children.read().unwrap().get(hash).cloned().unwrap_or_default())
    }

    fn best_block_tips(&self, _skip_cache: bool) -> ConsensusResult<Vec<Hash>> {
        Ok(self.best_tips.read().unwrap().clone().unwrap_or_default())
    }

    fn update_best_block_tips_cache(&self, tips: Option<Vec<Hash>>) -> ConsensusResult<()> {
        *self.best_tips.write().unwrap() = tips;
        Ok(())
    }

    fn height_tip(&self) -> ConsensusResult<(BlockHeight, Hash)> {
        self.height_index
            .read()
            .unwrap()
            .last()
            .copied()
            .ok_or_else(|| ConsensusError::invariant("no blocks indexed by height yet"))
    }

    fn add_height(&self, height: BlockHeight, hash: Hash, _timestamp: Timestamp) -> ConsensusResult<()> {
        self.height_index.write().unwrap().push((height, hash));
        Ok(())
    }

    fn update_new_chain(&self, height: BlockHeight, hash: Hash) -> ConsensusResult<()> {
        self.height_index.write().unwrap().push((height, hash));
        Ok(())
    }

    fn add_to_indexes(&self, hash: &Hash) -> ConsensusResult<()> {
        self.indexed.write().unwrap().insert(*hash);
        Ok(())
    }

    fn del_from_indexes(&self, hash: &Hash, _relax_assert: bool) -> ConsensusResult<()> {
        self.indexed.write().unwrap().remove(hash);
        Ok(())
    }

    fn update_indexes(&self, _hash: &Hash) -> ConsensusResult<()> {
        Ok(())
    }

    fn transactions_that_became_invalid(&self) -> ConsensusResult<Vec<Hash>> {
        Ok(self.mempool.read().unwrap().iter().copied().collect())
    }

    fn remove_transactions(&self, hashes: &[Hash]) -> ConsensusResult<()> {
        let mut mempool = self.mempool.write().unwrap();
        for h in hashes {
            mempool.remove(h);
        }
        Ok(())
    }
}

pub fn hash_from_byte(b: u8) -> Hash {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Hash::new(bytes)
}
