// consensus/src/storage.rs
//
// The storage surface consensus consumes. This crate defines the trait;
// concrete implementations (in-memory, RocksDB-backed) live in the
// `storage` crate so this crate stays free of any particular persistence
// choice.

use crate::error::ConsensusResult;
use dag_core::{BlockHeight, Hash, Metadata, Record, Timestamp};

/// Everything the consensus algorithms need from the record store. Every
/// method is synchronous: an `update` call runs to completion against one
/// storage snapshot with no suspension points, per the concurrency model.
pub trait ConsensusStorage: Send + Sync {
    fn get_record(&self, hash: &Hash) -> ConsensusResult<Record>;
    fn get_metadata(&self, hash: &Hash) -> ConsensusResult<Metadata>;
    fn save_metadata(&self, hash: &Hash, metadata: Metadata) -> ConsensusResult<()>;

    /// Records reachable from `hash` via the verification DAG followed
    /// forward: other records that list `hash` directly as a parent.
    fn verification_children(&self, hash: &Hash) -> ConsensusResult<Vec<Hash>>;

    /// Current best-chain tip(s). More than one entry means an unresolved
    /// tie between equal-score chains. `skip_cache` forces recomputation.
    fn best_block_tips(&self, skip_cache: bool) -> ConsensusResult<Vec<Hash>>;
    fn update_best_block_tips_cache(&self, tips: Option<Vec<Hash>>) -> ConsensusResult<()>;

    /// Height and hash of the current best-chain tip.
    fn height_tip(&self) -> ConsensusResult<(BlockHeight, Hash)>;
    fn add_height(&self, height: BlockHeight, hash: Hash, timestamp: Timestamp) -> ConsensusResult<()>;
    fn update_new_chain(&self, height: BlockHeight, hash: Hash) -> ConsensusResult<()>;

    /// Add/remove a record from the indexes that track tip candidacy
    /// (mempool membership, best-tip eligibility). `relax_assert` tells the
    /// implementation not to panic if the record was already absent, which
    /// happens legitimately during chain-voiding walks.
    fn add_to_indexes(&self, hash: &Hash) -> ConsensusResult<()>;
    fn del_from_indexes(&self, hash: &Hash, relax_assert: bool) -> ConsensusResult<()>;

    /// Refresh any secondary indexes (e.g. address/score indexes) for a
    /// record whose metadata changed this update, independent of its
    /// tip-candidacy status.
    fn update_indexes(&self, hash: &Hash) -> ConsensusResult<()>;

    /// Mempool transactions that are no longer confirmable given the
    /// current best chain (inputs that point at now-voided outputs).
    fn transactions_that_became_invalid(&self) -> ConsensusResult<Vec<Hash>>;
    fn remove_transactions(&self, hashes: &[Hash]) -> ConsensusResult<()>;
}

/// A single notification the driver hands to `PubSub` once an update
/// finishes and every mutation is persisted.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    RecordUpdated { record: Record },
    TransactionRemoved { tx_hash: Hash },
}

/// The topic bus consensus publishes to. Consensus never subscribes; it
/// only announces what changed.
pub trait PubSub: Send + Sync {
    fn publish(&self, event: ConsensusEvent);
}
