// storage/src/storage_impl.rs
//
// Ties `Database` (persisted records/metadata), `RecordCache`/`MetadataCache`
// (hot-path reads) and `Indexes` (derived, cheap-to-rebuild state) together
// behind the `consensus::ConsensusStorage` trait.

use crate::cache::{MetadataCache, RecordCache};
use crate::db::{Database, DatabaseConfig};
use crate::indexes::Indexes;
use consensus::{ConsensusError, ConsensusResult, ConsensusStorage};
use dag_core::{BlockHeight, Hash, Metadata, Record, Timestamp};

const DEFAULT_CACHE_CAPACITY: usize = 16_384;

pub struct RocksConsensusStorage {
    db: Database,
    records: RecordCache,
    metadata: MetadataCache,
    indexes: Indexes,
}

impl RocksConsensusStorage {
    pub fn open(config: DatabaseConfig) -> ConsensusResult<Self> {
        let db = Database::open(config).map_err(|e| ConsensusError::Storage(e.to_string()))?;
        let storage = Self {
            db,
            records: RecordCache::new(DEFAULT_CACHE_CAPACITY),
            metadata: MetadataCache::new(DEFAULT_CACHE_CAPACITY),
            indexes: Indexes::new(),
        };
        storage.rebuild_indexes()?;
        Ok(storage)
    }

    /// Insert a brand-new record and its freshly-initialized metadata.
    /// Called once per record before `ConsensusDriver::update` runs the
    /// algorithms against it.
    pub fn insert_record(&self, record: Record) -> ConsensusResult<()> {
        let hash = record.hash;
        for parent in record.parents() {
            self.indexes.register_parent(parent, hash);
        }
        let meta = Metadata::new(&record);
        self.db.put_metadata(&hash, &meta).map_err(|e| ConsensusError::Storage(e.to_string()))?;
        self.db.put_record(&record).map_err(|e| ConsensusError::Storage(e.to_string()))?;
        self.metadata.insert(hash, meta);
        self.records.insert(hash, record);
        self.indexes.add_tip_candidate(hash);
        Ok(())
    }

    pub fn mark_pending(&self, hash: Hash) {
        self.indexes.mempool_insert(hash);
    }

    /// Rebuild the verification-children index and tip-candidate set from
    /// persisted state. Run once at startup; everything else in `Indexes`
    /// is cache-only and does not need recovery.
    fn rebuild_indexes(&self) -> ConsensusResult<()> {
        let hashes = self.db.iter_record_hashes().map_err(|e| ConsensusError::Storage(e.to_string()))?;
        for hash in &hashes {
            let Some(record) = self.db.get_record(hash).map_err(|e| ConsensusError::Storage(e.to_string()))? else {
                continue;
            };
            for parent in record.parents() {
                self.indexes.register_parent(parent, *hash);
            }
        }
        for hash in &hashes {
            let meta = self.get_metadata(hash)?;
            if meta.is_executed() {
                self.indexes.add_tip_candidate(*hash);
            }
        }
        Ok(())
    }
}

impl ConsensusStorage for RocksConsensusStorage {
    fn get_record(&self, hash: &Hash) -> ConsensusResult<Record> {
        if let Some(record) = self.records.get(hash) {
            return Ok(record);
        }
        let record = self
            .db
            .get_record(hash)
            .map_err(|e| ConsensusError::Storage(e.to_string()))?
            .ok_or_else(|| ConsensusError::missing_record(*hash))?;
        self.records.insert(*hash, record.clone());
        Ok(record)
    }

    fn get_metadata(&self, hash: &Hash) -> ConsensusResult<Metadata> {
        if let Some(meta) = self.metadata.get(hash) {
            return Ok(meta);
        }
        let meta = self
            .db
            .get_metadata(hash)
            .map_err(|e| ConsensusError::Storage(e.to_string()))?
            .ok_or_else(|| ConsensusError::missing_metadata(*hash))?;
        self.metadata.insert(*hash, meta.clone());
        Ok(meta)
    }

    fn save_metadata(&self, hash: &Hash, metadata: Metadata) -> ConsensusResult<()> {
        self.db.put_metadata(hash, &metadata).map_err(|e| ConsensusError::Storage(e.to_string()))?;
        self.metadata.invalidate(hash);
        self.metadata.insert(*hash, metadata);
        Ok(())
    }

    fn verification_children(&self, hash: &Hash) -> ConsensusResult<Vec<Hash>> {
        Ok(self.indexes.verification_children(hash))
    }

    fn best_block_tips(&self, skip_cache: bool) -> ConsensusResult<Vec<Hash>> {
        if !skip_cache {
            if let Some(tips) = self.indexes.best_tips() {
                return Ok(tips);
            }
        }

        let mut best_score = None;
        let mut best_heads = Vec::new();
        for candidate in self.indexes.tip_candidates() {
            let meta = self.get_metadata(&candidate)?;
            if !meta.is_executed() {
                continue;
            }
            let Some(score) = meta.score else { continue };
            match best_score {
                None => {
                    best_score = Some(score);
                    best_heads = vec![candidate];
                }
                Some(existing) if score > existing => {
                    best_score = Some(score);
                    best_heads = vec![candidate];
                }
                Some(existing) if score == existing => best_heads.push(candidate),
                _ => {}
            }
        }

        self.indexes.set_best_tips(Some(best_heads.clone()));
        Ok(best_heads)
    }

    fn update_best_block_tips_cache(&self, tips: Option<Vec<Hash>>) -> ConsensusResult<()> {
        self.indexes.set_best_tips(tips);
        Ok(())
    }

    fn height_tip(&self) -> ConsensusResult<(BlockHeight, Hash)> {
        self.indexes
            .height_tip()
            .ok_or_else(|| ConsensusError::invariant("no blocks indexed by height yet"))
    }

    fn add_height(&self, height: BlockHeight, hash: Hash, _timestamp: Timestamp) -> ConsensusResult<()> {
        self.indexes.push_height(height, hash);
        Ok(())
    }

    fn update_new_chain(&self, height: BlockHeight, hash: Hash) -> ConsensusResult<()> {
        self.indexes.push_height(height, hash);
        Ok(())
    }

    fn add_to_indexes(&self, hash: &Hash) -> ConsensusResult<()> {
        self.indexes.add_tip_candidate(*hash);
        Ok(())
    }

    fn del_from_indexes(&self, hash: &Hash, relax_assert: bool) -> ConsensusResult<()> {
        let removed = self.indexes.remove_tip_candidate(hash);
        if !removed && !relax_assert {
            return Err(ConsensusError::invariant("del_from_indexes called on a non-indexed record"));
        }
        Ok(())
    }

    fn update_indexes(&self, _hash: &Hash) -> ConsensusResult<()> {
        Ok(())
    }

    fn transactions_that_became_invalid(&self) -> ConsensusResult<Vec<Hash>> {
        let mut invalid = Vec::new();
        for hash in self.indexes.mempool_snapshot() {
            let meta = self.get_metadata(&hash)?;
            if meta.is_voided() {
                invalid.push(hash);
            }
        }
        Ok(invalid)
    }

    fn remove_transactions(&self, hashes: &[Hash]) -> ConsensusResult<()> {
        for hash in hashes {
            self.indexes.mempool_remove(hash);
        }
        Ok(())
    }
}
