// node/src/runtime.rs
use crate::NodeConfig;
use consensus::{ConsensusDriver, ConsensusResult};
use dag_core::{Hash, Record};
use storage::{BroadcastPubSub, DatabaseConfig, RocksConsensusStorage};
use std::sync::Arc;

/// Channel capacity for the consensus event broadcast. Subscribers that fall
/// this far behind drop events rather than block the consensus thread.
const PUBSUB_CAPACITY: usize = 1024;

/// The running node: storage, pub/sub, and the consensus driver wired
/// together. Owns no networking or RPC surface; callers drive it by
/// submitting records and reading back tips/metadata through `storage()`.
pub struct Node {
    config: NodeConfig,
    storage: Arc<RocksConsensusStorage>,
    pubsub: Arc<BroadcastPubSub>,
    consensus: ConsensusDriver,
}

impl Node {
    pub fn new(config: NodeConfig) -> anyhow::Result<Self> {
        tracing::info!("initializing node components");

        let db_config = DatabaseConfig {
            path: config.database_path(),
            create_if_missing: true,
            max_open_files: config.storage.max_open_files,
            write_buffer_size: config.storage.write_buffer_size,
            max_write_buffer_number: config.storage.max_write_buffer_number,
        };
        let storage = Arc::new(RocksConsensusStorage::open(db_config)?);
        let pubsub = Arc::new(BroadcastPubSub::new(PUBSUB_CAPACITY));
        let consensus = ConsensusDriver::new(storage.clone(), pubsub.clone(), config.consensus.clone());

        tracing::info!("node components initialized");

        Ok(Self { config, storage, pubsub, consensus })
    }

    /// Ensure the genesis block exists, creating and running it through
    /// consensus on first start. Idempotent across restarts.
    pub fn ensure_genesis(&self) -> anyhow::Result<()> {
        let genesis_hash = Hash::zero();
        if self.storage.get_record(&genesis_hash).is_ok() {
            return Ok(());
        }
        let genesis = Record::genesis_block(genesis_hash, 1.0, 0);
        self.storage.insert_record(genesis)?;
        self.consensus.update(&genesis_hash)?;
        tracing::info!("genesis block initialized");
        Ok(())
    }

    /// Insert a new record and run it through consensus.
    pub fn submit_record(&self, record: Record) -> ConsensusResult<()> {
        let hash = record.hash;
        let is_transaction = record.is_transaction();
        self.storage
            .insert_record(record)
            .map_err(|e| consensus::ConsensusError::Storage(e.to_string()))?;
        if is_transaction {
            self.storage.mark_pending(hash);
        }
        self.consensus.update(&hash)
    }

    /// Like `submit_record`, but for callers with no recovery path of their
    /// own. A `ConsensusError::Invariant`/`Precondition` means on-disk state
    /// and in-memory metadata have diverged in a way this node cannot
    /// reason about further; rather than keep serving reads against
    /// possibly-inconsistent state, log and terminate so a supervisor
    /// restarts against the last persisted snapshot.
    pub fn apply_or_abort(&self, record: Record) {
        if let Err(err) = self.submit_record(record) {
            tracing::error!(error = %err, "consensus update failed fatally, aborting");
            std::process::abort();
        }
    }

    pub fn storage(&self) -> &Arc<RocksConsensusStorage> {
        &self.storage
    }

    pub fn pubsub(&self) -> &Arc<BroadcastPubSub> {
        &self.pubsub
    }

    pub fn consensus(&self) -> &ConsensusDriver {
        &self.consensus
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Height and hash of the current best block tip, for the `status` CLI
    /// command.
    pub fn status(&self) -> anyhow::Result<NodeStatus> {
        let tips = self
            .storage
            .best_block_tips(false)
            .map_err(|e| anyhow::anyhow!("failed to read best tips: {e}"))?;
        let (height, _) = self.storage.height_tip().unwrap_or((0, Hash::zero()));
        Ok(NodeStatus { height, best_tips: tips })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct NodeStatus {
    pub height: dag_core::BlockHeight,
    pub best_tips: Vec<Hash>,
}
