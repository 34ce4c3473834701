// consensus/src/driver.rs
//
// The public entry point: one `update` call per record, in arrival order.
// Builds a fresh `Context`, dispatches to the block or transaction
// algorithm, detects whether the update caused a reorg by height
// regression, evicts mempool transactions the reorg invalidated, and
// publishes everything that changed.

use crate::block_consensus::BlockConsensus;
use crate::config::ConsensusConfig;
use crate::context::Context;
use crate::error::ConsensusResult;
use crate::storage::{ConsensusEvent, ConsensusStorage, PubSub};
use crate::tx_consensus::TransactionConsensus;
use dag_core::Hash;
use std::sync::Arc;
use tracing::{debug_span, warn};

/// Runs the consensus algorithm against a storage backend and announces
/// every record it touches over a `PubSub`.
pub struct ConsensusDriver {
    storage: Arc<dyn ConsensusStorage>,
    pubsub: Arc<dyn PubSub>,
    config: ConsensusConfig,
}

impl ConsensusDriver {
    pub fn new(storage: Arc<dyn ConsensusStorage>, pubsub: Arc<dyn PubSub>, config: ConsensusConfig) -> Self {
        Self { storage, pubsub, config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Run consensus for a single newly-arrived record. Must be called once
    /// per record, in an order consistent with the verification DAG (a
    /// record's parents before the record itself).
    pub fn update(&self, record_hash: &Hash) -> ConsensusResult<()> {
        let _span = debug_span!("consensus_update", hash = %record_hash).entered();

        let before = self.storage.height_tip().ok();

        let ctx = Context::new(self.storage.as_ref(), &self.config);
        let record = self.storage.get_record(record_hash)?;
        if record.is_block() {
            BlockConsensus::update(&ctx, record_hash)?;
        } else {
            TransactionConsensus::update(&ctx, record_hash)?;
        }

        if let (Some((before_height, before_tip)), Ok((after_height, after_tip))) = (before, self.storage.height_tip()) {
            if after_height < before_height {
                warn!(
                    old_height = before_height,
                    old_tip = %before_tip,
                    new_height = after_height,
                    new_tip = %after_tip,
                    "best chain height regressed"
                );

                let invalidated = self.storage.transactions_that_became_invalid()?;
                if !invalidated.is_empty() {
                    warn!(count = invalidated.len(), "evicting transactions invalidated by reorg");
                    self.storage.remove_transactions(&invalidated)?;
                    for tx_hash in invalidated {
                        self.pubsub.publish(ConsensusEvent::TransactionRemoved { tx_hash });
                    }
                }
            }
        }

        for hash in ctx.affected() {
            self.storage.update_indexes(&hash)?;
            let record = self.storage.get_record(&hash)?;
            self.pubsub.publish(ConsensusEvent::RecordUpdated { record });
        }

        Ok(())
    }
}
