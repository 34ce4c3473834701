// consensus/src/context.rs
//
// Threaded through every algorithm call by reference instead of living as
// global mutable state, per the concurrency model: one `Context` per
// `ConsensusDriver::update` call, discarded once that update returns.

use crate::config::ConsensusConfig;
use crate::error::ConsensusResult;
use crate::storage::ConsensusStorage;
use dag_core::{Hash, Metadata};
use std::cell::RefCell;
use std::collections::HashSet;

pub struct Context<'s> {
    pub storage: &'s dyn ConsensusStorage,
    pub config: &'s ConsensusConfig,
    affected: RefCell<HashSet<Hash>>,
}

impl<'s> Context<'s> {
    pub fn new(storage: &'s dyn ConsensusStorage, config: &'s ConsensusConfig) -> Self {
        Self {
            storage,
            config,
            affected: RefCell::new(HashSet::new()),
        }
    }

    /// Persist a record's metadata and remember it as affected by this
    /// update, so the driver knows what to republish once it finishes.
    pub fn save(&self, hash: Hash, metadata: Metadata) -> ConsensusResult<()> {
        self.storage.save_metadata(&hash, metadata)?;
        self.affected.borrow_mut().insert(hash);
        Ok(())
    }

    pub fn affected(&self) -> Vec<Hash> {
        self.affected.borrow().iter().copied().collect()
    }
}
