// dag-core/src/metadata.rs

use crate::record::Record;
use crate::types::{BlockHeight, Weight};
use dag_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Mutable consensus state attached to a record. A record's immutable fields
/// live in `Record`; everything consensus ever changes lives here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Set of hashes responsible for voiding this record. `None` means
    /// executed. A record voiding itself (due to a losing conflict, or being
    /// off the best chain) carries its own hash in this set.
    pub voided_by: Option<HashSet<Hash>>,

    /// Other transactions this one double-spends against. Transactions only.
    /// Kept as an insertion-ordered list, not a set, to match the order
    /// conflicts were first observed in.
    pub conflict_with: Vec<Hash>,

    /// Transactions that are structurally identical modulo witness data.
    pub twins: Vec<Hash>,

    /// For each of this record's outputs, the transactions that spend it, in
    /// the order they arrived.
    pub spent_outputs: HashMap<u32, Vec<Hash>>,

    /// The first best-chain block that (transitively) confirms this
    /// transaction. Transactions only.
    pub first_block: Option<Hash>,

    /// Accumulated chain score at this block. Blocks only, monotonically
    /// increasing and never recomputed once set.
    pub score: Option<Weight>,

    /// Log-domain sum of the weights of every record that verifies or spends
    /// this one (including this record's own weight).
    pub accumulated_weight: Weight,

    /// Best-chain height. Blocks only.
    pub height: Option<BlockHeight>,

    /// Hashes of blocks whose block-parent is this block. Blocks only.
    pub children: HashSet<Hash>,
}

impl Metadata {
    pub fn new(record: &Record) -> Self {
        Self {
            voided_by: None,
            conflict_with: Vec::new(),
            twins: Vec::new(),
            spent_outputs: HashMap::new(),
            first_block: None,
            score: if record.is_genesis { Some(record.weight) } else { None },
            accumulated_weight: record.weight,
            height: if record.is_genesis { Some(0) } else { None },
            children: HashSet::new(),
        }
    }

    pub fn is_voided(&self) -> bool {
        self.voided_by.as_ref().is_some_and(|v| !v.is_empty())
    }

    pub fn is_executed(&self) -> bool {
        !self.is_voided()
    }
}
