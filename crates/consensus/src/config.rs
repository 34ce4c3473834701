// consensus/src/config.rs

use dag_crypto::Hash;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Weight comparisons within this tolerance (in bits) are treated as tied.
pub const DEFAULT_WEIGHT_TOL: f64 = 1e-10;

/// Sentinel hash standing in for "the soft-void list" in a voided_by set, so
/// a record can be told apart from "voided because of a concrete ancestor"
/// versus "voided because an operator soft-voided it directly".
pub fn soft_voided_sentinel() -> Hash {
    Hash::zero()
}

/// Construction-time configuration for a `ConsensusDriver`, held immutably
/// for the life of the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Transaction hashes an operator has chosen to void regardless of
    /// proof-of-work. Voidance from this list flows through the funds DAG
    /// but is filtered out of the verification DAG (see `soft_void`).
    pub soft_voided_tx_ids: HashSet<Hash>,

    /// Weight-comparison tolerance; differences smaller than this are ties.
    pub weight_tol: f64,

    /// Re-run the full-DAG `assert_valid_consensus` scan after every update,
    /// not just the cheap single-record check. Expensive; intended for
    /// tests and debugging, not production nodes.
    pub slow_asserts: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            soft_voided_tx_ids: HashSet::new(),
            weight_tol: DEFAULT_WEIGHT_TOL,
            slow_asserts: false,
        }
    }
}
