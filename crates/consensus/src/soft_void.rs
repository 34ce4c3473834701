// consensus/src/soft_void.rs
//
// An operator-maintained soft-void list lets a node treat specific
// transactions as permanently voided regardless of proof-of-work, without
// poisoning the verification DAG: a record that only inherits voidance
// because one of its ancestors spends/descends from a soft-voided
// transaction must not itself become unconfirmable for every descendant
// that merely *verifies* it. This filter is what keeps that containment: it
// strips soft-voided hashes (and the hashes of any other record that is
// itself only voided because of the soft-void list) out of a voided_by set
// before it crosses a verification edge.

use crate::config::{soft_voided_sentinel, ConsensusConfig};
use crate::error::ConsensusResult;
use crate::storage::ConsensusStorage;
use dag_core::Hash;
use std::collections::HashSet;

/// Filter `voided_by` (as inherited across a verification edge from
/// `source`) so that hashes whose only reason for being voided is the
/// soft-void list are dropped.
pub fn filter_soft_voided(
    storage: &dyn ConsensusStorage,
    config: &ConsensusConfig,
    source: &Hash,
    voided_by: &HashSet<Hash>,
) -> ConsensusResult<HashSet<Hash>> {
    if config.soft_voided_tx_ids.is_empty() {
        return Ok(voided_by.clone());
    }

    let mut out = HashSet::with_capacity(voided_by.len());
    for h in voided_by {
        if *h == soft_voided_sentinel() || h == source {
            continue;
        }
        if config.soft_voided_tx_ids.contains(h) {
            continue;
        }
        let other_meta = storage.get_metadata(h)?;
        let other_voided_by_soft_list = other_meta
            .voided_by
            .as_ref()
            .is_some_and(|v| !config.soft_voided_tx_ids.is_disjoint(v));
        if other_voided_by_soft_list {
            // `h` itself isn't soft-voided, but its own voided_by set
            // intersects the soft-void list (possibly alongside unrelated
            // causes); still suppress it across verification edges.
            continue;
        }
        out.insert(*h);
    }
    Ok(out)
}
