// consensus/src/tx_consensus.rs
//
// Everything that happens when a transaction joins the funds DAG: marking
// the outputs it spends as used, detecting double spends, inheriting
// voidance from parents and inputs, and resolving conflicts by accumulated
// proof-of-work once both sides of a double spend are known.

use crate::block_consensus::BlockConsensus;
use crate::config::soft_voided_sentinel;
use crate::context::Context;
use crate::error::{ConsensusError, ConsensusResult};
use crate::soft_void::filter_soft_voided;
use crate::walker::{recompute_accumulated_weight, BfsWalk};
use crate::weight::{compare_weights, sum_weights, WeightOrdering};
use dag_core::{Hash, Input, Output, Record};
use std::collections::HashSet;
use tracing::debug_span;

pub struct TransactionConsensus;

impl TransactionConsensus {
    pub fn update(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let _span = debug_span!("tx_consensus_update", hash = %tx_hash).entered();

        Self::mark_inputs_as_used(ctx, tx_hash)?;
        Self::update_voided_info(ctx, tx_hash)?;
        Self::set_conflict_twins(ctx, tx_hash)?;
        Ok(())
    }

    fn mark_inputs_as_used(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let record = ctx.storage.get_record(tx_hash)?;
        for input in record.inputs() {
            Self::mark_input_as_used(ctx, tx_hash, input)?;
        }
        Ok(())
    }

    fn mark_input_as_used(ctx: &Context, tx_hash: &Hash, input: &Input) -> ConsensusResult<()> {
        let mut spent_meta = ctx.storage.get_metadata(&input.tx_id)?;
        let spenders = spent_meta.spent_outputs.entry(input.index).or_default();

        if spenders.contains(tx_hash) {
            return Err(ConsensusError::precondition("transaction already spent this output"));
        }

        let existing_spenders = spenders.clone();
        spenders.push(*tx_hash);
        ctx.save(input.tx_id, spent_meta)?;

        if existing_spenders.is_empty() {
            return Ok(());
        }

        let mut tx_meta = ctx.storage.get_metadata(tx_hash)?;
        tx_meta.voided_by.get_or_insert_with(HashSet::new).insert(*tx_hash);
        for other in &existing_spenders {
            if !tx_meta.conflict_with.contains(other) {
                tx_meta.conflict_with.push(*other);
            }
        }
        ctx.save(*tx_hash, tx_meta)?;

        for other in &existing_spenders {
            let mut other_meta = ctx.storage.get_metadata(other)?;
            if !other_meta.conflict_with.contains(tx_hash) {
                other_meta.conflict_with.push(*tx_hash);
            }
            ctx.save(*other, other_meta)?;
        }

        Ok(())
    }

    fn update_voided_info(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let record = ctx.storage.get_record(tx_hash)?;

        let mut voided_by = HashSet::new();
        for parent in record.parents() {
            let parent_meta = ctx.storage.get_metadata(&parent)?;
            if let Some(parent_voided) = parent_meta.voided_by {
                if !parent_voided.is_empty() {
                    voided_by.extend(filter_soft_voided(ctx.storage, ctx.config, &parent, &parent_voided)?);
                }
            }
        }

        for input in record.inputs() {
            let input_meta = ctx.storage.get_metadata(&input.tx_id)?;
            if let Some(mut input_voided) = input_meta.voided_by {
                input_voided.remove(&soft_voided_sentinel());
                voided_by.extend(input_voided);
            }
        }

        if voided_by.contains(&soft_voided_sentinel()) {
            return Err(ConsensusError::invariant("soft-void sentinel leaked into a real voided_by set"));
        }

        for hash in &voided_by {
            let mut meta = ctx.storage.get_metadata(hash)?;
            meta.accumulated_weight = sum_weights(meta.accumulated_weight, record.weight);
            ctx.save(*hash, meta)?;
        }

        if ctx.config.soft_voided_tx_ids.contains(tx_hash) {
            voided_by.insert(soft_voided_sentinel());
            voided_by.insert(*tx_hash);
        }

        let mut meta = ctx.storage.get_metadata(tx_hash)?;
        if !meta.conflict_with.is_empty() {
            voided_by.insert(*tx_hash);
        }

        let became_self_voided_only = voided_by.len() == 1 && voided_by.contains(tx_hash);

        if !voided_by.is_empty() {
            meta.voided_by.get_or_insert_with(HashSet::new).extend(voided_by.iter().copied());
            ctx.save(*tx_hash, meta)?;
            ctx.storage.del_from_indexes(tx_hash, false)?;
        }

        for hash in &voided_by {
            if *hash == soft_voided_sentinel() {
                continue;
            }
            let hash_record = ctx.storage.get_record(hash)?;
            if hash_record.is_transaction() {
                Self::check_conflicts(ctx, hash)?;
            }
        }

        let conflict_with = ctx.storage.get_metadata(tx_hash)?.conflict_with;
        for other in &conflict_with {
            let other_meta = ctx.storage.get_metadata(other)?;
            if other_meta.is_voided() {
                Self::mark_as_voided(ctx, other)?;
            }
        }

        if became_self_voided_only {
            Self::check_conflicts(ctx, tx_hash)?;
        }

        Self::assert_valid_consensus(ctx, tx_hash)?;
        Ok(())
    }

    pub(crate) fn assert_valid_consensus(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let meta = ctx.storage.get_metadata(tx_hash)?;
        let self_executed = meta.is_executed();
        for other in &meta.conflict_with {
            let other_meta = ctx.storage.get_metadata(other)?;
            if self_executed && other_meta.is_executed() {
                return Err(ConsensusError::invariant("two conflicting transactions are both executed"));
            }
        }
        Ok(())
    }

    fn set_conflict_twins(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let meta = ctx.storage.get_metadata(tx_hash)?;
        if meta.conflict_with.is_empty() {
            return Ok(());
        }
        let record = ctx.storage.get_record(tx_hash)?;

        for other_hash in meta.conflict_with.clone() {
            let other_record = ctx.storage.get_record(&other_hash)?;
            if Self::are_twins(&record, &other_record) {
                let mut mine = ctx.storage.get_metadata(tx_hash)?;
                if !mine.twins.contains(&other_hash) {
                    mine.twins.push(other_hash);
                    ctx.save(*tx_hash, mine)?;
                }
                let mut theirs = ctx.storage.get_metadata(&other_hash)?;
                if !theirs.twins.contains(tx_hash) {
                    theirs.twins.push(*tx_hash);
                    ctx.save(other_hash, theirs)?;
                }
            }
        }
        Ok(())
    }

    fn are_twins(a: &Record, b: &Record) -> bool {
        let mut a_inputs: Vec<&Input> = a.inputs().iter().collect();
        let mut b_inputs: Vec<&Input> = b.inputs().iter().collect();
        if a_inputs.len() != b_inputs.len() {
            return false;
        }
        a_inputs.sort();
        b_inputs.sort();
        if a_inputs != b_inputs {
            return false;
        }

        let mut a_outputs: Vec<&Output> = a.outputs().iter().collect();
        let mut b_outputs: Vec<&Output> = b.outputs().iter().collect();
        if a_outputs.len() != b_outputs.len() {
            return false;
        }
        a_outputs.sort();
        b_outputs.sort();
        a_outputs == b_outputs
    }

    pub(crate) fn check_conflicts(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let meta = ctx.storage.get_metadata(tx_hash)?;
        let is_self_voided_only = meta.voided_by.as_ref().is_some_and(|v| v.len() == 1 && v.contains(tx_hash));
        if !is_self_voided_only {
            return Ok(());
        }

        let candidates: Vec<Hash> = meta
            .conflict_with
            .iter()
            .copied()
            .filter(|h| {
                ctx.storage
                    .get_metadata(h)
                    .map(|m| match m.voided_by {
                        None => true,
                        Some(v) => v.len() == 1 && v.contains(h),
                    })
                    .unwrap_or(false)
            })
            .collect();

        let mut tie_list = Vec::new();
        for candidate in &candidates {
            let candidate_meta = ctx.storage.get_metadata(candidate)?;
            if candidate_meta.is_voided() && candidate_meta.accumulated_weight > meta.accumulated_weight {
                return Ok(());
            }
            if candidate_meta.is_executed() {
                let candidate_weight = recompute_accumulated_weight(ctx.storage, *candidate, Some(meta.accumulated_weight), ctx.config.weight_tol)?;
                match compare_weights(candidate_weight, meta.accumulated_weight, ctx.config.weight_tol) {
                    WeightOrdering::Greater => return Ok(()),
                    WeightOrdering::Tied => tie_list.push(*candidate),
                    WeightOrdering::Less => {}
                }
            }
        }

        for candidate in &meta.conflict_with {
            Self::mark_as_voided(ctx, candidate)?;
        }

        if tie_list.is_empty() {
            Self::mark_as_winner(ctx, tx_hash)?;
        }

        Ok(())
    }

    fn mark_as_winner(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let meta = ctx.storage.get_metadata(tx_hash)?;
        if meta.conflict_with.is_empty() {
            return Err(ConsensusError::precondition("mark_as_winner called on a transaction with no conflicts"));
        }
        let is_self_voided_only = meta.voided_by.as_ref().is_some_and(|v| v.len() == 1 && v.contains(tx_hash));
        if !is_self_voided_only {
            return Err(ConsensusError::invariant("mark_as_winner called on a transaction not exactly self-voided"));
        }
        if ctx.config.soft_voided_tx_ids.contains(tx_hash) {
            return Err(ConsensusError::invariant("mark_as_winner called on a soft-voided transaction"));
        }

        Self::remove_voided_by(ctx, tx_hash, tx_hash)?;
        Self::assert_valid_consensus(ctx, tx_hash)?;
        Ok(())
    }

    pub(crate) fn mark_as_voided(ctx: &Context, tx_hash: &Hash) -> ConsensusResult<()> {
        let meta = ctx.storage.get_metadata(tx_hash)?;
        if meta.voided_by.as_ref().is_some_and(|v| v.contains(tx_hash)) {
            return Ok(());
        }
        Self::add_voided_by(ctx, tx_hash, tx_hash)?;
        Self::assert_valid_consensus(ctx, tx_hash)?;
        Ok(())
    }

    pub(crate) fn add_voided_by(ctx: &Context, tx_hash: &Hash, voided_hash: &Hash) -> ConsensusResult<bool> {
        let root_meta = ctx.storage.get_metadata(tx_hash)?;
        if root_meta.voided_by.as_ref().is_some_and(|v| v.contains(voided_hash)) {
            return Ok(false);
        }

        let is_soft_voided = root_meta
            .voided_by
            .as_ref()
            .is_some_and(|v| !ctx.config.soft_voided_tx_ids.is_disjoint(v));
        let is_dag_verifications = !is_soft_voided;
        let mut walk = BfsWalk::new(ctx.storage, is_dag_verifications, true, true).run(*tx_hash, false)?;

        let mut check_list = Vec::new();
        let mut first = true;
        while let Some(hash) = walk.next_node()? {
            let record = ctx.storage.get_record(&hash)?;
            if record.is_block() {
                BlockConsensus::mark_as_voided(ctx, &hash)?;
                ctx.storage.update_best_block_tips_cache(None)?;
                first = false;
                continue;
            }

            let mut meta = ctx.storage.get_metadata(&hash)?;
            if meta.voided_by.as_ref().is_some_and(|v| v.contains(voided_hash)) {
                return Err(ConsensusError::invariant("add_voided_by revisited an already-voided node"));
            }

            if !first && !meta.conflict_with.is_empty() && !meta.is_voided() {
                check_list.extend(meta.conflict_with.iter().copied());
            }

            meta.voided_by.get_or_insert_with(HashSet::new).insert(*voided_hash);

            let has_conflicts = !meta.conflict_with.is_empty();
            ctx.save(hash, meta)?;
            ctx.storage.del_from_indexes(&hash, true)?;

            if has_conflicts {
                Self::mark_as_voided(ctx, &hash)?;
                let recomputed = recompute_accumulated_weight(ctx.storage, hash, None, ctx.config.weight_tol)?;
                let mut meta = ctx.storage.get_metadata(&hash)?;
                meta.accumulated_weight = recomputed;
                ctx.save(hash, meta)?;
            }

            Self::assert_valid_consensus(ctx, &hash)?;
            first = false;
        }

        for hash in check_list {
            Self::check_conflicts(ctx, &hash)?;
        }

        Ok(true)
    }

    pub(crate) fn remove_voided_by(ctx: &Context, tx_hash: &Hash, voided_hash: &Hash) -> ConsensusResult<bool> {
        let root_meta = ctx.storage.get_metadata(tx_hash)?;
        if !root_meta.voided_by.as_ref().is_some_and(|v| v.contains(voided_hash)) {
            return Ok(false);
        }

        let mut walk = BfsWalk::new(ctx.storage, true, true, true).run(*tx_hash, false)?;
        let mut check_list = Vec::new();

        while let Some(hash) = walk.next_node()? {
            let mut meta = ctx.storage.get_metadata(&hash)?;
            let Some(set) = meta.voided_by.as_mut() else {
                walk.skip_neighbors(&hash);
                continue;
            };
            if !set.remove(voided_hash) {
                walk.skip_neighbors(&hash);
                continue;
            }

            if set.len() == 1 && set.contains(&hash) {
                check_list.push(hash);
            }
            if set.is_empty() {
                meta.voided_by = None;
                ctx.save(hash, meta)?;
                ctx.storage.add_to_indexes(&hash)?;
            } else {
                ctx.save(hash, meta)?;
            }

            Self::assert_valid_consensus(ctx, &hash)?;
        }

        for hash in check_list {
            Self::check_conflicts(ctx, &hash)?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_consensus::BlockConsensus;
    use crate::config::ConsensusConfig;
    use crate::test_support::{hash_from_byte, FakeStorage};
    use dag_core::Amount;

    fn setup_genesis(storage: &FakeStorage, ctx: &Context) -> Hash {
        let genesis = hash_from_byte(0);
        storage.insert(Record::genesis_block(genesis, 1.0, 0));
        BlockConsensus::update(ctx, &genesis).unwrap();
        genesis
    }

    #[test]
    fn test_double_spend_is_detected_as_conflict() {
        let storage = FakeStorage::new();
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        let genesis = setup_genesis(&storage, &ctx);

        let funding = hash_from_byte(1);
        storage.insert(Record::new_transaction(
            funding,
            1.0,
            10,
            vec![genesis],
            vec![],
            vec![Output { value: Amount::from_u64(100), script: vec![1] }],
        ));
        TransactionConsensus::update(&ctx, &funding).unwrap();

        let spend_a = hash_from_byte(2);
        storage.insert(Record::new_transaction(
            spend_a,
            1.0,
            11,
            vec![funding],
            vec![Input { tx_id: funding, index: 0, data: vec![1] }],
            vec![],
        ));
        TransactionConsensus::update(&ctx, &spend_a).unwrap();

        let spend_b = hash_from_byte(3);
        storage.insert(Record::new_transaction(
            spend_b,
            1.0,
            12,
            vec![funding],
            vec![Input { tx_id: funding, index: 0, data: vec![2] }],
            vec![],
        ));
        TransactionConsensus::update(&ctx, &spend_b).unwrap();

        let meta_a = storage.metadata_of(&spend_a);
        let meta_b = storage.metadata_of(&spend_b);
        assert!(meta_a.conflict_with.contains(&spend_b));
        assert!(meta_b.conflict_with.contains(&spend_a));
        assert!(meta_a.is_voided());
        assert!(meta_b.is_voided());
    }

    /// Scenario 5, second half: once both sides of a double spend are tied
    /// and self-voided, a later transaction verifying one side tips its
    /// accumulated weight over the tolerance and it wins outright.
    #[test]
    fn test_tied_double_spend_resolves_once_one_side_gains_weight() {
        let storage = FakeStorage::new();
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        let genesis = setup_genesis(&storage, &ctx);

        let funding = hash_from_byte(1);
        storage.insert(Record::new_transaction(
            funding,
            1.0,
            10,
            vec![genesis],
            vec![],
            vec![Output { value: Amount::from_u64(100), script: vec![1] }],
        ));
        TransactionConsensus::update(&ctx, &funding).unwrap();

        let spend_a = hash_from_byte(2);
        storage.insert(Record::new_transaction(
            spend_a,
            1.0,
            11,
            vec![funding],
            vec![Input { tx_id: funding, index: 0, data: vec![1] }],
            vec![],
        ));
        TransactionConsensus::update(&ctx, &spend_a).unwrap();

        let spend_b = hash_from_byte(3);
        storage.insert(Record::new_transaction(
            spend_b,
            1.0,
            12,
            vec![funding],
            vec![Input { tx_id: funding, index: 0, data: vec![2] }],
            vec![],
        ));
        TransactionConsensus::update(&ctx, &spend_b).unwrap();

        assert!(storage.metadata_of(&spend_a).is_voided());
        assert!(storage.metadata_of(&spend_b).is_voided());

        // t3 verifies spend_a only, adding its weight to spend_a's side.
        let t3 = hash_from_byte(4);
        storage.insert(Record::new_transaction(t3, 5.0, 13, vec![spend_a], vec![], vec![]));
        TransactionConsensus::update(&ctx, &t3).unwrap();

        let meta_a = storage.metadata_of(&spend_a);
        let meta_b = storage.metadata_of(&spend_b);
        assert!(meta_a.is_executed());
        assert_eq!(meta_b.voided_by, Some(HashSet::from([spend_b])));
    }

    #[test]
    fn test_spending_same_output_twice_from_same_tx_is_rejected() {
        let storage = FakeStorage::new();
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        let genesis = setup_genesis(&storage, &ctx);

        let funding = hash_from_byte(1);
        storage.insert(Record::new_transaction(
            funding,
            1.0,
            10,
            vec![genesis],
            vec![],
            vec![Output { value: Amount::from_u64(100), script: vec![1] }],
        ));
        TransactionConsensus::update(&ctx, &funding).unwrap();

        let input = Input { tx_id: funding, index: 0, data: vec![1] };
        let spend = hash_from_byte(2);
        storage.insert(Record::new_transaction(spend, 1.0, 11, vec![funding], vec![input.clone()], vec![]));
        TransactionConsensus::update(&ctx, &spend).unwrap();

        let err = TransactionConsensus::mark_input_as_used(&ctx, &spend, &input).unwrap_err();
        assert!(matches!(err, ConsensusError::Precondition(_)));
    }

    /// Scenario 6: soft-voiding `s` must reach a descendant through the
    /// funds edge (spending `s`'s output) but not through a pure
    /// verification edge, and the sentinel must be stripped on the way.
    #[test]
    fn test_soft_void_propagates_funds_only_not_verification() {
        let storage = FakeStorage::new();
        let mut config = ConsensusConfig::default();
        let s = hash_from_byte(1);
        config.soft_voided_tx_ids.insert(s);
        let ctx = Context::new(&storage, &config);
        let genesis = setup_genesis(&storage, &ctx);

        storage.insert(Record::new_transaction(
            s,
            1.0,
            10,
            vec![genesis],
            vec![],
            vec![Output { value: Amount::from_u64(100), script: vec![1] }],
        ));
        TransactionConsensus::update(&ctx, &s).unwrap();

        let s_meta = storage.metadata_of(&s);
        assert_eq!(s_meta.voided_by, Some(HashSet::from([soft_voided_sentinel(), s])));

        // t_f spends s's output (funds edge) but verifies only genesis.
        let t_f = hash_from_byte(2);
        storage.insert(Record::new_transaction(
            t_f,
            1.0,
            11,
            vec![genesis],
            vec![Input { tx_id: s, index: 0, data: vec![1] }],
            vec![Output { value: Amount::from_u64(100), script: vec![2] }],
        ));
        TransactionConsensus::update(&ctx, &t_f).unwrap();
        let t_f_meta = storage.metadata_of(&t_f);
        assert_eq!(t_f_meta.voided_by, Some(HashSet::from([s])));

        // v_f only verifies t_f, spends nothing from it.
        let v_f = hash_from_byte(3);
        storage.insert(Record::new_transaction(v_f, 1.0, 12, vec![t_f], vec![], vec![]));
        TransactionConsensus::update(&ctx, &v_f).unwrap();
        let v_f_meta = storage.metadata_of(&v_f);
        assert!(v_f_meta.voided_by.is_none() || v_f_meta.voided_by.as_ref().unwrap().is_empty());

        // f_f spends t_f's output, inheriting {s} across the funds edge.
        let f_f = hash_from_byte(4);
        storage.insert(Record::new_transaction(
            f_f,
            1.0,
            13,
            vec![genesis],
            vec![Input { tx_id: t_f, index: 0, data: vec![1] }],
            vec![],
        ));
        TransactionConsensus::update(&ctx, &f_f).unwrap();
        let f_f_meta = storage.metadata_of(&f_f);
        assert_eq!(f_f_meta.voided_by, Some(HashSet::from([s])));

        // Bug #2 regression: propagating a further voidance from t_f must
        // follow funds (reaching f_f) and not verification (v_f untouched),
        // because t_f's own voided_by ({s}) intersects soft_voided_tx_ids.
        let marker = hash_from_byte(9);
        TransactionConsensus::add_voided_by(&ctx, &t_f, &marker).unwrap();
        let f_f_meta_after = storage.metadata_of(&f_f);
        assert!(f_f_meta_after.voided_by.as_ref().unwrap().contains(&marker));
        let v_f_meta_after = storage.metadata_of(&v_f);
        assert!(!v_f_meta_after.voided_by.as_ref().is_some_and(|v| v.contains(&marker)));
    }
}
