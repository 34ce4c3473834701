// consensus/src/block_consensus.rs
//
// Everything that happens when a block joins the verification DAG: deciding
// whether it extends the best chain, re-scoring the chain it lands on, and
// propagating voidance both up the chain spine (to sibling chains it beats
// or loses to) and down into the transactions it confirms.

use crate::context::Context;
use crate::error::{ConsensusError, ConsensusResult};
use crate::soft_void::filter_soft_voided;
use crate::tx_consensus::TransactionConsensus;
use crate::walker::BfsWalk;
use crate::weight::{compare_weights, sum_weights, WeightOrdering};
use dag_core::{Hash, Record, RecordKind, Timestamp};
use std::collections::HashSet;
use tracing::{debug, debug_span};

pub struct BlockConsensus;

impl BlockConsensus {
    /// Entry point called once for every new block, in arrival order.
    pub fn update(ctx: &Context, block_hash: &Hash) -> ConsensusResult<()> {
        let _span = debug_span!("block_consensus_update", hash = %block_hash).entered();

        let record = ctx.storage.get_record(block_hash)?;
        let fields = record
            .as_block()
            .ok_or_else(|| ConsensusError::invariant("BlockConsensus::update called on a non-block record"))?;

        if record.weight <= 0.0 {
            return Err(ConsensusError::precondition("block weight must be positive"));
        }

        if record.is_genesis {
            let mut meta = ctx.storage.get_metadata(block_hash)?;
            meta.score = Some(record.weight);
            meta.height = Some(0);
            ctx.save(*block_hash, meta)?;
            ctx.storage.update_best_block_tips_cache(Some(vec![*block_hash]))?;
            ctx.storage.add_height(0, *block_hash, record.timestamp)?;
            return Ok(());
        }

        let union = Self::union_voided_by_from_parents(ctx, &record)?;
        if union.contains(block_hash) {
            return Err(ConsensusError::invariant("block would void itself via inherited parent voidance"));
        }
        for voided_hash in &union {
            let mut meta = ctx.storage.get_metadata(voided_hash)?;
            meta.accumulated_weight = sum_weights(meta.accumulated_weight, record.weight);
            let is_tx = ctx.storage.get_record(voided_hash)?.is_transaction();
            ctx.save(*voided_hash, meta)?;
            if is_tx {
                TransactionConsensus::check_conflicts(ctx, voided_hash)?;
            }
        }

        let parent_hash = fields.block_parent;
        let parent_meta = ctx.storage.get_metadata(&parent_hash)?;
        // This is called after the parent's metadata is updated, so if the
        // parent has only one verification child, it must be this block.
        // `verification_children` (not `Metadata::children`, which storage
        // never populates) is the index that is actually maintained.
        let is_head = ctx.storage.verification_children(&parent_hash)?.len() == 1;
        let is_on_best = parent_meta.is_executed();

        if is_head && is_on_best {
            Self::update_score_and_mark_best_chain_if_possible(ctx, block_hash)?;
            let meta = ctx.storage.get_metadata(block_hash)?;
            if meta.is_executed() {
                let height = parent_meta.height.unwrap_or(0) + 1;
                ctx.storage.add_height(height, *block_hash, record.timestamp)?;
                ctx.storage.update_best_block_tips_cache(Some(vec![*block_hash]))?;
            }
            return Ok(());
        }

        Self::mark_as_voided_inner(ctx, block_hash, true)?;

        let best_tips = ctx.storage.best_block_tips(false)?;
        let mut best_score = None;
        for tip in &best_tips {
            let tip_meta = ctx.storage.get_metadata(tip)?;
            let score = tip_meta
                .score
                .ok_or_else(|| ConsensusError::invariant("best tip has no score"))?;
            match best_score {
                None => best_score = Some(score),
                Some(existing) => {
                    if compare_weights(existing, score, ctx.config.weight_tol) != WeightOrdering::Tied {
                        return Err(ConsensusError::invariant("best tips disagree on score"));
                    }
                }
            }
        }
        let best_score = best_score.unwrap_or(f64::NEG_INFINITY);

        let own_score = Self::calculate_score(ctx, block_hash, false)?;

        match compare_weights(own_score, best_score, ctx.config.weight_tol) {
            WeightOrdering::Less => {
                Self::update_voided_by_from_parents(ctx, block_hash)?;
            }
            ordering => {
                let executed_tips: Vec<Hash> = best_tips
                    .iter()
                    .filter(|t| ctx.storage.get_metadata(t).map(|m| m.is_executed()).unwrap_or(false))
                    .copied()
                    .collect();
                if executed_tips.len() > 1 {
                    return Err(ConsensusError::invariant("more than one executed best tip"));
                }
                Self::add_voided_by_to_multiple_chains(ctx, block_hash, &best_tips)?;
                if ordering == WeightOrdering::Greater {
                    Self::update_score_and_mark_best_chain_if_possible(ctx, block_hash)?;
                    let meta = ctx.storage.get_metadata(block_hash)?;
                    let height = parent_meta.height.unwrap_or(0) + 1;
                    ctx.storage.update_new_chain(height, *block_hash)?;
                    if meta.is_executed() {
                        ctx.storage.update_best_block_tips_cache(Some(vec![*block_hash]))?;
                    }
                } else {
                    let mut heads = best_tips.clone();
                    heads.push(*block_hash);
                    ctx.storage.update_best_block_tips_cache(Some(heads))?;
                }
            }
        }

        Ok(())
    }

    fn union_voided_by_from_parents(ctx: &Context, record: &Record) -> ConsensusResult<HashSet<Hash>> {
        let mut out = HashSet::new();
        for parent in record.parents() {
            let parent_meta = ctx.storage.get_metadata(&parent)?;
            let Some(voided_by) = parent_meta.voided_by else { continue };
            if voided_by.is_empty() {
                continue;
            }
            let parent_record = ctx.storage.get_record(&parent)?;
            let mut filtered = voided_by;
            if parent_record.is_block() {
                filtered.remove(&parent);
            }
            let filtered = filter_soft_voided(ctx.storage, ctx.config, &parent, &filtered)?;
            out.extend(filtered);
        }
        Ok(out)
    }

    fn update_voided_by_from_parents(ctx: &Context, block_hash: &Hash) -> ConsensusResult<bool> {
        let record = ctx.storage.get_record(block_hash)?;
        let union = Self::union_voided_by_from_parents(ctx, &record)?;
        if union.is_empty() {
            return Ok(false);
        }
        let mut meta = ctx.storage.get_metadata(block_hash)?;
        meta.voided_by.get_or_insert_with(HashSet::new).extend(union);
        ctx.save(*block_hash, meta)?;
        ctx.storage.del_from_indexes(block_hash, true)?;
        Ok(true)
    }

    fn add_voided_by_to_multiple_chains(ctx: &Context, reference: &Hash, heads: &[Hash]) -> ConsensusResult<()> {
        let first_common = Self::find_first_parent_in_best_chain(ctx, reference)?;
        let first_common_record = ctx.storage.get_record(&first_common)?;

        for head in heads {
            let mut current = *head;
            loop {
                if current == first_common {
                    break;
                }
                let current_record = ctx.storage.get_record(&current)?;
                if current_record.timestamp <= first_common_record.timestamp {
                    break;
                }
                let current_meta = ctx.storage.get_metadata(&current)?;
                if !current_meta.voided_by.as_ref().is_some_and(|v| v.contains(&current)) {
                    Self::mark_as_voided_inner(ctx, &current, false)?;
                }
                let Some(fields) = current_record.as_block() else { break };
                current = fields.block_parent;
            }
        }
        Ok(())
    }

    fn find_first_parent_in_best_chain(ctx: &Context, block_hash: &Hash) -> ConsensusResult<Hash> {
        let start_record = ctx.storage.get_record(block_hash)?;
        let start_fields = start_record
            .as_block()
            .ok_or_else(|| ConsensusError::invariant("find_first_parent_in_best_chain called on a non-block record"))?;
        let mut current = start_fields.block_parent;
        loop {
            let record = ctx.storage.get_record(&current)?;
            let meta = ctx.storage.get_metadata(&current)?;
            if meta.is_executed() {
                return Ok(current);
            }
            let fields = record
                .as_block()
                .ok_or_else(|| ConsensusError::invariant("non-block while walking the chain spine"))?;
            if record.is_genesis {
                return Ok(current);
            }
            current = fields.block_parent;
        }
    }

    fn update_score_and_mark_best_chain_if_possible(ctx: &Context, block_hash: &Hash) -> ConsensusResult<()> {
        Self::update_score_and_mark_best_chain(ctx, block_hash)?;
        Self::remove_voided_by_from_chain(ctx, block_hash)?;

        if Self::update_voided_by_from_parents(ctx, block_hash)? {
            let best_tips = ctx.storage.best_block_tips(true)?;
            let mut best_heads = Vec::new();
            let mut best_score = f64::NEG_INFINITY;
            for tip in &best_tips {
                let meta = ctx.storage.get_metadata(tip)?;
                let Some(score) = meta.score else { continue };
                match compare_weights(score, best_score, ctx.config.weight_tol) {
                    WeightOrdering::Greater => {
                        best_score = score;
                        best_heads = vec![*tip];
                    }
                    WeightOrdering::Tied => best_heads.push(*tip),
                    WeightOrdering::Less => {}
                }
            }
            if best_heads.is_empty() {
                return Err(ConsensusError::invariant("no positively-scored best head after voiding"));
            }

            Self::add_voided_by_to_multiple_chains(ctx, &best_heads[0], &[*block_hash])?;

            if best_heads.len() == 1 && best_heads[0] != *block_hash {
                Self::update_score_and_mark_best_chain_if_possible(ctx, &best_heads[0])?;
            }
        }

        Ok(())
    }

    fn update_score_and_mark_best_chain(ctx: &Context, block_hash: &Hash) -> ConsensusResult<f64> {
        Self::calculate_score(ctx, block_hash, true)
    }

    fn remove_voided_by_from_chain(ctx: &Context, block_hash: &Hash) -> ConsensusResult<()> {
        let mut current = *block_hash;
        loop {
            let changed = Self::remove_voided_by(ctx, &current, &current)?;
            if !changed {
                break;
            }
            let record = ctx.storage.get_record(&current)?;
            if record.is_genesis {
                break;
            }
            let Some(fields) = record.as_block() else { break };
            current = fields.block_parent;
        }
        Ok(())
    }

    /// Add `voided_hash` to `block_hash`'s own voidance set, propagating into
    /// every transaction whose output this block's coinbase-like reward
    /// pays out to (tracked via `spent_outputs`).
    pub(crate) fn add_voided_by(ctx: &Context, block_hash: &Hash, voided_hash: &Hash) -> ConsensusResult<bool> {
        let mut meta = ctx.storage.get_metadata(block_hash)?;
        let set = meta.voided_by.get_or_insert_with(HashSet::new);
        if !set.insert(*voided_hash) {
            return Ok(false);
        }
        let spenders: Vec<Hash> = meta.spent_outputs.values().flatten().copied().collect();
        ctx.save(*block_hash, meta)?;

        for spender in spenders {
            TransactionConsensus::add_voided_by(ctx, &spender, voided_hash)?;
        }
        Ok(true)
    }

    pub(crate) fn remove_voided_by(ctx: &Context, block_hash: &Hash, voided_hash: &Hash) -> ConsensusResult<bool> {
        let mut meta = ctx.storage.get_metadata(block_hash)?;
        let removed = meta.voided_by.as_mut().is_some_and(|set| set.remove(voided_hash));
        if !removed {
            return Ok(false);
        }
        let spenders: Vec<Hash> = meta.spent_outputs.values().flatten().copied().collect();
        ctx.save(*block_hash, meta)?;

        for spender in spenders {
            TransactionConsensus::remove_voided_by(ctx, &spender, voided_hash)?;
        }
        Ok(true)
    }

    pub(crate) fn mark_as_voided(ctx: &Context, block_hash: &Hash) -> ConsensusResult<()> {
        Self::mark_as_voided_inner(ctx, block_hash, false)
    }

    fn mark_as_voided_inner(ctx: &Context, block_hash: &Hash, skip_remove_first_block_markers: bool) -> ConsensusResult<()> {
        if !skip_remove_first_block_markers {
            Self::remove_first_block_markers(ctx, block_hash)?;
        }
        Self::add_voided_by(ctx, block_hash, block_hash)?;
        Ok(())
    }

    /// A block losing the best-chain race stops being the "first confirming
    /// block" recorded on every transaction it verifies. Walked explicitly
    /// rather than recursively so a long confirmed-transaction tail can't
    /// blow the stack.
    fn remove_first_block_markers(ctx: &Context, block_hash: &Hash) -> ConsensusResult<()> {
        let mut walk = BfsWalk::new(ctx.storage, true, false, false).run(*block_hash, true)?;
        while let Some(hash) = walk.next_node()? {
            let record = ctx.storage.get_record(&hash)?;
            if record.is_block() {
                walk.skip_neighbors(&hash);
                continue;
            }
            let mut meta = ctx.storage.get_metadata(&hash)?;
            if meta.first_block != Some(*block_hash) {
                walk.skip_neighbors(&hash);
                continue;
            }
            meta.first_block = None;
            ctx.save(hash, meta)?;
        }
        Ok(())
    }

    fn calculate_score(ctx: &Context, block_hash: &Hash, mark_as_best_chain: bool) -> ConsensusResult<f64> {
        let record = ctx.storage.get_record(block_hash)?;
        if record.is_genesis {
            if mark_as_best_chain {
                let mut meta = ctx.storage.get_metadata(block_hash)?;
                meta.score = Some(record.weight);
                ctx.save(*block_hash, meta)?;
            }
            return Ok(record.weight);
        }

        let newest = Self::find_first_parent_in_best_chain(ctx, block_hash)?;
        let newest_timestamp = ctx.storage.get_record(&newest)?.timestamp;
        Self::score_block_dfs(ctx, block_hash, mark_as_best_chain, newest_timestamp)
    }

    /// Score every block from `newest_timestamp`'s successor up to
    /// `block_hash`, oldest first, as an explicit chain instead of
    /// recursing one stack frame per block.
    fn score_block_dfs(ctx: &Context, block_hash: &Hash, mark_as_best_chain: bool, newest_timestamp: Timestamp) -> ConsensusResult<f64> {
        let mut chain = Vec::new();
        let mut current = *block_hash;
        let mut running_score = None;
        loop {
            let record = ctx.storage.get_record(&current)?;
            if record.is_genesis {
                chain.push(current);
                break;
            }
            if record.timestamp <= newest_timestamp {
                let meta = ctx.storage.get_metadata(&current)?;
                running_score = meta.score;
                break;
            }
            chain.push(current);
            let fields = record
                .as_block()
                .ok_or_else(|| ConsensusError::invariant("non-block in chain spine"))?;
            current = fields.block_parent;
        }
        chain.reverse();

        let mut used = HashSet::new();
        let mut score = running_score.unwrap_or(0.0);
        for hash in &chain {
            let record = ctx.storage.get_record(hash)?;
            let meta = ctx.storage.get_metadata(hash)?;

            let new_score = if record.is_genesis {
                record.weight
            } else {
                let contribution = Self::score_tx_contribution(ctx, &record, &mut used, mark_as_best_chain, hash, newest_timestamp)?;
                let with_own_weight = sum_weights(record.weight, score);
                match contribution {
                    Some(c) => sum_weights(with_own_weight, c),
                    None => with_own_weight,
                }
            };

            match meta.score {
                Some(existing) => {
                    if compare_weights(existing, new_score, ctx.config.weight_tol) != WeightOrdering::Tied {
                        return Err(ConsensusError::invariant("recomputed score disagrees with stored score"));
                    }
                }
                None => {
                    let mut meta = meta;
                    meta.score = Some(new_score);
                    ctx.save(*hash, meta)?;
                }
            }

            score = new_score;
        }

        Ok(score)
    }

    /// Sum of weight of every transaction newly confirmed by `block_hash`
    /// via `block_record`'s tx parents, walking backward through the
    /// verification DAG until hitting transactions already accounted for by
    /// an earlier best-chain block.
    fn score_tx_contribution(
        ctx: &Context,
        block_record: &Record,
        used: &mut HashSet<Hash>,
        mark_as_best_chain: bool,
        block_hash: &Hash,
        newest_timestamp: Timestamp,
    ) -> ConsensusResult<Option<f64>> {
        let RecordKind::Block(fields) = &block_record.kind else {
            return Err(ConsensusError::invariant("score_tx_contribution called on a non-block record"));
        };

        let mut total = None;
        for tx_parent in &fields.tx_parents {
            let mut walk = BfsWalk::new(ctx.storage, true, false, false).run(*tx_parent, false)?;
            while let Some(hash) = walk.next_node()? {
                let record = ctx.storage.get_record(&hash)?;
                if record.is_block() {
                    return Err(ConsensusError::invariant("funds-confirming walk reached a block"));
                }
                if !used.insert(hash) {
                    walk.skip_neighbors(&hash);
                    continue;
                }

                let mut meta = ctx.storage.get_metadata(&hash)?;
                if let Some(existing_first) = meta.first_block {
                    let existing_timestamp = ctx.storage.get_record(&existing_first)?.timestamp;
                    if existing_timestamp <= newest_timestamp {
                        walk.skip_neighbors(&hash);
                        continue;
                    }
                }

                if mark_as_best_chain {
                    if meta.first_block.is_some() {
                        return Err(ConsensusError::invariant("transaction already has a first_block while marking best chain"));
                    }
                    meta.first_block = Some(*block_hash);
                    ctx.save(hash, meta)?;
                    debug!(tx = %hash, block = %block_hash, "recorded first confirming block");
                }

                total = Some(match total {
                    Some(t) => sum_weights(t, record.weight),
                    None => record.weight,
                });
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConsensusConfig;
    use crate::test_support::{hash_from_byte, FakeStorage};

    fn genesis() -> Hash {
        hash_from_byte(0)
    }

    #[test]
    fn test_genesis_gets_unit_score_and_is_best_tip() {
        let storage = FakeStorage::new();
        storage.insert(Record::genesis_block(genesis(), 1.0, 0));
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);

        BlockConsensus::update(&ctx, &genesis()).unwrap();

        let meta = storage.metadata_of(&genesis());
        assert_eq!(meta.score, Some(1.0));
        assert_eq!(storage.best_block_tips(false).unwrap(), vec![genesis()]);
    }

    #[test]
    fn test_linear_chain_extends_best_tip() {
        let storage = FakeStorage::new();
        storage.insert(Record::genesis_block(genesis(), 1.0, 0));
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        BlockConsensus::update(&ctx, &genesis()).unwrap();

        let b1 = hash_from_byte(1);
        storage.insert(Record::new_block(b1, 10.0, 100, genesis(), vec![]));
        BlockConsensus::update(&ctx, &b1).unwrap();

        let meta = storage.metadata_of(&b1);
        assert!(meta.is_executed());
        assert_eq!(storage.best_block_tips(false).unwrap(), vec![b1]);
        assert!(meta.score.unwrap() > 1.0);
    }

    #[test]
    fn test_weaker_fork_gets_voided() {
        let storage = FakeStorage::new();
        storage.insert(Record::genesis_block(genesis(), 1.0, 0));
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        BlockConsensus::update(&ctx, &genesis()).unwrap();

        let strong = hash_from_byte(1);
        storage.insert(Record::new_block(strong, 20.0, 100, genesis(), vec![]));
        BlockConsensus::update(&ctx, &strong).unwrap();

        let weak = hash_from_byte(2);
        storage.insert(Record::new_block(weak, 5.0, 101, genesis(), vec![]));
        BlockConsensus::update(&ctx, &weak).unwrap();

        let weak_meta = storage.metadata_of(&weak);
        assert!(weak_meta.is_voided());
        let strong_meta = storage.metadata_of(&strong);
        assert!(strong_meta.is_executed());
    }

    /// Scenario 3: two blocks of equal weight extending the same parent tie.
    /// Both end up self-voided and both sit in the best-tip cache; neither
    /// chain is actually executed beyond the shared parent.
    #[test]
    fn test_equal_weight_fork_ties_and_both_sides_self_void() {
        let storage = FakeStorage::new();
        storage.insert(Record::genesis_block(genesis(), 1.0, 0));
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        BlockConsensus::update(&ctx, &genesis()).unwrap();

        let b1 = hash_from_byte(1);
        storage.insert(Record::new_block(b1, 10.0, 100, genesis(), vec![]));
        BlockConsensus::update(&ctx, &b1).unwrap();

        let b2 = hash_from_byte(2);
        storage.insert(Record::new_block(b2, 5.0, 101, b1, vec![]));
        BlockConsensus::update(&ctx, &b2).unwrap();

        let b2_prime = hash_from_byte(3);
        storage.insert(Record::new_block(b2_prime, 5.0, 102, b1, vec![]));
        BlockConsensus::update(&ctx, &b2_prime).unwrap();

        let meta_b2 = storage.metadata_of(&b2);
        let meta_b2_prime = storage.metadata_of(&b2_prime);
        assert!(meta_b2.voided_by.as_ref().is_some_and(|v| v.contains(&b2)));
        assert!(meta_b2_prime.voided_by.as_ref().is_some_and(|v| v.contains(&b2_prime)));

        let mut best_tips = storage.best_block_tips(false).unwrap();
        best_tips.sort();
        let mut expected = vec![b2, b2_prime];
        expected.sort();
        assert_eq!(best_tips, expected);

        assert!(storage.metadata_of(&b1).is_executed());
    }

    /// Scenario 4: continuing the tie above, a block extending the losing
    /// side outweighs it. Its self-void and the parent's self-void both get
    /// removed, and the sibling fork is left voided permanently.
    #[test]
    fn test_fork_resolves_once_one_tied_side_is_extended() {
        let storage = FakeStorage::new();
        storage.insert(Record::genesis_block(genesis(), 1.0, 0));
        let config = ConsensusConfig::default();
        let ctx = Context::new(&storage, &config);
        BlockConsensus::update(&ctx, &genesis()).unwrap();

        let b1 = hash_from_byte(1);
        storage.insert(Record::new_block(b1, 10.0, 100, genesis(), vec![]));
        BlockConsensus::update(&ctx, &b1).unwrap();

        let b2 = hash_from_byte(2);
        storage.insert(Record::new_block(b2, 5.0, 101, b1, vec![]));
        BlockConsensus::update(&ctx, &b2).unwrap();

        let b2_prime = hash_from_byte(3);
        storage.insert(Record::new_block(b2_prime, 5.0, 102, b1, vec![]));
        BlockConsensus::update(&ctx, &b2_prime).unwrap();

        let b3_prime = hash_from_byte(4);
        storage.insert(Record::new_block(b3_prime, 1.0, 103, b2_prime, vec![]));
        BlockConsensus::update(&ctx, &b3_prime).unwrap();

        assert!(storage.metadata_of(&b3_prime).is_executed());
        assert!(storage.metadata_of(&b2_prime).is_executed());
        let meta_b2 = storage.metadata_of(&b2);
        assert!(meta_b2.voided_by.as_ref().is_some_and(|v| v.contains(&b2)));

        assert_eq!(storage.best_block_tips(false).unwrap(), vec![b3_prime]);
    }
}
