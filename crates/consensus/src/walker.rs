// consensus/src/walker.rs
//
// A BFS walk over the DAG, expressed as an explicit queue instead of
// recursion so wide or deep sub-graphs never blow the call stack. Callers
// drive it with `next_node`/`skip_neighbors` rather than an `Iterator`,
// because whether to expand a node's neighbors is a decision the caller
// makes *after* inspecting that node's metadata.

use crate::error::ConsensusResult;
use crate::storage::ConsensusStorage;
use crate::weight::sum_weights;
use dag_core::Hash;
use std::collections::{HashSet, VecDeque};

pub struct BfsWalk<'s> {
    storage: &'s dyn ConsensusStorage,
    is_dag_verifications: bool,
    is_dag_funds: bool,
    /// `true` walks toward tips (verification/funds children); `false`
    /// walks toward genesis (verification parents only).
    is_left_to_right: bool,
    queue: VecDeque<Hash>,
    visited: HashSet<Hash>,
    /// The node returned by the last `next_node` call, whose neighbors have
    /// not yet been enqueued — deferred so `skip_neighbors` can still
    /// suppress them before the next call.
    pending_expand: Option<Hash>,
    pending_skip: Option<Hash>,
}

impl<'s> BfsWalk<'s> {
    pub fn new(
        storage: &'s dyn ConsensusStorage,
        is_dag_verifications: bool,
        is_dag_funds: bool,
        is_left_to_right: bool,
    ) -> Self {
        Self {
            storage,
            is_dag_verifications,
            is_dag_funds,
            is_left_to_right,
            queue: VecDeque::new(),
            visited: HashSet::new(),
            pending_expand: None,
            pending_skip: None,
        }
    }

    /// Seed the walk at `root`. If `skip_root` is set, `root` itself is
    /// never returned by `next_node`, but its neighbors are still enqueued.
    pub fn run(mut self, root: Hash, skip_root: bool) -> ConsensusResult<Self> {
        self.visited.insert(root);
        if skip_root {
            for child in self.neighbors(&root)? {
                if self.visited.insert(child) {
                    self.queue.push_back(child);
                }
            }
        } else {
            self.queue.push_back(root);
        }
        Ok(self)
    }

    /// Tell the walk not to expand the neighbors of the node most recently
    /// returned by `next_node`. Must be called before the next `next_node`
    /// call to take effect.
    pub fn skip_neighbors(&mut self, hash: &Hash) {
        self.pending_skip = Some(*hash);
    }

    pub fn next_node(&mut self) -> ConsensusResult<Option<Hash>> {
        if let Some(prev) = self.pending_expand.take() {
            if self.pending_skip != Some(prev) {
                for child in self.neighbors(&prev)? {
                    if self.visited.insert(child) {
                        self.queue.push_back(child);
                    }
                }
            }
            self.pending_skip = None;
        }

        let Some(hash) = self.queue.pop_front() else {
            return Ok(None);
        };
        self.pending_expand = Some(hash);
        Ok(Some(hash))
    }

    fn neighbors(&self, hash: &Hash) -> ConsensusResult<Vec<Hash>> {
        let mut out = Vec::new();
        if self.is_left_to_right {
            if self.is_dag_verifications {
                out.extend(self.storage.verification_children(hash)?);
            }
            if self.is_dag_funds {
                let meta = self.storage.get_metadata(hash)?;
                out.extend(meta.spent_outputs.values().flatten().copied());
            }
        } else if self.is_dag_verifications {
            let record = self.storage.get_record(hash)?;
            out.extend(record.parents());
        }
        Ok(out)
    }
}

/// Recompute a record's accumulated weight from scratch by summing the
/// weight of every record that (transitively) verifies or spends it, plus
/// its own weight. Stops early once the running total is known to compare
/// above `stop_at` under `tol`, since callers only need to know whether the
/// candidate clears that bar, not its exact value beyond it.
pub fn recompute_accumulated_weight(
    storage: &dyn ConsensusStorage,
    root: Hash,
    stop_at: Option<f64>,
    tol: f64,
) -> ConsensusResult<f64> {
    let record = storage.get_record(&root)?;
    let mut total = record.weight;

    let mut walk = BfsWalk::new(storage, true, true, true).run(root, true)?;
    while let Some(hash) = walk.next_node()? {
        let other = storage.get_record(&hash)?;
        total = sum_weights(total, other.weight);
        if let Some(stop) = stop_at {
            if total >= stop + tol {
                break;
            }
        }
    }
    Ok(total)
}
