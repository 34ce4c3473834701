// consensus/src/lib.rs

//! The consensus algorithm: deciding which blocks extend the best chain,
//! which transactions execute, and how voidance propagates through the
//! verification and funds DAGs as new records arrive.
//!
//! This crate owns no storage of its own; every algorithm here is generic
//! over a [`ConsensusStorage`] implementation supplied by the caller. See
//! the `storage` crate for a concrete backend and the `node` crate for how
//! the two are wired together behind a [`ConsensusDriver`].

mod block_consensus;
mod config;
mod context;
mod driver;
mod error;
mod soft_void;
mod storage;
#[cfg(test)]
mod test_support;
mod tx_consensus;
mod walker;
mod weight;

pub use config::{soft_voided_sentinel, ConsensusConfig, DEFAULT_WEIGHT_TOL};
pub use driver::ConsensusDriver;
pub use error::{ConsensusError, ConsensusResult};
pub use storage::{ConsensusEvent, ConsensusStorage, PubSub};
pub use walker::{recompute_accumulated_weight, BfsWalk};
pub use weight::{compare_weights, sum_weights, WeightOrdering};
