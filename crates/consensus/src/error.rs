// consensus/src/error.rs

use dag_crypto::Hash;

/// Errors raised by the consensus algorithms.
///
/// `Invariant` and `Precondition` correspond to the spec's ProgrammerError
/// and PreconditionFailure tiers: both are fatal to the current `update`
/// call and are expected to bubble all the way out to the caller, which
/// should stop accepting new records rather than continue against storage
/// that may no longer satisfy the data-model invariants. `BenignSkip`
/// states never produce a `ConsensusError` at all; they are plain `bool`
/// returns from `add_voided_by`/`remove_voided_by`.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("consensus invariant violated: {0}")]
    Invariant(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    DagCore(#[from] dag_core::DagCoreError),
}

impl ConsensusError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn missing_metadata(hash: Hash) -> Self {
        Self::Storage(format!("no metadata for record {hash}"))
    }

    pub fn missing_record(hash: Hash) -> Self {
        Self::Storage(format!("no record {hash} in storage"))
    }
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
