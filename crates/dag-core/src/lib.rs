//! The DAG data model: records (blocks and transactions), their consensus
//! metadata, and the primitive types consensus arithmetic runs over.
//!
//! This crate has no opinion on how records got here or how they are
//! stored; it only defines what a record and its metadata *are*. The
//! algorithms that mutate `Metadata` live in the `consensus` crate.

pub mod error;
pub mod metadata;
pub mod record;
pub mod types;

pub use dag_crypto::Hash;
pub use error::{DagCoreError, DagCoreResult};
pub use metadata::Metadata;
pub use record::{BlockFields, Input, Output, Record, RecordKind, TransactionFields};
pub use types::{Amount, BlockHeight, Timestamp, Weight};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        let genesis = Record::genesis_block(Hash::zero(), 1.0, 0);
        let meta = Metadata::new(&genesis);
        assert!(meta.is_executed());
    }
}
