// dag-core/src/record.rs

use crate::types::{Amount, Timestamp, Weight};
use dag_crypto::Hash;
use serde::{Deserialize, Serialize};

/// A reference to an output being spent: which transaction created it, and
/// which of its outputs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Input {
    pub tx_id: Hash,
    pub index: u32,
    /// Unlocking data (signature, witness). Opaque to consensus; only used to
    /// compare whether two conflicting transactions are twins of each other.
    pub data: Vec<u8>,
}

/// A value locked to an opaque script (a spending condition consensus does
/// not interpret).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Output {
    pub value: Amount,
    pub script: Vec<u8>,
}

/// Fields specific to a block: a single parent along the chain spine, plus
/// the transaction tips it confirms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFields {
    pub block_parent: Hash,
    pub tx_parents: Vec<Hash>,
}

/// Fields specific to a transaction: two or more verification parents, plus
/// the inputs/outputs that place it in the funds DAG.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFields {
    pub parents: Vec<Hash>,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Block(BlockFields),
    Transaction(TransactionFields),
}

/// A single node of the DAG: either a block or a transaction, sharing a
/// content hash, a weight, a timestamp and a genesis flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub hash: Hash,
    pub weight: Weight,
    pub timestamp: Timestamp,
    pub is_genesis: bool,
    pub kind: RecordKind,
}

impl Record {
    pub fn new_block(
        hash: Hash,
        weight: Weight,
        timestamp: Timestamp,
        block_parent: Hash,
        tx_parents: Vec<Hash>,
    ) -> Self {
        Self {
            hash,
            weight,
            timestamp,
            is_genesis: false,
            kind: RecordKind::Block(BlockFields { block_parent, tx_parents }),
        }
    }

    pub fn new_transaction(
        hash: Hash,
        weight: Weight,
        timestamp: Timestamp,
        parents: Vec<Hash>,
        inputs: Vec<Input>,
        outputs: Vec<Output>,
    ) -> Self {
        Self {
            hash,
            weight,
            timestamp,
            is_genesis: false,
            kind: RecordKind::Transaction(TransactionFields { parents, inputs, outputs }),
        }
    }

    pub fn genesis_block(hash: Hash, weight: Weight, timestamp: Timestamp) -> Self {
        Self {
            hash,
            weight,
            timestamp,
            is_genesis: true,
            kind: RecordKind::Block(BlockFields {
                block_parent: Hash::zero(),
                tx_parents: Vec::new(),
            }),
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.kind, RecordKind::Block(_))
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self.kind, RecordKind::Transaction(_))
    }

    pub fn as_block(&self) -> Option<&BlockFields> {
        match &self.kind {
            RecordKind::Block(fields) => Some(fields),
            RecordKind::Transaction(_) => None,
        }
    }

    pub fn as_transaction(&self) -> Option<&TransactionFields> {
        match &self.kind {
            RecordKind::Transaction(fields) => Some(fields),
            RecordKind::Block(_) => None,
        }
    }

    /// All verification-DAG parents of this record, regardless of kind.
    pub fn parents(&self) -> Vec<Hash> {
        match &self.kind {
            RecordKind::Block(fields) => {
                let mut out = Vec::with_capacity(1 + fields.tx_parents.len());
                if !self.is_genesis {
                    out.push(fields.block_parent);
                }
                out.extend(fields.tx_parents.iter().copied());
                out
            }
            RecordKind::Transaction(fields) => fields.parents.clone(),
        }
    }

    pub fn inputs(&self) -> &[Input] {
        match &self.kind {
            RecordKind::Transaction(fields) => &fields.inputs,
            RecordKind::Block(_) => &[],
        }
    }

    pub fn outputs(&self) -> &[Output] {
        match &self.kind {
            RecordKind::Transaction(fields) => &fields.outputs,
            RecordKind::Block(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> Hash {
        let mut bytes = [0u8; 32];
        bytes[0] = b;
        Hash::new(bytes)
    }

    #[test]
    fn test_genesis_has_no_parents() {
        let genesis = Record::genesis_block(h(0), 1.0, 0);
        assert!(genesis.parents().is_empty());
    }

    #[test]
    fn test_block_parents_include_block_and_tx_parents() {
        let block = Record::new_block(h(3), 10.0, 100, h(1), vec![h(2)]);
        let parents = block.parents();
        assert_eq!(parents, vec![h(1), h(2)]);
    }

    #[test]
    fn test_transaction_parents() {
        let tx = Record::new_transaction(h(4), 1.0, 100, vec![h(1), h(2)], vec![], vec![]);
        assert_eq!(tx.parents(), vec![h(1), h(2)]);
    }
}
