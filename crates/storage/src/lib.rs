// storage/src/lib.rs

//! Persistent storage for the DAG: a RocksDB-backed `ConsensusStorage`
//! implementation, plus the `PubSub` consensus publishes record updates to.
//!
//! Records and metadata are persisted to RocksDB; everything consensus
//! treats as a cache or index (best-tip set, height index,
//! verification-children index, mempool membership) lives in memory and is
//! rebuilt from persisted state at startup.

mod cache;
mod db;
mod indexes;
mod pubsub;
mod storage_impl;

pub use cache::{MetadataCache, RecordCache};
pub use db::{ColumnFamily, Database, DatabaseConfig};
pub use indexes::Indexes;
pub use pubsub::BroadcastPubSub;
pub use storage_impl::RocksConsensusStorage;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur at the RocksDB/serialization layer, below the
/// `consensus::ConsensusError` that wraps them at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_smoke() {
        // Module wiring compiles; real coverage lives in db/storage_impl.
    }
}
