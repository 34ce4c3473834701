// dag-core/src/error.rs

#[derive(Debug, thiserror::Error)]
pub enum DagCoreError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] dag_crypto::CryptoError),
}

pub type DagCoreResult<T> = Result<T, DagCoreError>;
