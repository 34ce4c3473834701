//! Cryptographic primitives for the DAG ledger
//!
//! This crate provides:
//! - Content hashing (SHA256, SHA3, Blake3) used to address every record in the DAG
//! - Ed25519 signatures and key pairs, used by record-format validation (Verifier)
//!   and by test fixtures in the consensus crate

pub mod hash;
pub mod signature;
pub mod keypair;

pub use hash::{Hash, HashAlgorithm, Hashable};
pub use signature::{Signature, SignatureScheme};
pub use keypair::{KeyPair, PublicKey, SecretKey, Address};

/// Result type for cryptographic operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid secret key")]
    InvalidSecretKey,

    #[error("Invalid hash")]
    InvalidHash,

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Random number generation failed")]
    RngError,
}
