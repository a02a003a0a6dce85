use thiserror::Error;

/// The predicate a candidate block failed. The ledger is never mutated when one
/// of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("genesis index must be 0, got {0}")]
    GenesisIndex(u64),
    #[error("genesis prev_hash must be empty, got {0}")]
    GenesisPrevHash(String),
    #[error("block {index}: prev_hash mismatch (expected {expected}, got {found})")]
    PrevHashMismatch {
        index: u64,
        expected: String,
        found: String,
    },
    #[error("block {index}: hash mismatch (calculated {calculated}, stored {stored})")]
    HashMismatch {
        index: u64,
        calculated: String,
        stored: String,
    },
    #[error("block index mismatch (expected {expected}, got {found})")]
    IndexMismatch { expected: u64, found: u64 },
    #[error("block {index}: proof of work does not meet difficulty {difficulty}")]
    InsufficientWork { index: u64, difficulty: u32 },
    #[error("block {index}: invalid signature on transaction to {to}: {source}")]
    InvalidSignature {
        index: u64,
        to: String,
        #[source]
        source: CryptoError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("cannot parse public key")]
    InvalidPublicKey,
    #[error("cannot parse private key")]
    InvalidPrivateKey,
    #[error("malformed signature encoding")]
    MalformedSignature,
    #[error("signature does not verify")]
    BadSignature,
    #[error("signing failed")]
    Signing,
}
