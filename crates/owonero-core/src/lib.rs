use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub mod chain;
pub mod constants;
pub mod crypto;
pub mod difficulty;
pub mod error;
pub mod hash;
pub mod mine;
pub mod pow;

pub use chain::{ChainStore, Ledger, WalletInfo};
pub use difficulty::DifficultyController;
pub use error::{CryptoError, ValidationError};
pub use hash::{block_hash, Scratchpad};

use constants::{COINBASE_SENDER, GENESIS_RECIPIENT, GENESIS_SENDER, GENESIS_TIMESTAMP};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender address, or the sender's PEM public key for signed transfers.
    pub from: String,
    pub to: String,
    pub amount: u64,
    /// Hex of `{"r":..,"s":..}`; empty for coinbase and genesis entries.
    #[serde(default)]
    pub signature: String,
}

impl Transaction {
    pub fn coinbase(to: impl Into<String>, amount: u64) -> Self {
        Self {
            from: COINBASE_SENDER.to_string(),
            to: to.into(),
            amount,
            signature: String::new(),
        }
    }

    /// Coinbase and genesis entries carry no signature.
    pub fn is_unsigned_kind(&self) -> bool {
        self.from == COINBASE_SENDER || self.from == GENESIS_SENDER
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    /// ISO-8601 / RFC 3339, e.g. `2025-10-11T00:00:00Z`. Hashed verbatim.
    pub timestamp: String,
    pub transactions: Vec<Transaction>,
    /// Empty only for genesis.
    pub prev_hash: String,
    pub hash: String,
    pub nonce: u64,
}

impl Block {
    /// Recompute the hash engine digest over every field except `hash`.
    pub fn compute_hash(&self) -> String {
        block_hash(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash.is_empty()
    }
}

/// The persisted and `getchain` document shape: `{"chain":[...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDocument {
    pub chain: Vec<Block>,
}

/// Current UTC time in the block timestamp format.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The fixed block every chain starts from.
pub fn genesis_block() -> Block {
    let mut genesis = Block {
        index: 0,
        timestamp: GENESIS_TIMESTAMP.to_string(),
        transactions: vec![Transaction {
            from: GENESIS_SENDER.to_string(),
            to: GENESIS_RECIPIENT.to_string(),
            amount: 0,
            signature: String::new(),
        }],
        prev_hash: String::new(),
        hash: String::new(),
        nonce: 0,
    };
    genesis.hash = genesis.compute_hash();
    genesis
}
