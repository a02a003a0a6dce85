use std::ops::RangeInclusive;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::verify_transaction;
use crate::difficulty::DifficultyController;
use crate::error::ValidationError;
use crate::pow::meets_difficulty;
use crate::{genesis_block, Block};

/// Durable home of a chain. Backends live in `owonero-storage`; the trait sits
/// here so the ledger can load and save without depending on them.
pub trait ChainStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load_chain(&self) -> Result<Option<Vec<Block>>>;
    fn save_chain(&self, chain: &[Block]) -> Result<()>;
}

/// Reply shape of `getwallet`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletInfo {
    pub address: String,
    pub total_received: u64,
    pub total_sent: u64,
    pub balance: i64,
}

/// The ordered, append-only sequence of accepted blocks together with the
/// difficulty required for the next one.
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    controller: DifficultyController,
    difficulty: u32,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DifficultyController::default())
    }
}

impl Ledger {
    /// A ledger holding only the genesis block.
    pub fn new(controller: DifficultyController) -> Self {
        Self::from_trusted(vec![genesis_block()], controller)
    }

    /// A ledger with no blocks at all; the first accepted block must be a genesis.
    pub fn empty(controller: DifficultyController) -> Self {
        Self {
            chain: Vec::new(),
            controller,
            difficulty: controller.min,
        }
    }

    /// Wrap blocks without validating them. Difficulty is replayed from history.
    pub fn from_trusted(chain: Vec<Block>, controller: DifficultyController) -> Self {
        let difficulty = controller.replay(&chain);
        Self {
            chain,
            controller,
            difficulty,
        }
    }

    /// Rebuild a ledger from `blocks`, running each one through the validator
    /// with proof of work skipped.
    pub fn verified(blocks: Vec<Block>, controller: DifficultyController) -> Result<Self, ValidationError> {
        let mut ledger = Self::empty(controller);
        for block in blocks {
            ledger.append(block, ledger.difficulty, true)?;
        }
        Ok(ledger)
    }

    /// Load from `store`, writing a fresh genesis chain when nothing (or an
    /// empty chain) is stored.
    pub fn load(store: &dyn ChainStore, controller: DifficultyController) -> Result<Self> {
        match store.load_chain()? {
            Some(blocks) if !blocks.is_empty() => {
                let ledger = Self::verified(blocks, controller)?;
                info!(
                    height = ledger.len() - 1,
                    difficulty = ledger.difficulty,
                    "loaded chain"
                );
                Ok(ledger)
            }
            _ => {
                let ledger = Self::new(controller);
                store.save_chain(&ledger.chain)?;
                info!("created new chain with genesis block");
                Ok(ledger)
            }
        }
    }

    pub fn save(&self, store: &dyn ChainStore) -> Result<()> {
        store.save_chain(&self.chain)
    }

    pub fn controller(&self) -> &DifficultyController {
        &self.controller
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Index of the tip, or `None` for an empty ledger.
    pub fn height(&self) -> Option<u64> {
        self.chain.last().map(|b| b.index)
    }

    pub fn tip(&self) -> Option<&Block> {
        self.chain.last()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Blocks whose index falls inside `range`, clipped to what exists.
    pub fn range(&self, range: RangeInclusive<u64>) -> &[Block] {
        let len = self.chain.len() as u64;
        let start = (*range.start()).min(len) as usize;
        let end = range.end().saturating_add(1).min(len) as usize;
        if start >= end {
            return &[];
        }
        &self.chain[start..end]
    }

    /// Difficulty required for the next block.
    pub fn dynamic_difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Check `candidate` against the tip. Logs the failing predicate; never mutates.
    pub fn validate(&self, candidate: &Block, difficulty: u32, skip_pow: bool) -> Result<(), ValidationError> {
        let outcome = self.check(candidate, difficulty, skip_pow);
        if let Err(e) = &outcome {
            warn!(index = candidate.index, error = %e, "block rejected");
        }
        outcome
    }

    fn check(&self, candidate: &Block, difficulty: u32, skip_pow: bool) -> Result<(), ValidationError> {
        let calculated = candidate.compute_hash();
        let Some(tip) = self.chain.last() else {
            if candidate.index != 0 {
                return Err(ValidationError::GenesisIndex(candidate.index));
            }
            if !candidate.prev_hash.is_empty() {
                return Err(ValidationError::GenesisPrevHash(candidate.prev_hash.clone()));
            }
            if calculated != candidate.hash {
                return Err(ValidationError::HashMismatch {
                    index: 0,
                    calculated,
                    stored: candidate.hash.clone(),
                });
            }
            return Ok(());
        };

        if candidate.prev_hash != tip.hash {
            return Err(ValidationError::PrevHashMismatch {
                index: candidate.index,
                expected: tip.hash.clone(),
                found: candidate.prev_hash.clone(),
            });
        }
        if calculated != candidate.hash {
            return Err(ValidationError::HashMismatch {
                index: candidate.index,
                calculated,
                stored: candidate.hash.clone(),
            });
        }
        if candidate.index != tip.index + 1 {
            return Err(ValidationError::IndexMismatch {
                expected: tip.index + 1,
                found: candidate.index,
            });
        }
        if !skip_pow && !meets_difficulty(&candidate.hash, difficulty) {
            return Err(ValidationError::InsufficientWork {
                index: candidate.index,
                difficulty,
            });
        }
        for tx in candidate.transactions.iter().filter(|tx| !tx.is_unsigned_kind()) {
            verify_transaction(tx).map_err(|source| ValidationError::InvalidSignature {
                index: candidate.index,
                to: tx.to.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Validate then append. Difficulty for the following block is advanced.
    pub fn append(&mut self, block: Block, difficulty: u32, skip_pow: bool) -> Result<(), ValidationError> {
        self.validate(&block, difficulty, skip_pow)?;
        self.chain.push(block);
        self.difficulty = self.controller.adjust(self.difficulty, &self.chain);
        debug!(
            height = self.chain.len() - 1,
            next_difficulty = self.difficulty,
            "block appended"
        );
        Ok(())
    }

    /// Seed an empty ledger with a peer's genesis as-is. Returns `false` when the
    /// ledger already has blocks or `block` is not at index 0.
    pub fn adopt_genesis(&mut self, block: Block) -> bool {
        if !self.chain.is_empty() || block.index != 0 {
            return false;
        }
        self.chain.push(block);
        self.difficulty = self.controller.replay(&self.chain);
        true
    }

    /// Full validation including proof of work. Returns whether it was appended.
    pub fn add_block(&mut self, block: Block, difficulty: u32) -> bool {
        self.append(block, difficulty, false).is_ok()
    }

    /// Append a block fetched from a trusted peer.
    pub fn add_block_skip_pow(&mut self, block: Block) -> bool {
        let d = self.difficulty;
        self.append(block, d, true).is_ok()
    }

    /// Received minus sent across every transaction in the ledger.
    pub fn get_balance(&self, address: &str) -> i64 {
        self.wallet_totals(address).2
    }

    /// `None` when the address never appears in any transaction.
    pub fn wallet_info(&self, address: &str) -> Option<WalletInfo> {
        let seen = self
            .transactions()
            .any(|tx| same_address(&tx.to, address) || same_address(&tx.from, address));
        if !seen {
            return None;
        }
        let (total_received, total_sent, balance) = self.wallet_totals(address);
        Some(WalletInfo {
            address: address.trim().to_string(),
            total_received,
            total_sent,
            balance,
        })
    }

    fn transactions(&self) -> impl Iterator<Item = &crate::Transaction> {
        self.chain.iter().flat_map(|b| b.transactions.iter())
    }

    fn wallet_totals(&self, address: &str) -> (u64, u64, i64) {
        let (mut received, mut sent) = (0u64, 0u64);
        for tx in self.transactions() {
            if same_address(&tx.to, address) {
                received = received.saturating_add(tx.amount);
            }
            if same_address(&tx.from, address) {
                sent = sent.saturating_add(tx.amount);
            }
        }
        let balance = (received as i128 - sent as i128).clamp(i64::MIN as i128, i64::MAX as i128) as i64;
        (received, sent, balance)
    }
}

fn same_address(a: &str, b: &str) -> bool {
    a.trim() == b.trim()
}
