//! Memory-hard block hashing.
//!
//! The digest is a SHA3-256 over the canonical block bytes, mixed with samples
//! from a 1 MiB scratch buffer seeded from `sha256(index ++ prev_hash)`. Every
//! node must reproduce it bit for bit, so byte order and index arithmetic are
//! fixed here and nowhere else.

use serde::Serialize;
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use crate::constants::{ACC_SAMPLES, ACC_STRIDE, BYTE, HASH_SIZE, SCRATCHPAD_SIZE};
use crate::{Block, Transaction};

#[derive(Serialize)]
struct HashedFields<'a> {
    index: u64,
    timestamp: &'a str,
    transactions: &'a [Transaction],
    prev_hash: &'a str,
    nonce: u64,
}

/// Canonical pre-image `B`: compact JSON of every field but `hash`.
pub fn canonical_bytes(block: &Block) -> Vec<u8> {
    let fields = HashedFields {
        index: block.index,
        timestamp: &block.timestamp,
        transactions: &block.transactions,
        prev_hash: &block.prev_hash,
        nonce: block.nonce,
    };
    serde_json::to_vec(&fields).expect("block fields always serialize")
}

/// Scratch buffer for one `(index, prev_hash)` template. Miners build it once
/// and reuse it across nonces.
#[derive(Clone)]
pub struct Scratchpad {
    index: u64,
    prev_hash: String,
    mem: Vec<u8>,
}

impl Scratchpad {
    pub fn new(index: u64, prev_hash: &str) -> Self {
        let seed: [u8; HASH_SIZE] = Sha256::digest(format!("{index}{prev_hash}")).into();
        let mem = seed.iter().copied().cycle().take(SCRATCHPAD_SIZE).collect();
        Self {
            index,
            prev_hash: prev_hash.to_string(),
            mem,
        }
    }

    pub fn for_block(block: &Block) -> Self {
        Self::new(block.index, &block.prev_hash)
    }

    /// Whether this buffer was derived for the block's template.
    pub fn matches(&self, block: &Block) -> bool {
        self.index == block.index && self.prev_hash == block.prev_hash
    }

    fn sample(&self, at: u64) -> u8 {
        self.mem[(at % self.mem.len() as u64) as usize]
    }

    fn accumulator(&self, nonce: u64) -> u64 {
        (0..ACC_SAMPLES).fold(0u64, |acc, i| {
            let at = nonce.wrapping_mul(31).wrapping_add(i * ACC_STRIDE);
            acc ^ ((self.sample(at) as u64) << (BYTE as u64 * i))
        })
    }

    /// Hex SHA3-256 digest of `block`. The caller guarantees `self.matches(block)`.
    pub fn hash(&self, block: &Block) -> String {
        debug_assert!(self.matches(block));
        let mut input = canonical_bytes(block);
        let nonce = block.nonce;
        let acc = self.accumulator(nonce);
        let puzzle = (nonce ^ input.len() as u64).wrapping_add(acc & 0xFFFF);

        input.push(self.sample(nonce.wrapping_mul(13)));
        input.push(puzzle as u8);
        input.extend_from_slice(&acc.to_le_bytes());

        hex::encode(Sha3_256::digest(&input))
    }
}

/// One-shot hash of a block; builds a fresh scratch buffer.
pub fn block_hash(block: &Block) -> String {
    Scratchpad::for_block(block).hash(block)
}
