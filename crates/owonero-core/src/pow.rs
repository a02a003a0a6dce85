use std::sync::atomic::{AtomicU64, Ordering};

use crate::{hash::Scratchpad, now_timestamp, Block, Transaction};

/// A hash meets difficulty `d` when its first `d` hex nibbles are zero.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let d = difficulty as usize;
    hash.len() >= d && hash.bytes().take(d).all(|c| c == b'0')
}

/// Number of leading zero nibbles, for diagnostics.
pub fn leading_zero_nibbles(hash: &str) -> u32 {
    hash.bytes().take_while(|c| *c == b'0').count() as u32
}

/// A block found by [`mine_block`] together with the attempts it took.
#[derive(Clone, Debug)]
pub struct Mined {
    pub block: Block,
    pub attempts: u64,
}

/// The unmined child of `parent`: index + 1, linked by hash, nonce 0.
pub fn candidate(parent: &Block, transactions: Vec<Transaction>) -> Block {
    Block {
        index: parent.index + 1,
        timestamp: now_timestamp(),
        transactions,
        prev_hash: parent.hash.clone(),
        hash: String::new(),
        nonce: 0,
    }
}

/// Mine a child of `parent` by walking nonces from zero until the hash meets
/// `difficulty`. The timestamp is refreshed on every attempt and `attempts`,
/// when given, is bumped per hash. `should_stop` is polled between attempts;
/// returns `None` once it reports true.
pub fn mine_block<F>(
    parent: &Block,
    transactions: Vec<Transaction>,
    difficulty: u32,
    attempts: Option<&AtomicU64>,
    should_stop: F,
) -> Option<Mined>
where
    F: Fn() -> bool,
{
    let mut block = candidate(parent, transactions);
    let pad = Scratchpad::for_block(&block);
    let mut local = 0u64;

    loop {
        if should_stop() {
            return None;
        }
        block.timestamp = now_timestamp();
        let hash = pad.hash(&block);
        local += 1;
        if let Some(counter) = attempts {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if meets_difficulty(&hash, difficulty) {
            block.hash = hash;
            return Some(Mined {
                block,
                attempts: local,
            });
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
}
