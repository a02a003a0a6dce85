use crate::{
    hash::Scratchpad,
    pow::{candidate, meets_difficulty},
    Block, Transaction,
};
use rayon::prelude::*;
use tracing::info;

/// Mines a child of `parent` by searching nonces in parallel until a hash meets
/// `difficulty`. The timestamp is fixed when the template is built; only the
/// nonce varies. Returns `None` if `should_stop` fires before a hit.
pub fn mine_block_parallel<F>(
    parent: &Block,
    transactions: Vec<Transaction>,
    difficulty: u32,
    should_stop: F,
) -> Option<Block>
where
    F: Fn() -> bool + Sync,
{
    // Only the nonce varies between attempts.
    let template = candidate(parent, transactions);
    let pad = Scratchpad::for_block(&template);

    // Rayon splits the nonce range across its pool. A stop request ends the
    // search by reporting a "hit" that is discarded below.
    let found = (0u64..u64::MAX).into_par_iter().find_any(|nonce| {
        if should_stop() {
            return true;
        }
        let mut b = template.clone();
        b.nonce = *nonce;
        meets_difficulty(&pad.hash(&b), difficulty)
    })?;

    let mut block = template;
    block.nonce = found;
    let hash = pad.hash(&block);
    if !meets_difficulty(&hash, difficulty) {
        return None;
    }
    block.hash = hash;

    info!(
        index = block.index,
        nonce = found,
        hash = %block.hash,
        "mined block in parallel"
    );
    Some(block)
}
