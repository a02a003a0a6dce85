use std::sync::Arc;

use owonero_core::constants::BLOCK_REWARD;
use owonero_core::{Block, Transaction};
use owonero_node::protocol::Share;
use tokio::sync::watch;

/// The template every worker mines against. Replaced whole by the submitter,
/// never edited in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Head {
    pub block: Block,
    /// Difficulty the node requires for the block after `block`.
    pub difficulty: u32,
    pub pending: Vec<Transaction>,
}

impl Head {
    /// Coinbase to `wallet` first, then the node's queued transactions.
    pub fn transactions(&self, wallet: &str) -> Vec<Transaction> {
        let mut txs = Vec::with_capacity(self.pending.len() + 1);
        txs.push(Transaction::coinbase(wallet, BLOCK_REWARD));
        txs.extend(self.pending.iter().cloned());
        txs
    }
}

pub type HeadSender = watch::Sender<Arc<Head>>;
pub type HeadReceiver = watch::Receiver<Arc<Head>>;

/// What a worker hands to the submitter.
#[derive(Clone, Debug)]
pub enum Candidate {
    Block(Block),
    Share(Share),
}

impl Candidate {
    pub fn block(&self) -> &Block {
        match self {
            Candidate::Block(block) => block,
            Candidate::Share(share) => &share.block,
        }
    }
}
