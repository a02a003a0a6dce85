//! Pool mode: miners send reduced-difficulty shares, the node mines the real
//! block and splits its coinbase by accumulated attempts.

use std::collections::HashMap;
use std::mem;
use std::sync::{Mutex, PoisonError};

use owonero_core::constants::{MIN_DIFFICULTY, POOL_ACCOUNT, POOL_REWARD, SHARE_DIFFICULTY_OFFSET};
use owonero_core::mine::mine_block_parallel;
use owonero_core::pow::meets_difficulty;
use owonero_core::{Block, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::POOL_ROUND_PAUSE;
use crate::protocol::Share;
use crate::NodeContext;

/// Difficulty a share must meet when blocks need `difficulty`.
pub fn share_difficulty(difficulty: u32) -> u32 {
    difficulty
        .saturating_sub(SHARE_DIFFICULTY_OFFSET)
        .max(MIN_DIFFICULTY)
}

/// Attempts credited per wallet since the last payout.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShareEpoch {
    pub attempts: HashMap<String, u64>,
    pub total: u64,
}

impl ShareEpoch {
    pub fn credit(&mut self, wallet: &str, attempts: u64) {
        let tally = self.attempts.entry(wallet.to_string()).or_default();
        *tally = tally.saturating_add(attempts);
        self.total = self.total.saturating_add(attempts);
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Coinbase outputs splitting `reward` by share of attempts, floored.
    /// Wallets whose cut rounds to zero are left out. An empty epoch pays the
    /// whole reward to the pool account.
    pub fn payouts(&self, reward: u64) -> Vec<Transaction> {
        if self.is_empty() {
            return vec![Transaction::coinbase(POOL_ACCOUNT, reward)];
        }
        let mut wallets: Vec<(&String, &u64)> = self.attempts.iter().collect();
        wallets.sort();
        wallets
            .into_iter()
            .filter_map(|(wallet, &n)| {
                let amount = (reward as u128 * n as u128 / self.total as u128) as u64;
                (amount > 0).then(|| Transaction::coinbase(wallet.clone(), amount))
            })
            .collect()
    }
}

/// The live epoch. Payout swaps it out whole, so credits landing during a
/// payout go to the next epoch instead of being lost.
#[derive(Debug, Default)]
pub struct ShareBook {
    current: Mutex<ShareEpoch>,
}

impl ShareBook {
    pub fn credit(&self, wallet: &str, attempts: u64) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .credit(wallet, attempts);
    }

    pub fn take(&self) -> ShareEpoch {
        mem::take(&mut *self.current.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Fold an epoch whose block was never accepted back into the book.
    pub fn restore(&self, epoch: ShareEpoch) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        for (wallet, n) in epoch.attempts {
            current.credit(&wallet, n);
        }
    }

    pub fn snapshot(&self) -> ShareEpoch {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A share counts when its block extends `tip` and meets the share difficulty.
pub fn check_share(share: &Share, tip: Option<&Block>, difficulty: u32) -> bool {
    let Some(tip) = tip else {
        return false;
    };
    let block = &share.block;
    !share.wallet.trim().is_empty()
        && block.prev_hash == tip.hash
        && block.index == tip.index + 1
        && block.nonce == share.nonce
        && block.compute_hash() == block.hash
        && meets_difficulty(&block.hash, share_difficulty(difficulty))
}

/// Mine pool blocks back to back until cancelled. Each round takes the share
/// epoch, mines a block paying it out, and returns the epoch to the book if
/// the block does not make it onto the chain.
pub async fn run_pool_miner(ctx: NodeContext, cancel: CancellationToken) {
    info!("pool miner started");
    while !cancel.is_cancelled() {
        match pool_round(&ctx, &cancel).await {
            Ok(Some(index)) => info!(index, "pool found block"),
            Ok(None) => debug!("pool round abandoned"),
            Err(e) => {
                warn!(error = %e, "pool miner stopping");
                break;
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(POOL_ROUND_PAUSE) => {}
        }
    }
    info!("pool miner stopped");
}

async fn pool_round(ctx: &NodeContext, cancel: &CancellationToken) -> anyhow::Result<Option<u64>> {
    let template = ctx.ledger.template().await?;
    let Some(parent) = template.tip else {
        return Ok(None);
    };
    let epoch = ctx.shares.take();
    let mut txs = epoch.payouts(POOL_REWARD);
    txs.extend(ctx.ledger.pending().await?);
    if !epoch.is_empty() {
        info!(total = epoch.total, wallets = epoch.attempts.len(), "distributing pool reward");
    }

    let mut height = ctx.ledger.watch_height();
    height.borrow_and_update();
    let stop = cancel.clone();
    let difficulty = template.difficulty;
    let mined = tokio::task::spawn_blocking(move || {
        mine_block_parallel(&parent, txs, difficulty, || {
            stop.is_cancelled() || height.has_changed().unwrap_or(true)
        })
    })
    .await?;

    let Some(block) = mined else {
        ctx.shares.restore(epoch);
        return Ok(None);
    };
    let index = block.index;
    match ctx.ledger.submit(block).await? {
        Ok(()) => Ok(Some(index)),
        Err(e) => {
            debug!(error = %e, "pool block rejected");
            ctx.shares.restore(epoch);
            Ok(None)
        }
    }
}
