//! Multi-threaded miner that submits blocks (or pool shares) to a node.
//!
//! Workers run on the blocking pool and share one head published through a
//! `watch` channel. A single submitter owns the node connection and is the
//! only task that moves the head.

pub mod constants;
pub mod error;
pub mod head;
pub mod submitter;
pub mod telemetry;
pub mod worker;

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use owonero_core::DifficultyController;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::MinerError;
pub use head::{Candidate, Head};
pub use submitter::Submitter;
pub use telemetry::{HashrateWindow, Hashrates};

use crate::constants::CANDIDATE_QUEUE_DEPTH;
use crate::telemetry::spawn_telemetry;
use crate::worker::{run_worker, Job};

#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Node address, `host:port`.
    pub node: String,
    /// Payout address.
    pub wallet: String,
    pub threads: usize,
    /// Stop after this many accepted blocks (shares in pool mode); 0 runs forever.
    pub blocks_to_mine: u64,
    pub pool: bool,
    /// Must match the node's, or the mirrored difficulty drifts.
    pub controller: DifficultyController,
}

#[derive(Clone, Debug)]
pub struct MinerSummary {
    pub accepted: u64,
    pub hashrates: Hashrates,
}

/// Mine until `cancel` fires, the target is reached, or the node fails.
pub async fn run(config: MinerConfig, cancel: CancellationToken) -> Result<MinerSummary, MinerError> {
    let cancel = cancel.child_token();
    let (submitter, head) = Submitter::connect(&config.node, config.controller, config.blocks_to_mine).await?;

    let attempts = Arc::new(AtomicU64::new(0));
    let telemetry = spawn_telemetry(attempts.clone(), cancel.clone());
    let (tx, rx) = mpsc::channel(CANDIDATE_QUEUE_DEPTH);

    let threads = config.threads.max(1);
    info!(threads, pool = config.pool, wallet = %config.wallet, "starting workers");
    let workers: Vec<_> = (0..threads)
        .map(|id| {
            let job = Job {
                id,
                wallet: config.wallet.clone(),
                pool: config.pool,
            };
            let head = head.clone();
            let tx = tx.clone();
            let attempts = attempts.clone();
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || run_worker(job, head, tx, attempts, cancel))
        })
        .collect();
    drop(tx);
    drop(head);

    let outcome = submitter.run(rx, cancel.clone()).await;
    cancel.cancel();
    for worker in workers {
        worker.await?;
    }
    let window = telemetry.await?;
    let accepted = outcome?;
    let hashrates = window.rates();
    info!(accepted, avg_1m = hashrates.minute, "miner stopped");
    Ok(MinerSummary { accepted, hashrates })
}
