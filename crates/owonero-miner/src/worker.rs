use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread;

use owonero_core::pow::mine_block;
use owonero_node::pool::share_difficulty;
use owonero_node::protocol::Share;
use tokio::sync::mpsc::{error::TrySendError, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::constants::QUEUE_FULL_BACKOFF;
use crate::head::{Candidate, HeadReceiver};

/// Per-worker settings.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: usize,
    pub wallet: String,
    pub pool: bool,
}

/// Blocking mining loop. Meant for `spawn_blocking`.
///
/// Each pass clones the current head, searches nonces until a block (or, in
/// pool mode, a share) is found, and offers it to the submitter without
/// waiting. The search is dropped as soon as the head moves.
pub fn run_worker(
    job: Job,
    mut head: HeadReceiver,
    out: Sender<Candidate>,
    attempts: Arc<AtomicU64>,
    cancel: CancellationToken,
) {
    debug!(worker = job.id, "worker started");
    while !cancel.is_cancelled() {
        // Sender gone means the submitter has exited.
        if head.has_changed().is_err() {
            break;
        }
        let current = head.borrow_and_update().clone();
        let difficulty = if job.pool {
            share_difficulty(current.difficulty)
        } else {
            current.difficulty
        };

        let mined = mine_block(
            &current.block,
            current.transactions(&job.wallet),
            difficulty,
            Some(&attempts),
            || cancel.is_cancelled() || head.has_changed().unwrap_or(true),
        );
        let Some(mined) = mined else {
            continue;
        };
        if head.has_changed().unwrap_or(true) {
            continue;
        }
        trace!(worker = job.id, index = mined.block.index, attempts = mined.attempts, "found candidate");

        let candidate = if job.pool {
            Candidate::Share(Share {
                wallet: job.wallet.clone(),
                nonce: mined.block.nonce,
                attempts: mined.attempts,
                block: mined.block,
            })
        } else {
            Candidate::Block(mined.block)
        };
        match out.try_send(candidate) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => thread::sleep(QUEUE_FULL_BACKOFF),
            Err(TrySendError::Closed(_)) => break,
        }
    }
    debug!(worker = job.id, "worker stopped");
}
