use std::sync::Arc;

use owonero_core::pow::meets_difficulty;
use owonero_core::{Block, DifficultyController, Ledger};
use owonero_node::protocol::{wire_height, ERR_BLOCK_INVALID, ERR_INVALID_SHARE, OK};
use owonero_node::NodeClient;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{HEAD_POLL_INTERVAL, REJECT_BACKOFF};
use crate::error::MinerError;
use crate::head::{Candidate, Head, HeadReceiver, HeadSender};

/// The only writer of the shared head. Owns the node connection and a local
/// mirror of the chain, from which it derives the difficulty to mine at.
pub struct Submitter {
    client: NodeClient,
    mirror: Ledger,
    head: HeadSender,
    /// Accepted blocks (or shares in pool mode) after which to stop; 0 = never.
    target: u64,
    accepted: u64,
}

impl Submitter {
    /// Connect, announce ourselves as a miner and build the first head.
    pub async fn connect(
        node: &str,
        controller: DifficultyController,
        target: u64,
    ) -> Result<(Self, HeadReceiver), MinerError> {
        let mut client = NodeClient::connect(node).await?;
        client.miner_active().await?;
        let mirror = Ledger::from_trusted(client.chain().await?, controller);
        let first = Self::build_head(&mut client, &mirror).await?;
        info!(
            node,
            height = first.block.index,
            difficulty = first.difficulty,
            "connected to node"
        );
        let (head, rx) = watch::channel(Arc::new(first));
        Ok((
            Self {
                client,
                mirror,
                head,
                target,
                accepted: 0,
            },
            rx,
        ))
    }

    async fn build_head(client: &mut NodeClient, mirror: &Ledger) -> Result<Head, MinerError> {
        let block = mirror.tip().cloned().ok_or(MinerError::EmptyChain)?;
        Ok(Head {
            block,
            difficulty: mirror.dynamic_difficulty(),
            pending: client.pending().await?,
        })
    }

    async fn publish(&mut self) -> Result<(), MinerError> {
        let head = Self::build_head(&mut self.client, &self.mirror).await?;
        debug!(height = head.block.index, difficulty = head.difficulty, "new head");
        self.head.send_replace(Arc::new(head));
        Ok(())
    }

    /// Re-fetch the node's chain and republish.
    async fn refresh(&mut self) -> Result<(), MinerError> {
        let chain = self.client.chain().await?;
        self.mirror = Ledger::from_trusted(chain, *self.mirror.controller());
        self.publish().await
    }

    /// Drain candidates until cancelled, the target is reached, or the node
    /// fails us. Returns the number of accepted submissions.
    pub async fn run(
        mut self,
        mut candidates: mpsc::Receiver<Candidate>,
        cancel: CancellationToken,
    ) -> Result<u64, MinerError> {
        let mut poll = tokio::time::interval(HEAD_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = poll.tick() => self.poll_height().await?,
                next = candidates.recv() => match next {
                    Some(candidate) => {
                        if self.submit(candidate).await? {
                            info!(accepted = self.accepted, "target reached");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        Ok(self.accepted)
    }

    async fn poll_height(&mut self) -> Result<(), MinerError> {
        let height = self.client.height().await?;
        if height != wire_height(self.mirror.height()) {
            debug!(node = height, local = wire_height(self.mirror.height()), "node moved");
            self.refresh().await?;
        }
        Ok(())
    }

    /// Move the head onto a block the node just accepted.
    async fn advance(&mut self, block: Block) -> Result<(), MinerError> {
        let difficulty = self.mirror.dynamic_difficulty();
        match self.mirror.append(block, difficulty, true) {
            Ok(()) => self.publish().await,
            Err(_) => self.refresh().await,
        }
    }

    /// Returns `true` once the target count is reached.
    async fn submit(&mut self, candidate: Candidate) -> Result<bool, MinerError> {
        let live = self.head.borrow().block.hash.clone();
        if candidate.block().prev_hash != live {
            debug!(index = candidate.block().index, "dropping stale candidate");
            return Ok(false);
        }

        let reply = match &candidate {
            Candidate::Block(block) => self.client.submit_block(block).await?,
            Candidate::Share(share) => self.client.submit_share(share).await?,
        };
        match reply.as_str() {
            OK => {
                self.accepted += 1;
                match candidate {
                    Candidate::Block(block) => {
                        info!(index = block.index, accepted = self.accepted, "block accepted");
                        self.advance(block).await?;
                    }
                    Candidate::Share(share) => {
                        debug!(attempts = share.attempts, accepted = self.accepted, "share accepted");
                        // The node appends shares that meet the full target.
                        if meets_difficulty(&share.block.hash, self.mirror.dynamic_difficulty()) {
                            info!(index = share.block.index, "share extended the chain");
                            self.advance(share.block).await?;
                        }
                    }
                }
                Ok(self.target != 0 && self.accepted >= self.target)
            }
            ERR_BLOCK_INVALID | ERR_INVALID_SHARE => {
                warn!(reply = %reply, "submission rejected, refreshing head");
                self.refresh().await?;
                tokio::time::sleep(REJECT_BACKOFF).await;
                Ok(false)
            }
            _ => Err(MinerError::Rejected(reply)),
        }
    }
}
