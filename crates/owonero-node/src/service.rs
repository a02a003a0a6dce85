//! The task that owns the ledger.
//!
//! Everything else talks to it through a [`LedgerHandle`]: each request carries
//! a oneshot sender for its reply, so appends are serialised without any lock
//! around the chain. After every accepted submission a snapshot of the chain
//! goes to a saver task that writes it on the blocking pool; a failed save is
//! logged and the block stays accepted.

use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;

use owonero_core::crypto::verify_transaction;
use owonero_core::{Block, ChainStore, CryptoError, Ledger, Transaction, ValidationError, WalletInfo};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::constants::SERVICE_QUEUE_DEPTH;
use crate::error::ServiceClosed;

/// What a miner needs to build the next block.
#[derive(Clone, Debug)]
pub struct Template {
    pub tip: Option<Block>,
    pub difficulty: u32,
}

enum Request {
    Height(oneshot::Sender<Option<u64>>),
    Template(oneshot::Sender<Template>),
    Chain(oneshot::Sender<Vec<Block>>),
    Blocks(RangeInclusive<u64>, oneshot::Sender<Vec<Block>>),
    Submit(Block, oneshot::Sender<Result<(), ValidationError>>),
    AppendSynced(Block, oneshot::Sender<Result<(), ValidationError>>),
    SubmitTx(Transaction, oneshot::Sender<Result<(), CryptoError>>),
    Pending(oneshot::Sender<Vec<Transaction>>),
    Wallet(String, oneshot::Sender<Option<WalletInfo>>),
    Persist(oneshot::Sender<anyhow::Result<()>>),
}

/// Cloneable front end of the ledger task.
#[derive(Clone)]
pub struct LedgerHandle {
    tx: mpsc::Sender<Request>,
    height: watch::Receiver<Option<u64>>,
}

struct LedgerService {
    ledger: Ledger,
    saver: mpsc::UnboundedSender<SaveJob>,
    pending: VecDeque<Transaction>,
    height: watch::Sender<Option<u64>>,
}

/// A chain snapshot to write, and who is waiting to hear that it was written.
struct SaveJob {
    chain: Vec<Block>,
    done: Option<oneshot::Sender<anyhow::Result<()>>>,
}

/// Start the ledger task. It stops once every handle is dropped.
pub fn spawn(ledger: Ledger, store: Box<dyn ChainStore>) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(SERVICE_QUEUE_DEPTH);
    let (height_tx, height_rx) = watch::channel(ledger.height());
    let (saver, saves) = mpsc::unbounded_channel();
    tokio::spawn(run_saver(Arc::from(store), saves));
    let service = LedgerService {
        ledger,
        saver,
        pending: VecDeque::new(),
        height: height_tx,
    };
    tokio::spawn(service.run(rx));
    LedgerHandle {
        tx,
        height: height_rx,
    }
}

impl LedgerService {
    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(req) = rx.recv().await {
            self.handle(req);
        }
        debug!("ledger service stopped");
    }

    fn handle(&mut self, req: Request) {
        // A dropped reply receiver just means the caller went away.
        match req {
            Request::Height(reply) => {
                let _ = reply.send(self.ledger.height());
            }
            Request::Template(reply) => {
                let _ = reply.send(Template {
                    tip: self.ledger.tip().cloned(),
                    difficulty: self.ledger.dynamic_difficulty(),
                });
            }
            Request::Chain(reply) => {
                let _ = reply.send(self.ledger.blocks().to_vec());
            }
            Request::Blocks(range, reply) => {
                let _ = reply.send(self.ledger.range(range).to_vec());
            }
            Request::Submit(block, reply) => {
                let difficulty = self.ledger.dynamic_difficulty();
                let outcome = self.accept(block, difficulty, false);
                if outcome.is_ok() {
                    self.persist_logged();
                }
                let _ = reply.send(outcome);
            }
            Request::AppendSynced(block, reply) => {
                let outcome = if self.ledger.is_empty() && block.index == 0 {
                    self.ledger.adopt_genesis(block);
                    self.height.send_replace(self.ledger.height());
                    info!("adopted genesis from peer");
                    Ok(())
                } else {
                    let difficulty = self.ledger.dynamic_difficulty();
                    self.accept(block, difficulty, true)
                };
                let _ = reply.send(outcome);
            }
            Request::SubmitTx(tx, reply) => {
                let outcome = verify_transaction(&tx);
                if outcome.is_ok() {
                    debug!(to = %tx.to, amount = tx.amount, "transaction queued");
                    self.pending.push_back(tx);
                }
                let _ = reply.send(outcome);
            }
            Request::Pending(reply) => {
                let _ = reply.send(self.pending.iter().cloned().collect());
            }
            Request::Wallet(address, reply) => {
                let _ = reply.send(self.ledger.wallet_info(&address));
            }
            Request::Persist(reply) => self.queue_save(Some(reply)),
        }
    }

    fn accept(&mut self, block: Block, difficulty: u32, skip_pow: bool) -> Result<(), ValidationError> {
        let included: Vec<String> = block
            .transactions
            .iter()
            .filter(|tx| !tx.signature.is_empty())
            .map(|tx| tx.signature.clone())
            .collect();
        let index = block.index;
        self.ledger.append(block, difficulty, skip_pow)?;
        if !included.is_empty() {
            self.pending.retain(|tx| !included.contains(&tx.signature));
        }
        self.height.send_replace(self.ledger.height());
        info!(index, next_difficulty = self.ledger.dynamic_difficulty(), "block accepted");
        Ok(())
    }

    fn persist_logged(&self) {
        self.queue_save(None);
    }

    fn queue_save(&self, done: Option<oneshot::Sender<anyhow::Result<()>>>) {
        let job = SaveJob {
            chain: self.ledger.blocks().to_vec(),
            done,
        };
        if self.saver.send(job).is_err() {
            error!("chain saver is gone; continuing with in-memory state");
        }
    }
}

/// Write snapshots in arrival order. A backlog collapses to its newest
/// snapshot, and everyone waiting on the dropped ones gets its result.
async fn run_saver(store: Arc<dyn ChainStore>, mut jobs: mpsc::UnboundedReceiver<SaveJob>) {
    while let Some(mut job) = jobs.recv().await {
        let mut waiters: Vec<_> = job.done.take().into_iter().collect();
        while let Ok(mut newer) = jobs.try_recv() {
            waiters.extend(newer.done.take());
            job = newer;
        }

        let store = store.clone();
        let chain = job.chain;
        let len = chain.len();
        let outcome = tokio::task::spawn_blocking(move || store.save_chain(&chain))
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("save task failed: {e}")));
        match &outcome {
            Ok(()) => debug!(blocks = len, "chain saved"),
            Err(e) => error!(error = %e, "failed to persist chain; continuing with in-memory state"),
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.as_ref().map(|_| ()).map_err(|e| anyhow::anyhow!("{e:#}")));
        }
    }
    debug!("chain saver stopped");
}

impl LedgerHandle {
    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T, ServiceClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).await.map_err(|_| ServiceClosed)?;
        rx.await.map_err(|_| ServiceClosed)
    }

    pub async fn height(&self) -> Result<Option<u64>, ServiceClosed> {
        self.call(Request::Height).await
    }

    pub async fn template(&self) -> Result<Template, ServiceClosed> {
        self.call(Request::Template).await
    }

    pub async fn tip(&self) -> Result<Option<Block>, ServiceClosed> {
        Ok(self.template().await?.tip)
    }

    pub async fn difficulty(&self) -> Result<u32, ServiceClosed> {
        Ok(self.template().await?.difficulty)
    }

    pub async fn chain(&self) -> Result<Vec<Block>, ServiceClosed> {
        self.call(Request::Chain).await
    }

    pub async fn blocks(&self, range: RangeInclusive<u64>) -> Result<Vec<Block>, ServiceClosed> {
        self.call(|reply| Request::Blocks(range, reply)).await
    }

    /// Full validation at the current difficulty; saves on success.
    pub async fn submit(&self, block: Block) -> Result<Result<(), ValidationError>, ServiceClosed> {
        self.call(|reply| Request::Submit(block, reply)).await
    }

    /// Skip-PoW append for blocks fetched during sync. Not persisted until
    /// [`LedgerHandle::persist`].
    pub async fn append_synced(&self, block: Block) -> Result<Result<(), ValidationError>, ServiceClosed> {
        self.call(|reply| Request::AppendSynced(block, reply)).await
    }

    pub async fn submit_tx(&self, tx: Transaction) -> Result<Result<(), CryptoError>, ServiceClosed> {
        self.call(|reply| Request::SubmitTx(tx, reply)).await
    }

    pub async fn pending(&self) -> Result<Vec<Transaction>, ServiceClosed> {
        self.call(Request::Pending).await
    }

    pub async fn wallet(&self, address: &str) -> Result<Option<WalletInfo>, ServiceClosed> {
        let address = address.to_string();
        self.call(|reply| Request::Wallet(address, reply)).await
    }

    pub async fn persist(&self) -> Result<anyhow::Result<()>, ServiceClosed> {
        self.call(Request::Persist).await
    }

    /// Follows the tip height; changes on every accepted block.
    pub fn watch_height(&self) -> watch::Receiver<Option<u64>> {
        self.height.clone()
    }
}
