#![allow(dead_code)]

use std::net::SocketAddr;

use owonero_core::{genesis_block, pow::mine_block, Block, DifficultyController, Ledger, Transaction};
use owonero_node::{server, service, NodeContext, PeerRegistry};
use owonero_storage::JsonFileStore;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub struct TestNode {
    pub ctx: NodeContext,
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    pub dir: TempDir,
}

impl TestNode {
    pub fn addr_string(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Serve `ledger` on an ephemeral loopback port.
pub async fn start_node(ledger: Ledger, peers: Vec<String>) -> anyhow::Result<TestNode> {
    let dir = tempfile::tempdir()?;
    let store = JsonFileStore::new(dir.path().join("blockchain.json"));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = service::spawn(ledger, Box::new(store));
    let ctx = NodeContext::new(handle, PeerRegistry::new(peers), addr.to_string());
    let cancel = CancellationToken::new();
    tokio::spawn(server::serve(listener, ctx.clone(), cancel.clone()));
    Ok(TestNode {
        ctx,
        addr,
        cancel,
        dir,
    })
}

/// Genesis plus `n` blocks mined at difficulty 1.
pub fn mined_chain(n: usize) -> Vec<Block> {
    tagged_chain(n, "miner")
}

/// Like [`mined_chain`] but paying a different address, so it forks right
/// after genesis.
pub fn forked_chain(n: usize) -> Vec<Block> {
    tagged_chain(n, "fork")
}

fn tagged_chain(n: usize, tag: &str) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    for i in 0..n {
        let parent = chain.last().expect("chain is never empty");
        let reward = Transaction::coinbase(format!("OWO-{tag}-{i}"), 1);
        let mined = mine_block(parent, vec![reward], 1, None, || false).expect("difficulty 1 mines");
        chain.push(mined.block);
    }
    chain
}

pub fn ledger_with(n: usize) -> Ledger {
    Ledger::from_trusted(mined_chain(n), DifficultyController::default())
}
