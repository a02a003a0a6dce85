pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod peers;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod service;
pub mod sync;

use std::sync::Arc;

pub use client::NodeClient;
pub use peers::{MinerRoster, PeerRegistry};
pub use pool::ShareBook;
pub use service::LedgerHandle;

/// Shared state handed to every connection and background task.
#[derive(Clone)]
pub struct NodeContext {
    pub ledger: LedgerHandle,
    pub peers: PeerRegistry,
    pub miners: MinerRoster,
    pub shares: Arc<ShareBook>,
    /// This node's own `host:port`, never added as a peer.
    pub self_addr: String,
    sync_gate: Arc<tokio::sync::Mutex<()>>,
}

impl NodeContext {
    pub fn new(ledger: LedgerHandle, peers: PeerRegistry, self_addr: impl Into<String>) -> Self {
        Self {
            ledger,
            peers,
            miners: MinerRoster::default(),
            shares: Arc::new(ShareBook::default()),
            self_addr: self_addr.into(),
            sync_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn is_self(&self, addr: &str) -> bool {
        let addr = addr.trim();
        if addr == self.self_addr {
            return true;
        }
        // Loopback spellings of our own port.
        let port = self.self_addr.rsplit(':').next().unwrap_or_default();
        ["127.0.0.1", "localhost", "0.0.0.0"]
            .iter()
            .any(|host| addr == format!("{host}:{port}"))
    }
}
