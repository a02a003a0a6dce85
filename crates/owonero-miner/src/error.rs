use owonero_node::error::ClientError;
use thiserror::Error;

/// Conditions that end a mining run.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("node connection failed: {0}")]
    Client(#[from] ClientError),
    #[error("node rejected submission: {0}")]
    Rejected(String),
    #[error("node has no chain to mine on")]
    EmptyChain,
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
