use owonero_core::ValidationError;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Malformed input on an inbound connection. Reported back on the same
/// connection, which stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("cannot parse {what} json: {source}")]
    BadJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid block range")]
    BadRange,
    #[error("empty peer address")]
    EmptyPeer,
    #[error("empty wallet address")]
    EmptyWallet,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("line exceeds {max} bytes")]
    LineTooLong { max: usize },
    #[error("connection closed by peer")]
    Closed,
    #[error("timed out")]
    Timeout,
    #[error("unexpected greeting {0:?}")]
    BadGreeting(String),
    #[error("cannot parse height {0:?}")]
    BadHeight(String),
    #[error("bad json reply: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node replied {0:?}")]
    Rejected(String),
}

impl From<LinesCodecError> for ClientError {
    fn from(e: LinesCodecError) -> Self {
        match e {
            LinesCodecError::Io(e) => Self::Io(e),
            LinesCodecError::MaxLineLengthExceeded => Self::LineTooLong {
                max: crate::constants::MAX_LINE_BYTES,
            },
        }
    }
}

/// The ledger service task has stopped.
#[derive(Debug, Clone, Copy, Error)]
#[error("ledger service stopped")]
pub struct ServiceClosed;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Service(#[from] ServiceClosed),
    #[error("peer sent invalid block: {0}")]
    Rejected(#[from] ValidationError),
    #[error("peer returned no blocks for {start}..={end}")]
    EmptyChunk { start: u64, end: u64 },
}
