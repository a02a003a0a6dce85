use futures::{SinkExt, StreamExt};
use owonero_core::{Block, ChainDocument, Transaction, WalletInfo};
use serde::de::DeserializeOwned;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::constants::{CONNECT_TIMEOUT, MAX_LINE_BYTES};
use crate::error::ClientError;
use crate::protocol::{parse_greeting, Command, Share, OK};

/// One persistent connection to a node. Commands are strictly request/reply.
pub struct NodeClient {
    framed: Framed<TcpStream, LinesCodec>,
    greeting_height: i64,
}

impl NodeClient {
    /// Connect and consume the greeting line.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout)??;
        stream.set_nodelay(true)?;
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
        let line = framed.next().await.ok_or(ClientError::Closed)??;
        let greeting_height = parse_greeting(&line).ok_or(ClientError::BadGreeting(line))?;
        Ok(Self {
            framed,
            greeting_height,
        })
    }

    /// Height announced in the greeting.
    pub fn greeting_height(&self) -> i64 {
        self.greeting_height
    }

    /// Send a command (plus optional payload line) and return the raw reply.
    pub async fn request(&mut self, cmd: Command, payload: Option<&str>) -> Result<String, ClientError> {
        self.framed.send(cmd.name()).await?;
        if let Some(payload) = payload {
            self.framed.send(payload).await?;
        }
        let reply = self.framed.next().await.ok_or(ClientError::Closed)??;
        debug!(command = cmd.name(), reply_len = reply.len(), "node reply");
        Ok(reply)
    }

    async fn request_json<T: DeserializeOwned>(
        &mut self,
        cmd: Command,
        payload: Option<&str>,
    ) -> Result<T, ClientError> {
        let reply = self.request(cmd, payload).await?;
        if reply.starts_with("error:") {
            return Err(ClientError::Rejected(reply));
        }
        Ok(serde_json::from_str(&reply)?)
    }

    /// Commands answered with `ok` on success.
    async fn request_ok(&mut self, cmd: Command, payload: Option<&str>) -> Result<(), ClientError> {
        let reply = self.request(cmd, payload).await?;
        if reply == OK {
            Ok(())
        } else {
            Err(ClientError::Rejected(reply))
        }
    }

    pub async fn height(&mut self) -> Result<i64, ClientError> {
        let reply = self.request(Command::GetHeight, None).await?;
        reply.trim().parse().map_err(|_| ClientError::BadHeight(reply))
    }

    pub async fn chain(&mut self) -> Result<Vec<Block>, ClientError> {
        let doc: ChainDocument = self.request_json(Command::GetChain, None).await?;
        Ok(doc.chain)
    }

    pub async fn blocks(&mut self, start: u64, end: u64) -> Result<Vec<Block>, ClientError> {
        self.request_json(Command::GetBlocks, Some(&format!("{start} {end}")))
            .await
    }

    pub async fn peers(&mut self) -> Result<Vec<String>, ClientError> {
        self.request_json(Command::GetPeers, None).await
    }

    pub async fn pending(&mut self) -> Result<Vec<Transaction>, ClientError> {
        self.request_json(Command::GetPending, None).await
    }

    pub async fn wallet(&mut self, address: &str) -> Result<WalletInfo, ClientError> {
        self.request_json(Command::GetWallet, Some(address)).await
    }

    /// Raw reply, so callers can tell `error: block invalid` from other rejections.
    pub async fn submit_block(&mut self, block: &Block) -> Result<String, ClientError> {
        let json = serde_json::to_string(block)?;
        self.request(Command::SubmitBlock, Some(&json)).await
    }

    pub async fn submit_share(&mut self, share: &Share) -> Result<String, ClientError> {
        let json = serde_json::to_string(share)?;
        self.request(Command::SubmitShare, Some(&json)).await
    }

    pub async fn send_tx(&mut self, tx: &Transaction) -> Result<(), ClientError> {
        let json = serde_json::to_string(tx)?;
        self.request_ok(Command::SendTx, Some(&json)).await
    }

    pub async fn add_peer(&mut self, addr: &str) -> Result<(), ClientError> {
        self.request_ok(Command::AddPeer, Some(addr)).await
    }

    pub async fn remove_peer(&mut self, addr: &str) -> Result<(), ClientError> {
        self.request_ok(Command::RemovePeer, Some(addr)).await
    }

    pub async fn miner_active(&mut self) -> Result<(), ClientError> {
        self.request_ok(Command::MinerActive, None).await
    }

    pub async fn sync(&mut self) -> Result<String, ClientError> {
        self.request(Command::Sync, None).await
    }
}
