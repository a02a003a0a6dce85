use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use owonero_core::pow::meets_difficulty;
use owonero_core::{Block, ChainDocument, Transaction};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::MAX_LINE_BYTES;
use crate::error::{ProtocolError, ServiceClosed};
use crate::pool::check_share;
use crate::protocol::{
    error_reply, greeting, parse_json, parse_range, wire_height, Command, Share,
    ERR_BAD_SIGNATURE, ERR_BLOCK_INVALID, ERR_INTERNAL, ERR_INVALID_SHARE,
    ERR_WALLET_NOT_FOUND, OK, SYNC_INITIATED,
};
use crate::sync::sync_with_peers;
use crate::NodeContext;

/// Accept connections until `cancel` fires; one task per connection.
pub async fn serve(listener: TcpListener, ctx: NodeContext, cancel: CancellationToken) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "node listening");
    loop {
        let (stream, remote) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
        };
        let ctx = ctx.clone();
        let cancel = cancel.child_token();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, remote, ctx, cancel).await {
                debug!(%remote, error = %e, "connection closed with error");
            }
        });
    }
    info!("node stopped accepting connections");
    Ok(())
}

/// Greeting, then read command, optional payload, reply, repeat.
async fn handle_connection(
    stream: TcpStream,
    remote: SocketAddr,
    ctx: NodeContext,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_BYTES));
    framed.send(greeting(ctx.ledger.height().await?)).await?;
    debug!(%remote, "connection opened");

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            next = framed.next() => match next {
                Some(line) => line?,
                None => break,
            },
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = match Command::parse(&line) {
            Err(e) => error_reply(&e),
            Ok((cmd, inline)) => {
                let payload = match (cmd.takes_payload(), inline) {
                    (false, _) => None,
                    (true, Some(arg)) => Some(arg.to_string()),
                    (true, None) => match framed.next().await {
                        Some(line) => Some(line?),
                        None => break,
                    },
                };
                match dispatch(&ctx, remote, cmd, payload.as_deref().unwrap_or("")).await {
                    Ok(reply) => reply,
                    Err(ServiceClosed) => ERR_INTERNAL.to_string(),
                }
            }
        };
        framed.send(reply).await?;
    }
    debug!(%remote, "connection closed");
    Ok(())
}

async fn dispatch(ctx: &NodeContext, remote: SocketAddr, cmd: Command, payload: &str) -> Result<String, ServiceClosed> {
    let payload = payload.trim();
    let reply = match cmd {
        Command::GetChain => {
            let doc = ChainDocument {
                chain: ctx.ledger.chain().await?,
            };
            to_json(&doc)
        }
        Command::GetHeight => wire_height(ctx.ledger.height().await?).to_string(),
        Command::GetBlocks => match parse_range(payload) {
            Ok(range) => to_json(&ctx.ledger.blocks(range).await?),
            Err(e) => error_reply(&e),
        },
        Command::SubmitBlock => match parse_json::<Block>("block", payload) {
            Ok(block) => match ctx.ledger.submit(block).await? {
                Ok(()) => OK.to_string(),
                Err(_) => ERR_BLOCK_INVALID.to_string(),
            },
            Err(e) => error_reply(&e),
        },
        Command::SendTx => match parse_json::<Transaction>("transaction", payload) {
            Ok(tx) => match ctx.ledger.submit_tx(tx).await? {
                Ok(()) => OK.to_string(),
                Err(e) => {
                    debug!(%remote, error = %e, "transaction rejected");
                    ERR_BAD_SIGNATURE.to_string()
                }
            },
            Err(e) => error_reply(&e),
        },
        Command::SubmitShare => match parse_json::<Share>("share", payload) {
            Ok(share) => {
                let template = ctx.ledger.template().await?;
                if !check_share(&share, template.tip.as_ref(), template.difficulty) {
                    ERR_INVALID_SHARE.to_string()
                } else if meets_difficulty(&share.block.hash, template.difficulty) {
                    // A share at network difficulty is a block in its own right.
                    let index = share.block.index;
                    match ctx.ledger.submit(share.block).await? {
                        Ok(()) => {
                            info!(index, wallet = %share.wallet.trim(), "share extended the chain");
                            ctx.shares.credit(share.wallet.trim(), share.attempts);
                            OK.to_string()
                        }
                        Err(_) => ERR_BLOCK_INVALID.to_string(),
                    }
                } else {
                    ctx.shares.credit(share.wallet.trim(), share.attempts);
                    OK.to_string()
                }
            }
            Err(e) => error_reply(&e),
        },
        Command::GetPeers => to_json(&ctx.peers.snapshot()),
        Command::AddPeer | Command::RemovePeer => {
            if payload.is_empty() {
                error_reply(&ProtocolError::EmptyPeer)
            } else {
                if cmd == Command::AddPeer {
                    if !ctx.is_self(payload) {
                        ctx.peers.add(payload);
                    }
                } else {
                    ctx.peers.remove(payload);
                }
                OK.to_string()
            }
        }
        Command::GetWallet => {
            if payload.is_empty() {
                error_reply(&ProtocolError::EmptyWallet)
            } else {
                match ctx.ledger.wallet(payload).await? {
                    Some(info) => to_json(&info),
                    None => ERR_WALLET_NOT_FOUND.to_string(),
                }
            }
        }
        Command::MinerActive => {
            if ctx.miners.register(&remote.ip().to_string()) {
                info!(miner = %remote.ip(), "miner registered");
            }
            OK.to_string()
        }
        Command::Sync => {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                sync_with_peers(&ctx).await;
            });
            SYNC_INITIATED.to_string()
        }
        Command::GetPending => to_json(&ctx.ledger.pending().await?),
    };
    Ok(reply)
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("error: {e}"))
}
